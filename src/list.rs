use core::{cmp, mem};

use crossbeam_utils::CachePadded;
use rand::Rng;

use crate::{
  arena::Arena,
  error::Error,
  key::{Key, KeyRef},
  sync::{AtomicU32, AtomicU64, Ordering},
  value::{Value, ValueRef},
  MAX_HEIGHT,
};

mod iterator;
pub use iterator::{Iter, UniIter};


/// Promotion threshold: each node keeps climbing one level with
/// probability 1/3.
const HEIGHT_INCREASE: u32 = u32::MAX / 3;

/// Offset 0 never names a node; it is the nil sentinel.
const NIL: u32 = 0;

#[derive(Debug)]
#[repr(C, align(8))]
pub(crate) struct Node {
  // Multiple parts of the value are encoded as a single u64 so that it
  // can be atomically loaded and stored:
  //   value offset: u32 (bits 0-31)
  //   value size  : u32 (bits 32-63)
  pub(crate) val: AtomicU64,

  // A byte slice is 24 bytes. We are trying to save space here.
  pub(crate) key_offset: u32, // Immutable. No need to lock to access key.
  pub(crate) key_size: u16,   // Immutable. No need to lock to access key.

  // Height of the tower.
  pub(crate) height: u16,
  // Most nodes do not need to use the full height of the tower, since the
  // probability of each successive level decreases exponentially. Because
  // these elements are never accessed, they do not need to be allocated.
  // Therefore, when a node is allocated in the arena, its memory footprint
  // is deliberately truncated to not include unneeded tower elements.
  //
  // All accesses to elements should use CAS operations, with no need to lock.
  // tower: [AtomicU32; MAX_HEIGHT],
}

impl Node {
  /// Always align nodes on 64-bit boundaries, even on 32-bit architectures,
  /// so that the value field is 64-bit aligned.
  pub(crate) const ALIGN: usize = mem::size_of::<u64>();

  pub(crate) const OFFSET_SIZE: usize = mem::size_of::<u32>();

  /// The tower trails the record.
  pub(crate) const TOWER_OFFSET: usize = mem::size_of::<Self>();

  /// The memory footprint of a node of maximum height.
  pub(crate) const MAX_NODE_SIZE: usize = Self::TOWER_OFFSET + MAX_HEIGHT * Self::OFFSET_SIZE;

  /// The record size of a node whose tower is truncated to `height` slots.
  #[inline]
  pub(crate) const fn size(height: u32) -> usize {
    Self::TOWER_OFFSET + height as usize * Self::OFFSET_SIZE
  }

  /// Allocates and initializes an unlinked node. The tower slots start out
  /// nil.
  fn alloc(arena: &Arena, key: KeyRef<'_>, value: ValueRef<'_>, height: u32) -> Result<u32, Error> {
    let node_offset = arena.put_node(height)?;
    let key_offset = arena.put_key(key)?;
    let value_offset = arena.put_val(value)?;
    // Safety: the node is not published yet, no reader can observe it.
    let node = unsafe { arena.get_node_mut(node_offset) };
    node.key_offset = key_offset;
    node.key_size = key.encoded_size() as u16;
    node.height = height as u16;
    node.val = AtomicU64::new(encode_value(value_offset, value.encoded_size() as u32));
    Ok(node_offset)
  }

  #[inline]
  fn set_val(&self, vo: u64) {
    self.val.store(vo, Ordering::Release)
  }

  /// (val_offset, val_size)
  #[inline]
  fn value_offset(&self) -> (u32, u32) {
    decode_value(self.val.load(Ordering::Acquire))
  }

  #[inline]
  fn key<'a>(&self, arena: &'a Arena) -> KeyRef<'a> {
    arena.get_key(self.key_offset, self.key_size)
  }
}

#[inline]
const fn encode_value(val_offset: u32, val_size: u32) -> u64 {
  ((val_size as u64) << 32) | (val_offset as u64)
}

/// (val_offset, val_size)
#[inline]
const fn decode_value(value: u64) -> (u32, u32) {
  (value as u32, (value >> 32) as u32)
}

/// A caller-local splice cache used to speed up sequential writes.
///
/// Every cached splice is revalidated against the live list before use, so
/// a stale hint never costs correctness; a zeroed hint degenerates to a
/// full top-down search.
#[derive(Debug)]
pub struct Hint {
  height: u32,

  // hit_height is used to reduce the cost of calculate_recompute_height.
  // For random workloads, comparing hint keys from the bottom up is wasted
  // work, so we record the hit height of the last operation and only grow
  // the recompute height from near that height.
  hit_height: u32,
  prev: [u32; MAX_HEIGHT + 1],
  next: [u32; MAX_HEIGHT + 1],
}

impl Default for Hint {
  #[inline]
  fn default() -> Self {
    Self {
      height: 0,
      hit_height: 0,
      prev: [NIL; MAX_HEIGHT + 1],
      next: [NIL; MAX_HEIGHT + 1],
    }
  }
}

/// Fixed size lock-free ARENA based skiplist.
///
/// Keys sort by user key ascending, then version descending. Inserting an
/// existing (user key, version) pair overwrites the node's value word
/// atomically; no other form of update or deletion exists. Memory comes
/// back only through [`delete`](SkipMap::delete), which rewinds the whole
/// arena.
#[derive(Debug)]
pub struct SkipMap {
  /// Current height. 1 <= height <= MAX_HEIGHT. CAS.
  height: CachePadded<AtomicU32>,
  head_offset: u32,
  arena: Arena,
}

impl SkipMap {
  /// Creates a new empty skiplist with the given arena capacity.
  ///
  /// The capacity stands for how much memory is allocated up front; it does
  /// not mean the skiplist can store that many entries. It is raised to the
  /// minimum that holds the head sentinel when necessary.
  pub fn new(arena_size: usize) -> Self {
    let arena = Arena::new(arena_size.max(Node::MAX_NODE_SIZE * 2));
    let head_offset = arena
      .put_node(MAX_HEIGHT as u32)
      .expect("minimum capacity holds the head node");
    // Safety: the head is not published through any tower yet.
    let head = unsafe { arena.get_node_mut(head_offset) };
    head.height = MAX_HEIGHT as u16;
    Self {
      height: CachePadded::new(AtomicU32::new(1)),
      head_offset,
      arena,
    }
  }

  /// Returns the height of the highest tower within any node ever allocated
  /// as part of this skiplist.
  #[inline]
  pub fn height(&self) -> u32 {
    self.get_height()
  }

  /// Returns the size of the skiplist in terms of how much memory is used
  /// within its internal arena.
  #[inline]
  pub fn mem_size(&self) -> u64 {
    self.arena.size()
  }

  /// Returns the capacity of the internal arena.
  #[inline]
  pub fn cap(&self) -> usize {
    self.arena.capacity()
  }

  /// Returns true if the skiplist holds no entries.
  #[inline]
  pub fn is_empty(&self) -> bool {
    self.find_last() == NIL
  }

  /// Returns the number of entries, by walking the base level.
  pub fn len(&self) -> usize {
    let mut x = self.get_next_offset(self.head_offset, 0);
    let mut count = 0;
    while x != NIL {
      count += 1;
      x = self.get_next_offset(x, 0);
    }
    count
  }

  /// Tears the skiplist down, releasing every node, key and value in a
  /// single step by rewinding the arena.
  ///
  /// The exclusive borrow guarantees no iterator or concurrent operation is
  /// live during the reset. The skiplist must not be used afterwards.
  /// Idempotent.
  pub fn delete(&mut self) {
    self.arena.reset();
    self.height.store(1, Ordering::SeqCst);
  }

  /// Inserts the key-value pair.
  #[inline]
  pub fn put(&self, key: &Key, value: &Value) -> Result<(), Error> {
    self.put_with_hint(key, value, None)
  }

  /// Inserts the key-value pair, reusing `hint` so near-sequential writers
  /// skip most of the splice search.
  ///
  /// When the (user key, version) pair already exists, the node's value is
  /// overwritten in place and no new node is allocated.
  pub fn put_with_hint(
    &self,
    key: &Key,
    value: &Value,
    hint: Option<&mut Hint>,
  ) -> Result<(), Error> {
    let key = key.as_key_ref();
    let value = value.as_value_ref();
    if key.encoded_size() > u16::MAX as usize {
      return Err(Error::KeyTooLarge {
        size: key.encoded_size(),
        maximum_size: u16::MAX as usize,
      });
    }
    if value.encoded_size() > u16::MAX as usize {
      return Err(Error::ValueTooLarge {
        size: value.encoded_size(),
        maximum_size: u16::MAX as usize,
      });
    }

    // Since we allow overwrite, we may not need to create a new node. We
    // might not even need to increase the height. Let's defer these actions.
    let mut list_height = self.get_height();
    let height = random_height();

    // Try to increase self.height via CAS.
    while height > list_height {
      match self
        .height
        .compare_exchange(list_height, height, Ordering::SeqCst, Ordering::SeqCst)
      {
        Ok(_) => {
          // Successfully increased skiplist height.
          list_height = height;
          break;
        }
        Err(h) => list_height = h,
      }
    }

    let mut scratch = Hint::default();
    let (h, mut splice_is_valid) = match hint {
      Some(h) => (h, true),
      None => (&mut scratch, false),
    };

    let recompute_height = self.calculate_recompute_height(key, h, list_height);
    for i in (0..recompute_height as usize).rev() {
      // Use a higher-level splice to bound the search at this level.
      let (prev, next, matched) = self.find_splice_for_level(key, h.prev[i + 1], i);
      h.prev[i] = prev;
      h.next[i] = next;
      if matched {
        // In-place update.
        return self.set_node_value(next, value, h, i);
      }
    }

    // We do need to create a new node.
    let x = Node::alloc(&self.arena, key, value, height)?;

    // We always insert from the base level and up. After you add a node in
    // the base level, we cannot create a node in the level above because it
    // would have discovered the node in the base level.
    for i in 0..height as usize {
      loop {
        let next = h.next[i];
        // Safety: i < height for both x and its current predecessor.
        unsafe { self.arena.tower(x, i) }.store(next, Ordering::Relaxed);
        match unsafe { self.arena.tower(h.prev[i], i) }.compare_exchange(
          next,
          x,
          Ordering::SeqCst,
          Ordering::SeqCst,
        ) {
          // Managed to insert x between prev[i] and next[i]. Go to the next
          // level.
          Ok(_) => break,
          Err(_) => {
            // CAS failed. We need to recompute prev and next. It is unlikely
            // to be helpful to try to use a different level as we redo the
            // search, because it is unlikely that lots of nodes are inserted
            // between prev[i] and next[i].
            let (prev, next, matched) = self.find_splice_for_level(key, h.prev[i], i);
            h.prev[i] = prev;
            h.next[i] = next;
            if matched {
              // A concurrent writer published the same key first; this can
              // only happen on the base level. Overwrite its value in place
              // and abandon the node allocated above to the arena.
              debug_assert_eq!(i, 0);
              return self.set_node_value(next, value, h, i);
            }
            if i > 0 {
              splice_is_valid = false;
            }
          }
        }
      }
    }

    if splice_is_valid {
      for i in 0..height as usize {
        h.prev[i] = x;
        h.next[i] = self.get_next_offset(x, i);
      }
    } else {
      h.height = 0;
    }
    Ok(())
  }

  /// Gets the value associated with the key. It returns a value if it finds
  /// an equal or earlier version of the same user key; the returned value's
  /// version is patched from the matched key.
  pub fn get(&self, key: &Key) -> Option<ValueRef<'_>> {
    let key = key.as_key_ref();
    let (n, _) = self.find_near(key, false, true); // find_greater_or_equal.
    if n == NIL {
      return None;
    }

    // Safety: n is not nil.
    let node = unsafe { self.arena.get_node(n) };
    let node_key = node.key(&self.arena);
    if !key.same_user_key(&node_key) {
      return None;
    }
    let (value_offset, value_size) = node.value_offset();
    let mut vs = self.arena.get_val(value_offset, value_size);
    vs.version = node_key.version();
    Some(vs)
  }

  /// Like [`get`](SkipMap::get), but reuses `hint` so clustered lookups
  /// skip most of the descent.
  ///
  /// Unlike `get`, a hinted descent that does not land exactly on the
  /// requested version only resolves through the cached base-level splice.
  pub fn get_with_hint(&self, key: &Key, hint: Option<&mut Hint>) -> Option<ValueRef<'_>> {
    let key = key.as_key_ref();
    let mut scratch = Hint::default();
    let h = match hint {
      Some(h) => h,
      None => &mut scratch,
    };

    let list_height = self.get_height();
    let recompute_height = self.calculate_recompute_height(key, h, list_height);
    let mut n = NIL;
    if recompute_height > 0 {
      for i in (0..recompute_height as usize).rev() {
        let (prev, next, matched) = self.find_splice_for_level(key, h.prev[i + 1], i);
        h.prev[i] = prev;
        h.next[i] = next;
        if matched {
          n = next;
          // Park the lower levels of the hint just after the matched node.
          for j in (0..=i).rev() {
            h.prev[j] = n;
            h.next[j] = self.get_next_offset(n, j);
          }
          break;
        }
      }
    } else {
      n = h.next[0];
    }
    if n == NIL {
      return None;
    }

    // Safety: n is not nil.
    let node = unsafe { self.arena.get_node(n) };
    let node_key = node.key(&self.arena);
    if !key.same_user_key(&node_key) {
      return None;
    }
    let (value_offset, value_size) = node.value_offset();
    let mut vs = self.arena.get_val(value_offset, value_size);
    vs.version = node_key.version();
    Some(vs)
  }

  /// Returns a bidirectional iterator over the skiplist.
  #[inline]
  pub fn iter(&self) -> Iter<'_> {
    Iter::new(self)
  }

  /// Returns a unidirectional iterator; when `reversed`, forward motion
  /// walks descending key order.
  #[inline]
  pub fn uni_iter(&self, reversed: bool) -> UniIter<'_> {
    UniIter::new(self, reversed)
  }
}

impl SkipMap {
  #[inline]
  fn get_height(&self) -> u32 {
    self.height.load(Ordering::SeqCst)
  }

  #[inline]
  fn get_next_offset(&self, node_offset: u32, level: usize) -> u32 {
    // Safety: callers only pass live node offsets and in-height levels.
    unsafe { self.arena.tower(node_offset, level) }.load(Ordering::Acquire)
  }

  #[inline]
  fn node_key(&self, node_offset: u32) -> KeyRef<'_> {
    // Safety: callers never pass the nil offset.
    unsafe { self.arena.get_node(node_offset) }.key(&self.arena)
  }

  /// Overwrites the value word of the node at `node_offset`, then parks the
  /// hint levels at and below `level` on the matched splice.
  fn set_node_value(
    &self,
    node_offset: u32,
    value: ValueRef<'_>,
    h: &mut Hint,
    level: usize,
  ) -> Result<(), Error> {
    let value_offset = self.arena.put_val(value)?;
    let encoded = encode_value(value_offset, value.encoded_size() as u32);
    // Safety: node_offset came from a splice match, never nil.
    unsafe { self.arena.get_node(node_offset) }.set_val(encoded);
    let mut i = level;
    while i > 0 {
      h.prev[i - 1] = h.prev[i];
      h.next[i - 1] = h.next[i];
      i -= 1;
    }
    Ok(())
  }

  /// find_near finds the node near to key.
  /// If less=true, it finds rightmost node such that node.key < key (if
  /// allow_equal=false) or node.key <= key (if allow_equal=true).
  /// If less=false, it finds leftmost node such that node.key > key (if
  /// allow_equal=false) or node.key >= key (if allow_equal=true).
  /// Returns the node offset found (nil if none). The bool returned is true
  /// if the node has key equal to given key.
  fn find_near(&self, key: KeyRef<'_>, less: bool, allow_equal: bool) -> (u32, bool) {
    let mut x = self.head_offset;
    let mut level = (self.get_height() - 1) as usize;
    let mut after_node = NIL;
    loop {
      // Assume x.key < key.
      let next = self.get_next_offset(x, level);
      if next == NIL {
        // x.key < key < END OF LIST
        if level > 0 {
          // Can descend further to iterate closer to the end.
          level -= 1;
          continue;
        }
        // Level=0. Cannot descend further. Let's return something that
        // makes sense.
        if !less {
          return (NIL, false);
        }
        // Try to return x. Make sure it is not a head node.
        if x == self.head_offset {
          return (NIL, false);
        }
        return (x, false);
      }

      let ord = if next == after_node {
        // We compared against the same node on the upper level, no need to
        // compare again.
        cmp::Ordering::Less
      } else {
        key.cmp(&self.node_key(next))
      };
      match ord {
        cmp::Ordering::Greater => {
          // x.key < next.key < key. We can continue to move right.
          x = next;
        }
        cmp::Ordering::Equal => {
          // x.key < key == next.key.
          if allow_equal {
            return (next, true);
          }
          if !less {
            // We want >, so go to base level to grab the next bigger node.
            return (self.get_next_offset(next, 0), false);
          }
          // We want <. If not base level, we should go closer in the next
          // level.
          if level > 0 {
            level -= 1;
            continue;
          }
          // On base level. Return x.
          if x == self.head_offset {
            return (NIL, false);
          }
          return (x, false);
        }
        cmp::Ordering::Less => {
          // x.key < key < next.key.
          if level > 0 {
            after_node = next;
            level -= 1;
            continue;
          }
          // At base level. Need to return something.
          if !less {
            return (next, false);
          }
          // Try to return x. Make sure it is not a head node.
          if x == self.head_offset {
            return (NIL, false);
          }
          return (x, false);
        }
      }
    }
  }

  /// find_splice_for_level returns (before, next, matched) with
  /// before.key < key <= next.key at `level`. The input `before` tells us
  /// where to start looking. If we found a node with the same key, then
  /// matched is true. Otherwise, before.key < key < next.key.
  fn find_splice_for_level(
    &self,
    key: KeyRef<'_>,
    mut before: u32,
    level: usize,
  ) -> (u32, u32, bool) {
    loop {
      // Assume before.key < key.
      let next = self.get_next_offset(before, level);
      if next == NIL {
        return (before, next, false);
      }
      match key.cmp(&self.node_key(next)) {
        // Keep moving right on this level.
        cmp::Ordering::Greater => before = next,
        cmp::Ordering::Equal => return (before, next, true),
        cmp::Ordering::Less => return (before, next, false),
      }
    }
  }

  /// find_last returns the last element. If head (empty list), the nil
  /// offset is returned. All the find functions will NEVER return the head
  /// node.
  fn find_last(&self) -> u32 {
    let mut n = self.head_offset;
    let mut level = (self.get_height() - 1) as usize;
    loop {
      let next = self.get_next_offset(n, level);
      if next != NIL {
        n = next;
        continue;
      }
      if level == 0 {
        if n == self.head_offset {
          return NIL;
        }
        return n;
      }
      level -= 1;
    }
  }

  /// Returns the topmost level whose cached splice must be recomputed for
  /// `key`, reseeding the hint wholesale when it has never been used or the
  /// list has grown past it.
  fn calculate_recompute_height(&self, key: KeyRef<'_>, h: &mut Hint, list_height: u32) -> u32 {
    if h.height < list_height {
      // Either splice is never used or list height has grown, we recompute
      // all.
      h.prev[list_height as usize] = self.head_offset;
      h.next[list_height as usize] = NIL;
      h.height = list_height;
      h.hit_height = list_height;
      return list_height;
    }
    let mut recompute_height = h.hit_height.saturating_sub(2);
    while recompute_height < list_height {
      let level = recompute_height as usize;
      let prev = h.prev[level];
      let next = h.next[level];
      if self.get_next_offset(prev, level) != next {
        // Someone inserted a node between prev and next.
        recompute_height += 1;
        continue;
      }
      if prev != self.head_offset && prev != NIL && key <= self.node_key(prev) {
        // Key is before splice.
        while prev == h.prev[recompute_height as usize] {
          recompute_height += 1;
        }
        continue;
      }
      if next != NIL && key > self.node_key(next) {
        // Key is after splice.
        while next == h.next[recompute_height as usize] {
          recompute_height += 1;
        }
        continue;
      }
      break;
    }
    h.hit_height = recompute_height;
    recompute_height
  }
}

#[inline]
fn random_height() -> u32 {
  let mut rng = rand::thread_rng();
  let mut h = 1;
  while h < MAX_HEIGHT as u32 && rng.gen::<u32>() <= HEIGHT_INCREASE {
    h += 1;
  }
  h
}
