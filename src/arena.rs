use core::{mem, ptr::NonNull, slice};

use crossbeam_utils::CachePadded;

use crate::{
  error::ArenaError,
  key::KeyRef,
  list::Node,
  sync::{AtomicU32, AtomicU64, Ordering},
  value::ValueRef,
};

/// A fixed-capacity, zero-initialized, aligned heap buffer.
struct AlignedVec {
  ptr: NonNull<u8>,
  cap: usize,
  align: usize,
}

impl AlignedVec {
  #[inline]
  fn new(capacity: usize, align: usize) -> Self {
    assert!(
      capacity <= Self::max_capacity(align),
      "`capacity` cannot exceed isize::MAX - {}",
      align - 1
    );
    let ptr = unsafe {
      let layout = std::alloc::Layout::from_size_align_unchecked(capacity, align);
      let ptr = std::alloc::alloc_zeroed(layout);
      if ptr.is_null() {
        std::alloc::handle_alloc_error(layout);
      }
      NonNull::new_unchecked(ptr)
    };
    Self {
      ptr,
      cap: capacity,
      align,
    }
  }

  #[inline]
  const fn max_capacity(align: usize) -> usize {
    isize::MAX as usize - (align - 1)
  }

  #[inline]
  fn layout(&self) -> std::alloc::Layout {
    unsafe { std::alloc::Layout::from_size_align_unchecked(self.cap, self.align) }
  }
}

impl Drop for AlignedVec {
  fn drop(&mut self) {
    if self.cap != 0 {
      unsafe {
        std::alloc::dealloc(self.ptr.as_ptr(), self.layout());
      }
    }
  }
}

/// Arena should be lock-free.
///
/// A monotonic bump allocator that exclusively owns every node, key and
/// value of one skiplist. All cross-node references are 4-byte offsets into
/// the buffer; offset 0 is reserved as the nil sentinel.
pub(crate) struct Arena {
  n: CachePadded<AtomicU64>,
  cap: usize,
  buf: AlignedVec,
}

impl core::fmt::Debug for Arena {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("Arena")
      .field("cap", &self.cap)
      .field("allocated", &self.size())
      .finish()
  }
}

// Safety: the buffer is append-only and all shared mutations go through
// atomic cells resident in it.
unsafe impl Send for Arena {}
unsafe impl Sync for Arena {}

impl Arena {
  #[inline]
  pub(crate) fn new(cap: usize) -> Self {
    assert!(cap <= u32::MAX as usize, "arena capacity exceeds u32 offsets");
    let buf = AlignedVec::new(cap, Node::ALIGN);
    Self {
      // Don't store data at position 0 in order to reserve offset=0 as a
      // kind of nil pointer.
      n: CachePadded::new(AtomicU64::new(1)),
      cap,
      buf,
    }
  }

  /// Returns the number of bytes allocated by the arena.
  #[inline]
  pub(crate) fn size(&self) -> u64 {
    self.n.load(Ordering::Acquire)
  }

  /// Returns the capacity of the arena.
  #[inline]
  pub(crate) const fn capacity(&self) -> usize {
    self.cap
  }

  /// Rewinds the bump cursor, logically dropping every node, key and value
  /// at once. Exclusive access guarantees no reader or writer is live.
  #[inline]
  pub(crate) fn reset(&mut self) {
    self.n.store(1, Ordering::Release);
  }

  #[inline]
  fn alloc(&self, size: u32, align: u32) -> Result<u32, ArenaError> {
    // Pad the allocation with enough bytes to ensure the requested alignment.
    let padded = size as u64 + align as u64 - 1;

    let mut current = self.n.load(Ordering::Acquire);
    loop {
      if current + padded > self.cap as u64 {
        return Err(ArenaError);
      }
      match self.n.compare_exchange_weak(
        current,
        current + padded,
        Ordering::SeqCst,
        Ordering::Acquire,
      ) {
        Ok(_) => {
          // Return the aligned offset.
          let new_size = current + padded;
          return Ok((new_size as u32 - size) & !(align - 1));
        }
        Err(x) => current = x,
      }
    }
  }

  /// Reserves space for a node whose tower is truncated to `height` slots
  /// and returns its offset. The node record is zeroed.
  #[inline]
  pub(crate) fn put_node(&self, height: u32) -> Result<u32, ArenaError> {
    let size = Node::size(height);
    let offset = self.alloc(size as u32, Node::ALIGN as u32)?;
    // The buffer starts zeroed, but the region may hold stale bytes if the
    // arena has been reset.
    unsafe {
      core::ptr::write_bytes(self.get_pointer_mut(offset as usize), 0, size);
    }
    Ok(offset)
  }

  /// Copies the user-key bytes followed by the 8-byte version into the
  /// arena and returns the start offset.
  #[inline]
  pub(crate) fn put_key(&self, key: KeyRef<'_>) -> Result<u32, ArenaError> {
    let size = key.encoded_size();
    let offset = self.alloc(size as u32, 1)?;
    key.encode(unsafe { self.get_bytes_mut(offset as usize, size) });
    Ok(offset)
  }

  /// Copies the encoded value header and payload into the arena and returns
  /// the start offset.
  #[inline]
  pub(crate) fn put_val(&self, value: ValueRef<'_>) -> Result<u32, ArenaError> {
    let size = value.encoded_size();
    let offset = self.alloc(size as u32, 1)?;
    value.encode(unsafe { self.get_bytes_mut(offset as usize, size) });
    Ok(offset)
  }

  /// Returns the node located at `offset`.
  ///
  /// ## Safety
  /// - `offset` must be a non-nil offset returned by `put_node`.
  #[inline]
  pub(crate) unsafe fn get_node(&self, offset: u32) -> &Node {
    &*(self.buf.ptr.as_ptr().add(offset as usize) as *const Node)
  }

  /// ## Safety
  /// - `offset` must have been returned by `put_node` and the node must not
  ///   be published yet.
  #[allow(clippy::mut_from_ref)]
  #[inline]
  pub(crate) unsafe fn get_node_mut(&self, offset: u32) -> &mut Node {
    &mut *(self.buf.ptr.as_ptr().add(offset as usize) as *mut Node)
  }

  /// Returns the tower slot of the node at `node_offset` for `level`.
  ///
  /// ## Safety
  /// - `level` must be below the node's height.
  #[inline]
  pub(crate) unsafe fn tower(&self, node_offset: u32, level: usize) -> &AtomicU32 {
    let offset = node_offset as usize + Node::TOWER_OFFSET + level * Node::OFFSET_SIZE;
    &*(self.buf.ptr.as_ptr().add(offset) as *const AtomicU32)
  }

  /// Decodes the key stored at `offset`.
  #[inline]
  pub(crate) fn get_key(&self, offset: u32, size: u16) -> KeyRef<'_> {
    KeyRef::decode(unsafe { self.get_bytes(offset as usize, size as usize) })
  }

  /// Decodes the value stored at `offset`. The caller patches the version.
  #[inline]
  pub(crate) fn get_val(&self, offset: u32, size: u32) -> ValueRef<'_> {
    ValueRef::decode(unsafe { self.get_bytes(offset as usize, size as usize) })
  }

  /// ## Safety
  /// - `offset + size` must be within the allocated region of the arena.
  #[inline]
  unsafe fn get_bytes(&self, offset: usize, size: usize) -> &[u8] {
    if offset == 0 {
      return &[];
    }
    slice::from_raw_parts(self.buf.ptr.as_ptr().add(offset), size)
  }

  /// ## Safety
  /// - `offset + size` must be within the allocated region of the arena and
  ///   not shared with any reader.
  #[allow(clippy::mut_from_ref)]
  #[inline]
  unsafe fn get_bytes_mut(&self, offset: usize, size: usize) -> &mut [u8] {
    slice::from_raw_parts_mut(self.buf.ptr.as_ptr().add(offset), size)
  }

  /// ## Safety
  /// - `offset` must be within the allocated region of the arena.
  #[inline]
  unsafe fn get_pointer_mut(&self, offset: usize) -> *mut u8 {
    self.buf.ptr.as_ptr().add(offset)
  }
}

// The node record must stay exactly one value word plus the packed key
// fields; the tower offset computation depends on it.
const _: () = {
  assert!(mem::size_of::<Node>() == 16);
  assert!(mem::align_of::<Node>() == Node::ALIGN);
};
