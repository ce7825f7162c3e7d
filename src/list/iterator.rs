use super::{SkipMap, NIL};
use crate::{
  key::{Key, KeyRef},
  value::ValueRef,
};

/// A bidirectional cursor over the skiplist.
///
/// A freshly created iterator is invalid; position it with one of the seek
/// methods. The movement and accessor methods require
/// [`valid`](Iter::valid) and panic otherwise.
#[derive(Debug, Clone, Copy)]
pub struct Iter<'a> {
  list: &'a SkipMap,
  n: u32,
}

impl<'a> Iter<'a> {
  #[inline]
  pub(super) fn new(list: &'a SkipMap) -> Self {
    Self { list, n: NIL }
  }

  /// Returns true iff the iterator is positioned at a valid node.
  #[inline]
  pub fn valid(&self) -> bool {
    self.n != NIL
  }

  /// Returns the key at the current position.
  #[inline]
  pub fn key(&self) -> KeyRef<'a> {
    assert!(self.valid());
    let list = self.list;
    // Safety: valid() rules out the nil offset.
    let node = unsafe { list.arena.get_node(self.n) };
    node.key(&list.arena)
  }

  /// Returns the value at the current position. The version lives in the
  /// key, see [`key`](Iter::key).
  #[inline]
  pub fn value(&self) -> ValueRef<'a> {
    assert!(self.valid());
    let list = self.list;
    // Safety: valid() rules out the nil offset.
    let node = unsafe { list.arena.get_node(self.n) };
    let (value_offset, value_size) = node.value_offset();
    list.arena.get_val(value_offset, value_size)
  }

  /// Advances to the next position.
  #[inline]
  pub fn next(&mut self) {
    assert!(self.valid());
    self.n = self.list.get_next_offset(self.n, 0);
  }

  /// Retreats to the previous position.
  #[inline]
  pub fn prev(&mut self) {
    assert!(self.valid());
    let (n, _) = self.list.find_near(self.key(), true, false); // find <. No equality allowed.
    self.n = n;
  }

  /// Advances to the first entry with a key >= target.
  #[inline]
  pub fn seek(&mut self, target: &Key) {
    let (n, _) = self.list.find_near(target.as_key_ref(), false, true); // find >=.
    self.n = n;
  }

  /// Finds the last entry with a key <= target.
  #[inline]
  pub fn seek_for_prev(&mut self, target: &Key) {
    let (n, _) = self.list.find_near(target.as_key_ref(), true, true); // find <=.
    self.n = n;
  }

  /// Seeks position at the first entry in the list. Final state of the
  /// iterator is valid() iff the list is not empty.
  #[inline]
  pub fn seek_to_first(&mut self) {
    self.n = self.list.get_next_offset(self.list.head_offset, 0);
  }

  /// Seeks position at the last entry in the list. Final state of the
  /// iterator is valid() iff the list is not empty.
  #[inline]
  pub fn seek_to_last(&mut self) {
    self.n = self.list.find_last();
  }
}

/// UniIter is a unidirectional memtable iterator. It is a thin wrapper
/// around [`Iter`]. We like to keep `Iter` as before, because it is more
/// powerful and engine-level merging iterators only need one direction at a
/// time.
#[derive(Debug, Clone, Copy)]
pub struct UniIter<'a> {
  iter: Iter<'a>,
  reversed: bool,
}

impl<'a> UniIter<'a> {
  #[inline]
  pub(super) fn new(list: &'a SkipMap, reversed: bool) -> Self {
    Self {
      iter: Iter::new(list),
      reversed,
    }
  }

  /// Advances to the next position in iteration order.
  #[inline]
  pub fn next(&mut self) {
    if !self.reversed {
      self.iter.next()
    } else {
      self.iter.prev()
    }
  }

  /// Repositions at the start of the iteration order.
  #[inline]
  pub fn rewind(&mut self) {
    if !self.reversed {
      self.iter.seek_to_first()
    } else {
      self.iter.seek_to_last()
    }
  }

  /// Positions at the first entry at or past `key` in iteration order.
  #[inline]
  pub fn seek(&mut self, key: &Key) {
    if !self.reversed {
      self.iter.seek(key)
    } else {
      self.iter.seek_for_prev(key)
    }
  }

  /// Returns the key at the current position.
  #[inline]
  pub fn key(&self) -> KeyRef<'a> {
    self.iter.key()
  }

  /// Returns the value at the current position.
  #[inline]
  pub fn value(&self) -> ValueRef<'a> {
    self.iter.value()
  }

  /// Returns true iff the iterator is positioned at a valid node.
  #[inline]
  pub fn valid(&self) -> bool {
    self.iter.valid()
  }
}
