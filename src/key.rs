use bytes::Bytes;
use core::cmp;

pub(crate) const VERSION_SIZE: usize = core::mem::size_of::<u64>();

/// A versioned key: an opaque user-key byte sequence paired with a 64-bit
/// version.
///
/// Keys order by user key ascending, then version descending, so among
/// records sharing a user key the newest version sorts first.
#[derive(Debug, Clone)]
pub struct Key {
  data: Bytes,
  version: u64,
}

impl Default for Key {
  fn default() -> Self {
    Self::new()
  }
}

impl Key {
  /// Returns an empty key
  #[inline]
  pub const fn new() -> Self {
    Self {
      data: Bytes::new(),
      version: 0,
    }
  }

  /// Create a key from bytes, without version
  #[inline]
  pub const fn from_bytes(b: Bytes) -> Self {
    Self {
      data: b,
      version: 0,
    }
  }

  /// Set the version of the key
  #[inline]
  pub fn with_version(mut self, version: u64) -> Self {
    self.version = version;
    self
  }

  /// Set the version of the key
  #[inline]
  pub fn set_version(&mut self, version: u64) {
    self.version = version;
  }

  /// Returns the version of the key
  #[inline]
  pub const fn version(&self) -> u64 {
    self.version
  }

  /// Returns the user key without the version
  #[inline]
  pub fn user_key(&self) -> &[u8] {
    self.data.as_ref()
  }

  /// Returns whether `other` names the same user key, ignoring the version.
  #[inline]
  pub fn same_user_key(&self, other: &Key) -> bool {
    self.data == other.data
  }

  /// Destruct the key, returns the user key and the version.
  #[inline]
  pub fn into_components(self) -> (Bytes, u64) {
    (self.data, self.version)
  }

  #[inline]
  pub(crate) fn as_key_ref(&self) -> KeyRef<'_> {
    KeyRef {
      data: self.data.as_ref(),
      version: self.version,
    }
  }
}

impl AsRef<[u8]> for Key {
  fn as_ref(&self) -> &[u8] {
    self.data.as_ref()
  }
}

impl PartialEq for Key {
  fn eq(&self, other: &Self) -> bool {
    self.data == other.data && self.version == other.version
  }
}

impl Eq for Key {}

impl PartialOrd for Key {
  fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for Key {
  fn cmp(&self, other: &Self) -> cmp::Ordering {
    self.as_key_ref().cmp(&other.as_key_ref())
  }
}

impl From<Bytes> for Key {
  fn from(data: Bytes) -> Self {
    Self::from_bytes(data)
  }
}

impl From<&Bytes> for Key {
  fn from(data: &Bytes) -> Self {
    Self::from_bytes(data.clone())
  }
}

impl<'a> From<&'a [u8]> for Key {
  fn from(data: &'a [u8]) -> Self {
    Self::from_bytes(Bytes::copy_from_slice(data))
  }
}

impl<'a> From<&'a str> for Key {
  fn from(data: &'a str) -> Self {
    Self::from_bytes(Bytes::copy_from_slice(data.as_bytes()))
  }
}

impl From<String> for Key {
  fn from(data: String) -> Self {
    Self::from_bytes(data.into())
  }
}

impl From<Vec<u8>> for Key {
  fn from(data: Vec<u8>) -> Self {
    Self::from_bytes(data.into())
  }
}

impl From<Box<[u8]>> for Key {
  fn from(data: Box<[u8]>) -> Self {
    Self::from_bytes(Bytes::from(data))
  }
}

/// A key borrowed from the arena.
#[derive(Debug, Clone, Copy)]
pub struct KeyRef<'a> {
  data: &'a [u8],
  version: u64,
}

impl<'a> KeyRef<'a> {
  /// Creates a new key reference directly from the given user key and version.
  #[inline]
  pub const fn new(data: &'a [u8], version: u64) -> Self {
    Self { data, version }
  }

  /// Returns the user key without the version
  #[inline]
  pub const fn user_key(&self) -> &'a [u8] {
    self.data
  }

  /// Returns the version of the key
  #[inline]
  pub const fn version(&self) -> u64 {
    self.version
  }

  /// Returns whether `other` names the same user key, ignoring the version.
  #[inline]
  pub fn same_user_key(&self, other: &KeyRef<'_>) -> bool {
    self.data == other.data
  }

  /// Copies the key into an owned [`Key`].
  #[inline]
  pub fn to_key(&self) -> Key {
    Key {
      data: Bytes::copy_from_slice(self.data),
      version: self.version,
    }
  }

  /// The size of the key when copied into the arena: the user key followed
  /// by the 8-byte version.
  #[inline]
  pub(crate) const fn encoded_size(&self) -> usize {
    self.data.len() + VERSION_SIZE
  }

  /// Encodes the key into the given buffer. The buffer must be exactly
  /// `self.encoded_size()` bytes.
  #[inline]
  pub(crate) fn encode(&self, buf: &mut [u8]) {
    let klen = self.data.len();
    buf[..klen].copy_from_slice(self.data);
    buf[klen..].copy_from_slice(&self.version.to_le_bytes());
  }

  /// Decodes a key from its arena encoding.
  #[inline]
  pub(crate) fn decode(buf: &'a [u8]) -> Self {
    let klen = buf.len() - VERSION_SIZE;
    let version = u64::from_le_bytes(buf[klen..].try_into().unwrap());
    Self {
      data: &buf[..klen],
      version,
    }
  }
}

impl<'a> PartialEq for KeyRef<'a> {
  fn eq(&self, other: &Self) -> bool {
    self.data == other.data && self.version == other.version
  }
}

impl<'a> Eq for KeyRef<'a> {}

impl<'a> PartialOrd for KeyRef<'a> {
  fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
    Some(self.cmp(other))
  }
}

impl<'a> Ord for KeyRef<'a> {
  fn cmp(&self, other: &Self) -> cmp::Ordering {
    self
      .data
      .cmp(other.data)
      .then_with(|| other.version.cmp(&self.version))
  }
}
