/// An error indicating that the arena is full
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub struct ArenaError;

impl core::fmt::Display for ArenaError {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    write!(f, "allocation failed because arena is full")
  }
}

impl std::error::Error for ArenaError {}

/// Error type for the [`SkipMap`](crate::SkipMap).
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum Error {
  /// Indicates that the arena is full
  Full(ArenaError),

  /// Indicates that the key is too large to be stored in the `SkipMap`.
  KeyTooLarge {
    /// The encoded size of the key.
    size: usize,
    /// The max encoded size of the key.
    maximum_size: usize,
  },

  /// Indicates that the value is too large to be stored in the `SkipMap`.
  ValueTooLarge {
    /// The encoded size of the value.
    size: usize,
    /// The max encoded size of the value.
    maximum_size: usize,
  },
}

impl core::fmt::Display for Error {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    match self {
      Self::Full(e) => write!(f, "{e}"),
      Self::KeyTooLarge { size, maximum_size } => write!(
        f,
        "key size {size} larger than the maximum size {maximum_size}"
      ),
      Self::ValueTooLarge { size, maximum_size } => write!(
        f,
        "value size {size} larger than the maximum size {maximum_size}"
      ),
    }
  }
}

impl std::error::Error for Error {}

impl From<ArenaError> for Error {
  fn from(e: ArenaError) -> Self {
    Self::Full(e)
  }
}
