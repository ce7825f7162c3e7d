#![doc = include_str!("../README.md")]
#![deny(missing_docs)]

mod arena;
mod error;
mod key;
mod list;
mod value;

pub use error::{ArenaError, Error};
pub use key::{Key, KeyRef};
pub use list::{Hint, Iter, SkipMap, UniIter};
pub use value::{Value, ValueRef};

/// Re-export bytes crate
pub use bytes;

/// Maximum height of a node tower. Level 0 contains every node; each
/// successive level contains a geometrically decreasing subset.
pub const MAX_HEIGHT: usize = 20;

mod sync {
  pub(crate) use core::sync::atomic::*;
  #[cfg(test)]
  pub(crate) use std::sync::Arc;
}
