use thiserror::Error;

/// Reasons an allocator could not be set up over an arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InitError {
  #[error("arena pointer is null")]
  NullArena,

  #[error("arena of {capacity} bytes is too small (need at least {required})")]
  TooSmall { capacity: usize, required: usize },

  #[error("could not provision a {capacity} byte arena")]
  ProvisionFailed { capacity: usize },
}
