//! Map whose reads wait for writes
//!
//! A [`WaitMap`] coordinates producers and consumers that have no other
//! scheduling relationship: one side computes a value for a key, any number
//! of readers wait for it. See the [`map`] module for the locking scheme.

mod gate;
pub mod map;
pub mod stream;

// Re-export the container and its stream for convenience
pub use map::WaitMap;
pub use stream::ValueStream;
