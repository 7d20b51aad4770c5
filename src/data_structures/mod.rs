//! Specialized data structures used by the island manager.

pub mod bit_vec;
pub mod slot_pool;

pub use arrayvec::ArrayVec;
