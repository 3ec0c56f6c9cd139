//! Engine-owned state and its journal.
//!
//! All process-wide state (deposits, nonces, deployed code and contract storage) lives in one
//! [`WorldState`] owned by the [`Journal`]. Every mutation goes through the journal, which
//! records the previous value so that any scope can be rolled back to a
//! [`JournalCheckpoint`]. Admission runs under one checkpoint for the whole batch; settlement
//! opens one per operation, and nested calls open their own.

mod journal;
mod world;

pub use journal::*;
pub use world::*;
