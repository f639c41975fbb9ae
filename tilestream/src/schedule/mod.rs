//! Asynchronous load scheduling.
//!
//! The scheduler issues, tracks, cancels and completes load operations, one
//! at most in flight per node. Loads run as spawned tasks on the tokio
//! runtime; each task races its loader future against a cancellation token
//! and reports through a multi-producer completion channel. The single
//! consumer is the refinement pass, which drains the channel at the start of
//! every tick — so all tree mutation stays on the pass thread and the tree
//! itself needs no locks.
//!
//! A completion is applied only if its node still exists and the request id
//! matches the live request; anything else (evicted node, superseded
//! request) is dropped silently. That is what makes removing a data source
//! race-free with its in-flight loads.

mod completion;
mod scheduler;

pub use completion::{Completion, CompletionQueue, RequestId};
pub use scheduler::{DrainReport, LoadFailure, LoadScheduler, ScheduleError};
