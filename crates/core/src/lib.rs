//! Domain types for tracking a remote content-generation job.
//!
//! Everything in this crate is pure: no I/O, no timers. The
//! [`reconciler::Reconciler`] merges updates from the poll and stream
//! channels into a single [`job::JobView`]; transports and lifecycle
//! management live in `quill-client`.

pub mod error;
pub mod job;
pub mod job_events;
pub mod log;
pub mod reconciler;
pub mod request;
pub mod types;
pub mod update;
