//! Session orchestration.
//!
//! Covers the attach/detach state machine, worker process launching, the
//! single-shot attach timer, and the delegate boundary to the rest of the
//! host.

pub mod controller;
pub mod delegate;
pub mod launcher;
pub mod mailbox;
pub mod timer;
