// src/exec/mod.rs

//! Backend execution layer.
//!
//! - [`backend`] defines the `Backend` capability trait the scheduler depends
//!   on, plus the request/response/error types.
//! - [`command`] is the shipped production backend: a subprocess bridge
//!   speaking JSON over stdin/stdout.
//! - [`backoff`] centralises per-backend rate-limit backoff state.
//! - [`worker`] runs one subtask attempt loop (deadline, retries,
//!   cancellation) against an assigned backend.

pub mod backend;
pub mod backoff;
pub mod command;
pub mod worker;

pub use backend::{Backend, BackendError, BackendErrorKind, BackendRequest, BackendResponse};
pub use backoff::RateGate;
pub use command::CommandBackend;
