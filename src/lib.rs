#![forbid(unsafe_code)]

//! Host-side desktop session controller.
//!
//! Spawns the session-isolated worker process, validates it when it
//! connects back over a private channel, and keeps a stable
//! [`SessionProxy`](session::proxy::SessionProxy) bound to either the live
//! channel session or a placeholder while the worker is away.

pub mod channel;
pub mod config;
pub mod desktop_environment;
pub mod errors;
pub mod ipc;
pub mod models;
pub mod orchestrator;
pub mod session;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
