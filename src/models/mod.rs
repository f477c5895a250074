//! Domain model module declarations.

pub mod desktop;
pub mod session;
