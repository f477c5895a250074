//! Private worker channel.
//!
//! - `id`: unguessable per-attempt rendezvous identifiers.
//! - `server`: per-attempt listener that hands each connection to the controller until stopped.
//! - `peer`: connecting-process identity resolution and validation.
//! - `codec` / `message`: NDJSON framing and the service ↔ worker message set.

pub mod codec;
pub mod id;
pub mod message;
pub mod peer;
pub mod server;
