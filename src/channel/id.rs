//! Channel identifiers.

use std::fmt::{Display, Formatter};

use uuid::Uuid;

const PREFIX: &str = "desktop-session-";

/// Rendezvous token naming one attach attempt.
///
/// Backed by a v4 UUID drawn from the OS CSPRNG. A fresh identifier is
/// generated for every attempt; it doubles as the only admission credential
/// for the channel, so identifiers are never reused or derived.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelId(String);

impl ChannelId {
    /// Generate a new random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("{PREFIX}{}", Uuid::new_v4().simple()))
    }

    /// String form, safe for use as a file name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ChannelId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
