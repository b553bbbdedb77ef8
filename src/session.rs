use std::fmt;

use uuid::Uuid;

/// Opaque correlation key scoping all requests from one run of the client.
///
/// Generated once at startup and threaded explicitly into every request; it is
/// never persisted, so a restart starts a fresh conversation on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First block of the UUID, enough to tell sessions apart in the header.
    pub fn short(&self) -> &str {
        &self.0[..8]
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_unique() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_short_is_prefix() {
        let id = SessionId::generate();
        assert_eq!(id.short().len(), 8);
        assert!(id.as_str().starts_with(id.short()));
    }
}
