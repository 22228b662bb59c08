//! Session identifiers.

use rand::Rng;

/// Unique identifier for one stream session, used for log correlation and
/// the `x-request-id` response header.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(pub String);

impl RequestId {
    /// Generate a new request ID.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let id = format!(
            "{:x}-{:08x}-{:08x}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos(),
            rng.gen::<u32>(),
            rng.gen::<u32>()
        );
        Self(id)
    }

    /// Create from an existing ID string.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_uniqueness() {
        let a = RequestId::generate();
        let b = RequestId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().split('-').count(), 3);
    }

    #[test]
    fn test_from_string_display() {
        let id = RequestId::from_string("req-42");
        assert_eq!(id.to_string(), "req-42");
    }
}
