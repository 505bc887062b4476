use ulid::Ulid;

/// Generates a new ULID-based ID with the given prefix.
///
/// # Examples
/// ```
/// let id = parlay_common::id::prefixed_ulid("ntf");
/// assert!(id.starts_with("ntf_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new().to_string())
}

/// Well-known ID prefixes.
pub mod prefix {
    pub const NOTIFICATION: &str = "ntf";
    pub const MESSAGE: &str = "msg";
    pub const CHAT: &str = "chat";
    pub const CONNECTION: &str = "cn";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixed_ulid_format() {
        let id = prefixed_ulid(prefix::NOTIFICATION);
        assert!(id.starts_with("ntf_"));
        // ULID is 26 chars, plus prefix + underscore
        assert_eq!(id.len(), 4 + 26);
    }

    #[test]
    fn test_uniqueness() {
        let a = prefixed_ulid("cn");
        let b = prefixed_ulid("cn");
        assert_ne!(a, b);
    }
}
