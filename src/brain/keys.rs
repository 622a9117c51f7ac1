//! Datum key policy and reserved keys
//!
//! Internal keys are `<namespace>[:<extension>]:<name>`. Every segment is
//! word characters plus `.`, `-` and `/`; the colon is the separator and
//! is never allowed inside a segment.

use crate::error::{Error, Result};
use regex::Regex;
use std::sync::OnceLock;

/// Segment separator
pub const SEPARATOR: char = ':';

/// Namespace owned by the robot itself; tasks may not use it
pub const RESERVED_NAMESPACE: &str = "bot";

/// The real brain key, wrapped under the operator's unlocking key
pub const ENCRYPTION_KEY: &str = "bot:encryptionKey";

/// Task and repository parameters
pub const PARAMETERS_KEY: &str = "bot:parameters";

/// Task and repository secrets
pub const SECRETS_KEY: &str = "bot:secrets";

/// Prefix for job run histories
pub const HISTORY_PREFIX: &str = "bot:histories:";

/// Key holding the history of one job or plugin
pub fn history_key(spec: &str) -> Result<String> {
    validate_segment(spec)?;
    Ok(format!("{}{}", HISTORY_PREFIX, spec))
}

fn segment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[\w./-]+$").expect("static key pattern"))
}

/// Validate one caller-supplied key segment
pub fn validate_segment(segment: &str) -> Result<()> {
    if segment.contains(SEPARATOR) {
        tracing::error!(key = segment, "Invalid memory key, ':' disallowed");
        return Err(Error::InvalidKey(format!(
            "'{}': '{}' is reserved",
            segment, SEPARATOR
        )));
    }
    if !segment_re().is_match(segment) {
        tracing::error!(key = segment, "Invalid memory key");
        return Err(Error::InvalidKey(format!(
            "'{}': only word characters, '.', '-' and '/' are allowed",
            segment
        )));
    }
    Ok(())
}

/// Validate a complete internal key (one or more segments)
pub fn validate_key(key: &str) -> Result<()> {
    if key.split(SEPARATOR).all(|s| segment_re().is_match(s)) {
        Ok(())
    } else {
        tracing::error!(key, "Invalid memory key");
        Err(Error::InvalidKey(key.to_string()))
    }
}

/// Join namespace, optional extension and name into an internal key
pub(crate) fn namespaced(namespace: &str, extension: Option<&str>, name: &str) -> String {
    match extension {
        Some(ext) => format!("{}{sep}{}{sep}{}", namespace, ext, name, sep = SEPARATOR),
        None => format!("{}{}{}", namespace, SEPARATOR, name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_policy() {
        assert!(validate_segment("lunch_spots").is_ok());
        assert!(validate_segment("job-42.run").is_ok());
        assert!(validate_segment("org/repo").is_ok());

        assert!(matches!(validate_segment("a:b"), Err(Error::InvalidKey(_))));
        assert!(validate_segment("").is_err());
        assert!(validate_segment("has space").is_err());
    }

    #[test]
    fn test_full_key_policy() {
        assert!(validate_key("lists:lunch").is_ok());
        assert!(validate_key(ENCRYPTION_KEY).is_ok());
        assert!(validate_key("single").is_ok());

        assert!(validate_key("lists::lunch").is_err());
        assert!(validate_key(":lunch").is_err());
        assert!(validate_key("lists:lunch menu").is_err());
    }

    #[test]
    fn test_namespaced() {
        assert_eq!(namespaced("lists", None, "lunch"), "lists:lunch");
        assert_eq!(
            namespaced("builder", Some("org/repo"), "last-run"),
            "builder:org/repo:last-run"
        );
    }

    #[test]
    fn test_history_key() {
        assert_eq!(history_key("nightly").unwrap(), "bot:histories:nightly");
        assert!(history_key("bad:spec").is_err());
    }
}
