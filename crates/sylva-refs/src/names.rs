//! Branch name rules.
//!
//! Names are slash-separated paths such as `main` or `clients/7/draft`.
//! They follow the git ref rules that matter for a flat name space, plus a
//! ban on a leading `-` so names never read as command-line flags.

use crate::error::{RefError, RefResult};

/// Characters rejected anywhere in a name, besides control characters and
/// whitespace.
const FORBIDDEN: &[char] = &['~', '^', ':', '?', '*', '[', '\\'];

/// Substrings rejected anywhere in a name.
const FORBIDDEN_SEQUENCES: &[&str] = &["..", "@{", "//"];

fn invalid(name: &str, reason: impl Into<String>) -> RefError {
    RefError::InvalidBranchName {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Check that `name` can be used as a branch name.
///
/// ```
/// use sylva_refs::validate_branch_name;
///
/// assert!(validate_branch_name("main").is_ok());
/// assert!(validate_branch_name("clients/7").is_ok());
/// assert!(validate_branch_name("").is_err());
/// assert!(validate_branch_name("bad..name").is_err());
/// ```
pub fn validate_branch_name(name: &str) -> RefResult<()> {
    if name.is_empty() {
        return Err(invalid(name, "empty"));
    }
    if let Some(c) = name
        .chars()
        .find(|c| c.is_control() || c.is_whitespace() || FORBIDDEN.contains(c))
    {
        return Err(invalid(name, format!("forbidden character {c:?}")));
    }
    if let Some(seq) = FORBIDDEN_SEQUENCES.iter().find(|seq| name.contains(**seq)) {
        return Err(invalid(name, format!("contains {seq:?}")));
    }
    if name.starts_with('-') {
        return Err(invalid(name, "starts with '-'"));
    }
    if name.starts_with('/') || name.ends_with('/') {
        return Err(invalid(name, "leading or trailing '/'"));
    }
    if name.ends_with('.') || name.ends_with(".lock") {
        return Err(invalid(name, "ends with '.' or '.lock'"));
    }
    if let Some(component) = name.split('/').find(|c| c.starts_with('.')) {
        return Err(invalid(name, format!("component {component:?} starts with '.'")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(name: &str) -> bool {
        validate_branch_name(name).is_err()
    }

    #[test]
    fn accepts_ordinary_names() {
        for name in ["main", "feature-x", "v1.0", "clients/42/draft", "a@b"] {
            assert!(validate_branch_name(name).is_ok(), "{name} rejected");
        }
    }

    #[test]
    fn rejects_characters() {
        for name in ["", "has space", "tab\there", "bell\u{7}", "a~b", "a^b", "a:b", "a?b", "a*b", "a[b", "a\\b"] {
            assert!(rejected(name), "{name:?} accepted");
        }
    }

    #[test]
    fn rejects_sequences() {
        assert!(rejected("bad..name"));
        assert!(rejected("ref@{0}"));
        assert!(rejected("a//b"));
    }

    #[test]
    fn rejects_edges() {
        for name in ["-x", ".hidden", "trailing.", "/leading", "trailing/", "main.lock", "feature/.hidden"] {
            assert!(rejected(name), "{name:?} accepted");
        }
    }

    #[test]
    fn error_carries_name_and_reason() {
        let err = validate_branch_name("a..b").unwrap_err();
        assert!(matches!(&err, RefError::InvalidBranchName { name, .. } if name == "a..b"));
        assert!(err.to_string().contains(".."));
    }
}
