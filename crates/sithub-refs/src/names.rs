//! Ref name validation following git-style conventions.
//!
//! A full ref name is either `HEAD` or starts with `refs/`. Every
//! slash-separated component:
//! - must be non-empty and must not start or end with `.`
//! - must not contain whitespace, control characters, `~`, `^`, `:`, `?`,
//!   `*`, `[` or `\`
//! - must not contain `..` or `@{`
//! - must not end with `.lock`

use crate::error::{RefError, RefResult};

/// The distinguished symbolic ref naming the current branch.
pub const HEAD: &str = "HEAD";

/// Namespace prefix for branches.
pub const HEADS_PREFIX: &str = "refs/heads/";

/// Namespace prefix for tags.
pub const TAGS_PREFIX: &str = "refs/tags/";

const FORBIDDEN_CHARS: &[char] = &['~', '^', ':', '?', '*', '[', '\\'];

/// Validate a full ref name (`HEAD` or `refs/...`).
///
/// ```
/// use sithub_refs::names::validate_ref_name;
///
/// assert!(validate_ref_name("HEAD").is_ok());
/// assert!(validate_ref_name("refs/heads/feature/auth").is_ok());
/// assert!(validate_ref_name("main").is_err());
/// assert!(validate_ref_name("refs/heads/bad..name").is_err());
/// ```
pub fn validate_ref_name(name: &str) -> RefResult<()> {
    if name == HEAD {
        return Ok(());
    }
    let Some(rest) = name.strip_prefix("refs/") else {
        return Err(RefError::invalid(name, "must be HEAD or start with refs/"));
    };
    if rest.is_empty() {
        return Err(RefError::invalid(name, "missing name after refs/"));
    }
    validate_path(name, rest)
}

/// Validate a short branch name such as `main` or `feature/auth`.
pub fn validate_branch_name(name: &str) -> RefResult<()> {
    if name.is_empty() {
        return Err(RefError::invalid(name, "branch name must not be empty"));
    }
    validate_path(name, name)
}

/// Full ref name for a short branch name.
pub fn branch_ref(short: &str) -> String {
    format!("{HEADS_PREFIX}{short}")
}

/// Full ref name for a short tag name.
pub fn tag_ref(short: &str) -> String {
    format!("{TAGS_PREFIX}{short}")
}

fn validate_path(full: &str, path: &str) -> RefResult<()> {
    if path.contains("@{") {
        return Err(RefError::invalid(full, "must not contain '@{'"));
    }
    for component in path.split('/') {
        validate_component(full, component)?;
    }
    Ok(())
}

fn validate_component(full: &str, component: &str) -> RefResult<()> {
    if component.is_empty() {
        return Err(RefError::invalid(full, "path components must not be empty"));
    }
    if component.starts_with('.') || component.ends_with('.') {
        return Err(RefError::invalid(
            full,
            format!("component must not start or end with '.': {component:?}"),
        ));
    }
    if component.contains("..") {
        return Err(RefError::invalid(full, "must not contain '..'"));
    }
    if component.ends_with(".lock") {
        return Err(RefError::invalid(full, "must not end with '.lock'"));
    }
    if let Some(ch) = component
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || FORBIDDEN_CHARS.contains(c))
    {
        return Err(RefError::invalid(
            full,
            format!("contains forbidden character: {ch:?}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn valid_names() {
        for name in [
            "HEAD",
            "refs/heads/main",
            "refs/heads/feature/auth",
            "refs/tags/v1.0",
            "refs/heads/user/alice/fix-123",
        ] {
            assert!(validate_ref_name(name).is_ok(), "rejected {name}");
        }
    }

    #[test]
    fn outside_namespace() {
        assert!(validate_ref_name("main").is_err());
        assert!(validate_ref_name("head").is_err());
        assert!(validate_ref_name("refs/").is_err());
        assert!(validate_ref_name("").is_err());
    }

    #[test]
    fn reject_bad_components() {
        for name in [
            "refs/heads/bad..name",
            "refs/heads/has space",
            "refs/heads/tab\there",
            "refs/heads/a~b",
            "refs/heads/a^b",
            "refs/heads/a:b",
            "refs/heads/a?b",
            "refs/heads/a*b",
            "refs/heads/a[b",
            "refs/heads/a\\b",
            "refs/heads/.hidden",
            "refs/heads/trailing.",
            "refs/heads/trailing/",
            "refs/heads//double",
            "refs/heads/main.lock",
            "refs/heads/ref@{0}",
            "refs/heads/bell\u{7}",
        ] {
            assert!(
                matches!(validate_ref_name(name), Err(RefError::InvalidName { .. })),
                "accepted {name:?}"
            );
        }
    }

    #[test]
    fn branch_helpers() {
        assert_eq!(branch_ref("main"), "refs/heads/main");
        assert_eq!(tag_ref("v1"), "refs/tags/v1");
        assert!(validate_branch_name("feature/x").is_ok());
        assert!(validate_branch_name("").is_err());
        assert!(validate_branch_name("/lead").is_err());
    }

    proptest! {
        #[test]
        fn generated_branches_validate(parts in proptest::collection::vec("[a-z0-9][a-z0-9_-]{0,6}", 1..4)) {
            let short = parts.join("/");
            prop_assert!(validate_branch_name(&short).is_ok());
            prop_assert!(validate_ref_name(&branch_ref(&short)).is_ok());
        }
    }
}
