//! Version-string grammar.
//!
//! The version space is the disjoint union of SemVer release strings
//! ("1.2.3-rc.1") and branch markers ("~master"). The `~~` prefix is
//! reserved so the two halves can never collide.

use crate::error::{RegistryError, Result};

/// A parsed version string: either a tagged release or a branch tip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSpec {
    Release(semver::Version),
    Branch(String),
}

impl VersionSpec {
    /// Parse a stored version string.
    ///
    /// `"~NAME"` is a branch as long as NAME does not itself start with `~`;
    /// anything else must be a valid SemVer.
    pub fn parse(s: &str) -> Result<Self> {
        if let Some(branch) = s.strip_prefix('~') {
            if branch.is_empty() || branch.starts_with('~') {
                return Err(RegistryError::InvalidVersion(s.to_string()));
            }
            return Ok(VersionSpec::Branch(branch.to_string()));
        }
        semver::Version::parse(s)
            .map(VersionSpec::Release)
            .map_err(|_| RegistryError::InvalidVersion(s.to_string()))
    }

    pub fn is_branch(&self) -> bool {
        matches!(self, VersionSpec::Branch(_))
    }

    /// The argument handed to the repository driver when downloading:
    /// `"~NAME"` for a branch, `"vX.Y.Z"` for a tag.
    pub fn download_ref(&self) -> String {
        match self {
            VersionSpec::Branch(name) => format!("~{name}"),
            VersionSpec::Release(v) => format!("v{v}"),
        }
    }
}

impl std::fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VersionSpec::Branch(name) => write!(f, "~{name}"),
            VersionSpec::Release(v) => write!(f, "{v}"),
        }
    }
}

/// The SemVer carried by a `v`-prefixed tag name, if it is one.
///
/// `"v1.2.3-rc.1+build"` yields the parsed version; `"vbogus"` or `"1.2.3"`
/// yield `None`.
pub fn tag_semver(tag_name: &str) -> Option<semver::Version> {
    let rest = tag_name.strip_prefix('v')?;
    semver::Version::parse(rest).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_release_strings() {
        let spec = VersionSpec::parse("1.2.3-rc.1+build.5").unwrap();
        assert!(!spec.is_branch());
        assert_eq!(spec.to_string(), "1.2.3-rc.1+build.5");
        assert_eq!(spec.download_ref(), "v1.2.3-rc.1+build.5");
    }

    #[test]
    fn parses_branch_strings() {
        let spec = VersionSpec::parse("~master").unwrap();
        assert!(spec.is_branch());
        assert_eq!(spec.to_string(), "~master");
        assert_eq!(spec.download_ref(), "~master");
    }

    #[test]
    fn double_tilde_is_reserved() {
        assert!(VersionSpec::parse("~~master").is_err());
        assert!(VersionSpec::parse("~~").is_err());
        assert!(VersionSpec::parse("~").is_err());
    }

    #[test]
    fn non_semver_non_branch_rejected() {
        assert!(VersionSpec::parse("1.2").is_err());
        assert!(VersionSpec::parse("latest").is_err());
    }

    #[test]
    fn tag_semver_filters() {
        assert_eq!(tag_semver("v1.0.0").unwrap().to_string(), "1.0.0");
        assert!(tag_semver("v1.0.0-beta.2").is_some());
        assert!(tag_semver("vbogus").is_none());
        assert!(tag_semver("1.0.0").is_none());
        assert!(tag_semver("release-1.0.0").is_none());
    }

    #[test]
    fn tag_ordering_is_semver_not_lexicographic() {
        let mut tags = vec![
            tag_semver("v0.10.0").unwrap(),
            tag_semver("v0.2.0").unwrap(),
            tag_semver("v0.9.1").unwrap(),
        ];
        tags.sort();
        let ordered: Vec<String> = tags.iter().map(|v| v.to_string()).collect();
        assert_eq!(ordered, vec!["0.2.0", "0.9.1", "0.10.0"]);
    }
}
