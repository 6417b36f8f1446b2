use std::fmt;
use std::sync::Arc;

use knot_semver::VersionConstraint;
use serde::{Deserialize, Serialize};

/// Type of package link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    /// Regular require dependency
    #[serde(rename = "requires")]
    Require,
    /// Development dependency
    #[serde(rename = "devRequires")]
    DevRequire,
    /// Package provides this virtual package
    #[serde(rename = "provides")]
    Provide,
    /// Conflicts with this package
    #[serde(rename = "conflicts")]
    Conflict,
    /// Replaces this package
    #[serde(rename = "replaces")]
    Replace,
}

impl LinkType {
    /// Returns a human-readable description of the link type
    pub fn description(&self) -> &'static str {
        match self {
            LinkType::Require => "requires",
            LinkType::DevRequire => "requires (for development)",
            LinkType::Provide => "provides",
            LinkType::Conflict => "conflicts",
            LinkType::Replace => "replaces",
        }
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Represents a link between two packages
///
/// A link connects a source package to a target name with a parsed version
/// constraint. Requires, conflicts, provides and replaces are all links.
#[derive(Debug, Clone)]
pub struct Link {
    /// Source package name (lowercase)
    pub source: String,
    /// Target package name (lowercase)
    pub target: String,
    /// Parsed constraint, shared between clones
    pub constraint: Arc<dyn VersionConstraint>,
    /// Constraint as written in the manifest
    pub pretty_constraint: String,
    /// Type of link (require, conflict, etc.)
    pub link_type: LinkType,
}

impl Link {
    /// Creates a new link between two packages
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        constraint: Box<dyn VersionConstraint>,
        link_type: LinkType,
    ) -> Self {
        let pretty_constraint = constraint.pretty_string();
        Self {
            source: source.into().to_lowercase(),
            target: target.into().to_lowercase(),
            constraint: Arc::from(constraint),
            pretty_constraint,
            link_type,
        }
    }

    /// Overrides the displayed constraint (used for `self.version`)
    pub fn with_pretty_constraint(mut self, pretty: impl Into<String>) -> Self {
        self.pretty_constraint = pretty.into();
        self
    }

    /// Whether the constraint was written as `self.version`
    pub fn is_self_version(&self) -> bool {
        self.pretty_constraint == "self.version"
    }

    /// Returns e.g. `acme/app 1.0 requires acme/log >=1.2`
    pub fn pretty_string(&self, source_pretty_name: &str, source_pretty_version: &str) -> String {
        format!(
            "{} {} {} {} {}",
            source_pretty_name,
            source_pretty_version,
            self.link_type.description(),
            self.target,
            self.constraint.pretty_string()
        )
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} ({})",
            self.source,
            self.link_type.description(),
            self.target,
            self.pretty_constraint
        )
    }
}
