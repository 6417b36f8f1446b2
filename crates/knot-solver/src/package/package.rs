use std::fmt;

use indexmap::IndexMap;
use knot_semver::{Constraint, Stability, VersionConstraint, VersionParser};
use serde::{Deserialize, Serialize};

use super::{Link, LinkType};
use crate::error::{Result, SolverError};

/// Package metadata as it appears in a repository listing
///
/// Link maps hold raw constraint strings; [`Package::from_manifest`] parses
/// them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageManifest {
    pub name: String,

    pub version: String,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub package_type: Option<String>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub require: IndexMap<String, String>,

    #[serde(rename = "require-dev", default, skip_serializing_if = "IndexMap::is_empty")]
    pub require_dev: IndexMap<String, String>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub conflict: IndexMap<String, String>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub provide: IndexMap<String, String>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub replace: IndexMap<String, String>,

    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub extra: serde_json::Value,
}

/// A concrete package version
#[derive(Debug, Clone)]
pub struct Package {
    /// Lowercase package name, e.g. `acme/log`
    pub name: String,
    /// Name as published
    pub pretty_name: String,
    /// Normalized version (`1.2.0.0`)
    pub version: String,
    /// Version as published (`v1.2`)
    pub pretty_version: String,
    pub stability: Stability,
    pub package_type: String,
    pub requires: Vec<Link>,
    pub dev_requires: Vec<Link>,
    pub conflicts: Vec<Link>,
    pub provides: Vec<Link>,
    pub replaces: Vec<Link>,
    pub extra: serde_json::Value,
}

impl Package {
    /// Creates a package without links; `version` is normalized.
    pub fn new(name: impl Into<String>, version: &str) -> Result<Self> {
        let pretty_name = name.into();
        if pretty_name.trim().is_empty() {
            return Err(SolverError::InvalidPackage {
                name: pretty_name,
                reason: "package name is empty".to_string(),
            });
        }

        let normalized = VersionParser::new().normalize(version)?;
        Ok(Self {
            name: pretty_name.to_lowercase(),
            stability: VersionParser::parse_stability(&normalized),
            pretty_name,
            version: normalized,
            pretty_version: version.trim().to_string(),
            package_type: "library".to_string(),
            requires: Vec::new(),
            dev_requires: Vec::new(),
            conflicts: Vec::new(),
            provides: Vec::new(),
            replaces: Vec::new(),
            extra: serde_json::Value::Null,
        })
    }

    /// Builds a package from manifest data, parsing every link constraint.
    pub fn from_manifest(manifest: &PackageManifest) -> Result<Self> {
        let mut package = Self::new(manifest.name.as_str(), &manifest.version)?;
        if let Some(package_type) = &manifest.package_type {
            package.package_type = package_type.clone();
        }
        package.extra = manifest.extra.clone();

        let sections = [
            (&manifest.require, LinkType::Require),
            (&manifest.require_dev, LinkType::DevRequire),
            (&manifest.conflict, LinkType::Conflict),
            (&manifest.provide, LinkType::Provide),
            (&manifest.replace, LinkType::Replace),
        ];
        for (links, link_type) in sections {
            for (target, constraint) in links {
                package.add_link(link_type, target, constraint)?;
            }
        }

        Ok(package)
    }

    /// Parses a JSON object into a package.
    pub fn from_json(json: &str) -> Result<Self> {
        let manifest: PackageManifest = serde_json::from_str(json)?;
        Self::from_manifest(&manifest)
    }

    /// Adds a link; `self.version` resolves to this package's own version.
    pub fn add_link(&mut self, link_type: LinkType, target: &str, constraint: &str) -> Result<()> {
        let link = if constraint.trim() == "self.version" {
            let mut exact = Constraint::exact(self.version.clone());
            exact.set_pretty_string(Some(self.pretty_version.clone()));
            Link::new(self.name.as_str(), target, Box::new(exact), link_type)
                .with_pretty_constraint("self.version")
        } else {
            let parsed = VersionParser::new().parse_constraints(constraint)?;
            Link::new(self.name.as_str(), target, parsed, link_type)
        };

        self.links_mut(link_type).push(link);
        Ok(())
    }

    /// Builder form of [`Package::add_link`] for `require`.
    pub fn with_require(mut self, target: &str, constraint: &str) -> Result<Self> {
        self.add_link(LinkType::Require, target, constraint)?;
        Ok(self)
    }

    pub fn with_conflict(mut self, target: &str, constraint: &str) -> Result<Self> {
        self.add_link(LinkType::Conflict, target, constraint)?;
        Ok(self)
    }

    pub fn with_provide(mut self, target: &str, constraint: &str) -> Result<Self> {
        self.add_link(LinkType::Provide, target, constraint)?;
        Ok(self)
    }

    pub fn with_replace(mut self, target: &str, constraint: &str) -> Result<Self> {
        self.add_link(LinkType::Replace, target, constraint)?;
        Ok(self)
    }

    pub fn links(&self, link_type: LinkType) -> &[Link] {
        match link_type {
            LinkType::Require => &self.requires,
            LinkType::DevRequire => &self.dev_requires,
            LinkType::Conflict => &self.conflicts,
            LinkType::Provide => &self.provides,
            LinkType::Replace => &self.replaces,
        }
    }

    fn links_mut(&mut self, link_type: LinkType) -> &mut Vec<Link> {
        match link_type {
            LinkType::Require => &mut self.requires,
            LinkType::DevRequire => &mut self.dev_requires,
            LinkType::Conflict => &mut self.conflicts,
            LinkType::Provide => &mut self.provides,
            LinkType::Replace => &mut self.replaces,
        }
    }

    pub fn is_dev(&self) -> bool {
        self.stability == Stability::Dev
    }

    /// Own name followed by every provided and replaced name.
    pub fn names(&self) -> Vec<&str> {
        let mut names = vec![self.name.as_str()];
        for link in self.provides.iter().chain(self.replaces.iter()) {
            if !names.contains(&link.target.as_str()) {
                names.push(link.target.as_str());
            }
        }
        names
    }

    /// `name-version`, unique within a repository
    pub fn unique_name(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    pub fn pretty_string(&self) -> String {
        format!("{} {}", self.pretty_name, self.pretty_version)
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pretty_string())
    }
}
