// Package model for the resolver
//
// Concrete packages, version aliases and the links between them. The pool
// stores both kinds behind `PoolPackage`.

mod alias;
mod link;
#[allow(clippy::module_inception)]
mod package;

pub use alias::AliasPackage;
pub use link::{Link, LinkType};
pub use package::{Package, PackageManifest};

use std::fmt;
use std::sync::Arc;

use knot_semver::Stability;

/// A package as registered in the pool: a concrete version or an alias of one
#[derive(Debug, Clone)]
pub enum PoolPackage {
    Concrete(Arc<Package>),
    Alias(Arc<AliasPackage>),
}

impl PoolPackage {
    pub fn name(&self) -> &str {
        match self {
            PoolPackage::Concrete(p) => &p.name,
            PoolPackage::Alias(a) => a.name(),
        }
    }

    pub fn pretty_name(&self) -> &str {
        match self {
            PoolPackage::Concrete(p) => &p.pretty_name,
            PoolPackage::Alias(a) => a.pretty_name(),
        }
    }

    pub fn version(&self) -> &str {
        match self {
            PoolPackage::Concrete(p) => &p.version,
            PoolPackage::Alias(a) => a.version(),
        }
    }

    pub fn pretty_version(&self) -> &str {
        match self {
            PoolPackage::Concrete(p) => &p.pretty_version,
            PoolPackage::Alias(a) => a.pretty_version(),
        }
    }

    pub fn stability(&self) -> Stability {
        match self {
            PoolPackage::Concrete(p) => p.stability,
            PoolPackage::Alias(a) => a.stability(),
        }
    }

    pub fn links(&self, link_type: LinkType) -> &[Link] {
        match self {
            PoolPackage::Concrete(p) => p.links(link_type),
            PoolPackage::Alias(a) => a.links(link_type),
        }
    }

    pub fn requires(&self) -> &[Link] {
        self.links(LinkType::Require)
    }

    pub fn conflicts(&self) -> &[Link] {
        self.links(LinkType::Conflict)
    }

    pub fn provides(&self) -> &[Link] {
        self.links(LinkType::Provide)
    }

    pub fn replaces(&self) -> &[Link] {
        self.links(LinkType::Replace)
    }

    /// Own name followed by every provided and replaced name
    pub fn names(&self) -> Vec<&str> {
        let mut names = vec![self.name()];
        for link in self.provides().iter().chain(self.replaces()) {
            if !names.contains(&link.target.as_str()) {
                names.push(link.target.as_str());
            }
        }
        names
    }

    pub fn is_alias(&self) -> bool {
        matches!(self, PoolPackage::Alias(_))
    }

    pub fn is_root_package_alias(&self) -> bool {
        match self {
            PoolPackage::Concrete(_) => false,
            PoolPackage::Alias(a) => a.is_root_package_alias(),
        }
    }

    pub fn as_concrete(&self) -> Option<&Arc<Package>> {
        match self {
            PoolPackage::Concrete(p) => Some(p),
            PoolPackage::Alias(_) => None,
        }
    }

    pub fn as_alias(&self) -> Option<&Arc<AliasPackage>> {
        match self {
            PoolPackage::Concrete(_) => None,
            PoolPackage::Alias(a) => Some(a),
        }
    }

    /// The concrete package behind this entry
    pub fn base(&self) -> &Arc<Package> {
        match self {
            PoolPackage::Concrete(p) => p,
            PoolPackage::Alias(a) => a.alias_of(),
        }
    }

    pub fn unique_name(&self) -> String {
        format!("{}-{}", self.name(), self.version())
    }

    /// `pretty-name pretty-version`
    pub fn pretty_string(&self) -> String {
        format!("{} {}", self.pretty_name(), self.pretty_version())
    }
}

impl From<Package> for PoolPackage {
    fn from(package: Package) -> Self {
        PoolPackage::Concrete(Arc::new(package))
    }
}

impl From<Arc<Package>> for PoolPackage {
    fn from(package: Arc<Package>) -> Self {
        PoolPackage::Concrete(package)
    }
}

impl From<AliasPackage> for PoolPackage {
    fn from(alias: AliasPackage) -> Self {
        PoolPackage::Alias(Arc::new(alias))
    }
}

impl fmt::Display for PoolPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolPackage::Concrete(p) => write!(f, "{}", p),
            PoolPackage::Alias(a) => write!(f, "{}", a),
        }
    }
}
