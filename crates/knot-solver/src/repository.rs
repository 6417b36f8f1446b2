//! Package sources registered in a pool

use std::fmt;
use std::sync::Arc;

use knot_semver::VersionParser;

use crate::error::{Result, SolverError};
use crate::package::{AliasPackage, Package, PackageManifest, PoolPackage};

/// A named, ordered collection of packages
pub trait Repository: fmt::Debug {
    fn name(&self) -> &str;

    /// Packages in registration order
    fn packages(&self) -> &[PoolPackage];

    /// Packages already present on the system; exempt from stability filtering
    fn is_installed(&self) -> bool {
        false
    }

    fn count(&self) -> usize {
        self.packages().len()
    }

    fn find_packages(&self, name: &str) -> Vec<&PoolPackage> {
        let name = name.to_lowercase();
        self.packages().iter().filter(|p| p.name() == name).collect()
    }

    fn has_package(&self, name: &str, version: &str) -> bool {
        let name = name.to_lowercase();
        self.packages()
            .iter()
            .any(|p| p.name() == name && p.version() == version)
    }
}

/// In-memory repository
#[derive(Debug, Clone, Default)]
pub struct ArrayRepository {
    name: String,
    packages: Vec<PoolPackage>,
}

impl ArrayRepository {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            packages: Vec::new(),
        }
    }

    /// Loads a JSON array of package objects
    pub fn from_json(name: impl Into<String>, json: &serde_json::Value) -> Result<Self> {
        let manifests: Vec<PackageManifest> = serde_json::from_value(json.clone())?;
        let mut repo = Self::new(name);
        for (index, manifest) in manifests.iter().enumerate() {
            let package = Package::from_manifest(manifest).map_err(|e| SolverError::InvalidPackage {
                name: format!("{}[{}]", repo.name, index),
                reason: e.to_string(),
            })?;
            repo.add_package(package);
        }
        Ok(repo)
    }

    /// Adds a package, plus an alias for its `extra.branch-alias` entry when
    /// the package is a dev branch.
    pub fn add_package(&mut self, package: Package) -> Arc<Package> {
        let package = Arc::new(package);
        self.packages.push(PoolPackage::Concrete(package.clone()));

        if let Some((version, pretty_version)) = branch_alias(&package) {
            log::trace!("{} aliased as {}", package.pretty_string(), pretty_version);
            self.add_alias(AliasPackage::new(package.clone(), version, pretty_version));
        }

        package
    }

    pub fn add_alias(&mut self, alias: AliasPackage) {
        self.packages.push(PoolPackage::Alias(Arc::new(alias)));
    }

    pub fn with_packages(mut self, packages: impl IntoIterator<Item = Package>) -> Self {
        for package in packages {
            self.add_package(package);
        }
        self
    }
}

impl Repository for ArrayRepository {
    fn name(&self) -> &str {
        &self.name
    }

    fn packages(&self) -> &[PoolPackage] {
        &self.packages
    }
}

/// `extra.branch-alias` target for a dev package, normalized and pretty.
fn branch_alias(package: &Package) -> Option<(String, String)> {
    if !package.is_dev() {
        return None;
    }

    let aliases = package.extra.get("branch-alias")?.as_object()?;
    let target = aliases.get(&package.pretty_version)?.as_str()?;

    // Only numeric branch aliases like `1.0.x-dev` make sense
    let stripped = target.strip_suffix("-dev")?;
    let parser = VersionParser::new();
    let version = parser.normalize_branch(stripped);
    if !version.ends_with("-dev") || version.starts_with("dev-") {
        return None;
    }

    Some((version, target.to_string()))
}

/// Packages currently installed on the system
#[derive(Debug, Clone)]
pub struct InstalledRepository {
    inner: ArrayRepository,
}

impl InstalledRepository {
    pub fn new() -> Self {
        Self {
            inner: ArrayRepository::new("installed"),
        }
    }

    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        Ok(Self {
            inner: ArrayRepository::from_json("installed", json)?,
        })
    }

    pub fn add_package(&mut self, package: Package) -> Arc<Package> {
        self.inner.add_package(package)
    }

    pub fn with_packages(mut self, packages: impl IntoIterator<Item = Package>) -> Self {
        self.inner = self.inner.with_packages(packages);
        self
    }
}

impl Default for InstalledRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl Repository for InstalledRepository {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn packages(&self) -> &[PoolPackage] {
        self.inner.packages()
    }

    fn is_installed(&self) -> bool {
        true
    }
}
