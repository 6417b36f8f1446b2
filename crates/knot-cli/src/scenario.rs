//! Scenario files: repositories, installed packages and a request in one
//! JSON document.

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use knot_semver::{Stability, VersionParser};
use knot_solver::{
    ArrayRepository, DefaultPolicy, InstalledRepository, Job, JobCommand, Package,
    PackageManifest, PoolConfig, Request, RootAlias,
};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Scenario {
    /// Least stable release accepted, `stable` when absent
    #[serde(default)]
    pub minimum_stability: Option<String>,

    /// Per-package overrides of the minimum stability
    #[serde(default)]
    pub stability_flags: IndexMap<String, String>,

    #[serde(default)]
    pub prefer_stable: bool,

    #[serde(default)]
    pub prefer_lowest: bool,

    /// Remote repositories, highest priority first
    #[serde(default)]
    pub repositories: Vec<Vec<PackageManifest>>,

    #[serde(default)]
    pub installed: Vec<PackageManifest>,

    #[serde(default)]
    pub root_aliases: Vec<RootAliasEntry>,

    #[serde(default)]
    pub request: Vec<JobEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RootAliasEntry {
    pub package: String,
    pub version: String,
    pub alias: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobEntry {
    pub command: JobCommand,

    /// Target package; not used by `update-all`
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub constraint: Option<String>,

    /// Keep the installed version of an install target
    #[serde(default)]
    pub fixed: bool,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse scenario {}", path.display()))
    }

    pub fn pool_config(&self) -> Result<PoolConfig> {
        let mut config = PoolConfig::default();

        if let Some(minimum) = &self.minimum_stability {
            let stability: Stability = minimum
                .parse()
                .with_context(|| format!("Invalid minimum-stability \"{}\"", minimum))?;
            config = config.with_minimum_stability(stability);
        }

        for (name, flag) in &self.stability_flags {
            let stability: Stability = flag
                .parse()
                .with_context(|| format!("Invalid stability flag for {}", name))?;
            config = config.with_stability_flag(name, stability);
        }

        Ok(config)
    }

    pub fn policy(&self) -> DefaultPolicy {
        DefaultPolicy::new()
            .prefer_stable(self.prefer_stable)
            .prefer_lowest(self.prefer_lowest)
    }

    pub fn installed_repository(&self) -> Result<InstalledRepository> {
        let mut repo = InstalledRepository::new();
        for manifest in &self.installed {
            repo.add_package(package_from_manifest(manifest, "installed")?);
        }
        Ok(repo)
    }

    pub fn remote_repositories(&self) -> Result<Vec<ArrayRepository>> {
        self.repositories
            .iter()
            .enumerate()
            .map(|(index, manifests)| {
                let name = format!("repository-{}", index + 1);
                let mut repo = ArrayRepository::new(name.as_str());
                for manifest in manifests {
                    repo.add_package(package_from_manifest(manifest, &name)?);
                }
                Ok(repo)
            })
            .collect()
    }

    pub fn root_aliases(&self) -> Result<Vec<RootAlias>> {
        let parser = VersionParser::new();
        self.root_aliases
            .iter()
            .map(|entry| {
                Ok(RootAlias {
                    package: entry.package.to_lowercase(),
                    version: parser
                        .normalize(&entry.version)
                        .with_context(|| format!("Invalid version in root alias for {}", entry.package))?,
                    alias: entry.alias.clone(),
                    alias_normalized: parser
                        .normalize(&entry.alias)
                        .with_context(|| format!("Invalid alias for {}", entry.package))?,
                })
            })
            .collect()
    }

    pub fn request(&self) -> Result<Request> {
        let mut request = Request::new();

        for (index, entry) in self.request.iter().enumerate() {
            let name = match (entry.command, &entry.name) {
                (JobCommand::UpdateAll, _) => String::new(),
                (_, Some(name)) => name.clone(),
                (command, None) => bail!("Request entry {} ({}) has no package name", index + 1, command),
            };

            let mut job = Job::parse(entry.command, &name, entry.constraint.as_deref())
                .with_context(|| format!("Invalid request entry {} for {}", index + 1, name))?;
            job.fixed = entry.fixed;
            request.add_job(job);
        }

        Ok(request)
    }
}

fn package_from_manifest(manifest: &PackageManifest, repository: &str) -> Result<Package> {
    Package::from_manifest(manifest).with_context(|| {
        format!(
            "Invalid package {} {} in {}",
            manifest.name, manifest.version, repository
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(json: &str) -> Scenario {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_defaults() {
        let scenario = parse("{}");
        assert!(scenario.repositories.is_empty());
        assert!(scenario.request().unwrap().is_empty());
        assert_eq!(scenario.pool_config().unwrap().minimum_stability, Stability::Stable);
    }

    #[test]
    fn test_full_scenario() {
        let scenario = parse(
            r#"{
                "minimum-stability": "beta",
                "stability-flags": {"acme/edge": "dev"},
                "prefer-lowest": true,
                "repositories": [[{"name": "acme/log", "version": "1.0", "require": {"psr/log": "^1.0"}}]],
                "installed": [{"name": "acme/old", "version": "2.0"}],
                "request": [
                    {"command": "install", "name": "acme/log", "constraint": "^1.0", "fixed": true},
                    {"command": "update-all"}
                ]
            }"#,
        );

        let config = scenario.pool_config().unwrap();
        assert_eq!(config.minimum_stability, Stability::Beta);
        assert_eq!(config.stability_flags.get("acme/edge"), Some(&Stability::Dev));
        assert!(scenario.policy().prefer_lowest);

        let repos = scenario.remote_repositories().unwrap();
        assert_eq!(repos.len(), 1);

        let request = scenario.request().unwrap();
        assert_eq!(request.jobs().len(), 2);
        assert!(request.jobs()[0].fixed);
        assert_eq!(request.jobs()[1].command, JobCommand::UpdateAll);
    }

    #[test]
    fn test_missing_name_is_rejected() {
        let scenario = parse(r#"{"request": [{"command": "install"}]}"#);
        assert!(scenario.request().is_err());
    }

    #[test]
    fn test_invalid_stability_is_rejected() {
        let scenario = parse(r#"{"minimum-stability": "sometimes"}"#);
        assert!(scenario.pool_config().is_err());
    }

    #[test]
    fn test_root_alias_normalized() {
        let scenario = parse(
            r#"{"root-aliases": [{"package": "Acme/Core", "version": "dev-main", "alias": "1.0.x-dev"}]}"#,
        );
        let aliases = scenario.root_aliases().unwrap();
        assert_eq!(aliases[0].package, "acme/core");
        assert_eq!(aliases[0].version, "dev-main");
        assert_eq!(aliases[0].alias_normalized, "1.0.9999999.9999999-dev");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"request": [{{"command": "install", "name": "acme/log"}}]}}"#).unwrap();

        let scenario = Scenario::load(file.path()).unwrap();
        assert_eq!(scenario.request.len(), 1);
    }
}
