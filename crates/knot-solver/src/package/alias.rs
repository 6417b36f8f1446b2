use std::fmt;
use std::sync::Arc;

use knot_semver::{Constraint, Stability, VersionConstraint, VersionParser};

use super::{Link, LinkType, Package};

/// Represents a version alias for a package
///
/// An alias wraps another package and presents a different version while
/// delegating everything else to it. Branch aliases (`dev-main` as
/// `1.0.x-dev`) come from repositories; root aliases come from the user's
/// own requirements (`dev-main as 1.0.0`) and are preferred by the policy.
///
/// Links constrained with `self.version` are rewritten to the alias version.
#[derive(Debug, Clone)]
pub struct AliasPackage {
    alias_of: Arc<Package>,
    version: String,
    pretty_version: String,
    stability: Stability,
    is_root_package_alias: bool,
    requires: Vec<Link>,
    dev_requires: Vec<Link>,
    conflicts: Vec<Link>,
    provides: Vec<Link>,
    replaces: Vec<Link>,
}

impl AliasPackage {
    /// Creates a new alias package
    ///
    /// # Arguments
    /// * `alias_of` - The package this is an alias of
    /// * `version` - The normalized alias version
    /// * `pretty_version` - The pretty version for display
    pub fn new(alias_of: Arc<Package>, version: String, pretty_version: String) -> Self {
        let stability = VersionParser::parse_stability(&version);

        let requires = replace_self_version(&alias_of.requires, &version, &pretty_version, false);
        let dev_requires =
            replace_self_version(&alias_of.dev_requires, &version, &pretty_version, false);
        let conflicts = replace_self_version(&alias_of.conflicts, &version, &pretty_version, true);
        let provides = replace_self_version(&alias_of.provides, &version, &pretty_version, true);
        let replaces = replace_self_version(&alias_of.replaces, &version, &pretty_version, true);

        Self {
            alias_of,
            version,
            pretty_version,
            stability,
            is_root_package_alias: false,
            requires,
            dev_requires,
            conflicts,
            provides,
            replaces,
        }
    }

    /// Marks this alias as coming from the root requirements
    pub fn set_root_package_alias(&mut self, value: bool) {
        self.is_root_package_alias = value;
    }

    pub fn is_root_package_alias(&self) -> bool {
        self.is_root_package_alias
    }

    /// Returns the package this is an alias of
    pub fn alias_of(&self) -> &Arc<Package> {
        &self.alias_of
    }

    pub fn name(&self) -> &str {
        &self.alias_of.name
    }

    pub fn pretty_name(&self) -> &str {
        &self.alias_of.pretty_name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn pretty_version(&self) -> &str {
        &self.pretty_version
    }

    pub fn stability(&self) -> Stability {
        self.stability
    }

    pub fn is_dev(&self) -> bool {
        self.stability == Stability::Dev
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

    pub fn unique_name(&self) -> String {
        format!("{}-{}", self.name(), self.version)
    }

    pub fn pretty_string(&self) -> String {
        format!("{} {}", self.pretty_name(), self.pretty_version)
    }
}

/// Requires get the alias version in place of `self.version`. Conflicts,
/// provides and replaces keep the original link and gain one for the alias
/// version, so the alias covers both.
fn replace_self_version(
    links: &[Link],
    version: &str,
    pretty_version: &str,
    keep_original: bool,
) -> Vec<Link> {
    let mut result = Vec::with_capacity(links.len());
    let mut added = Vec::new();

    for link in links {
        if !link.is_self_version() {
            result.push(link.clone());
            continue;
        }

        let mut exact = Constraint::exact(version);
        exact.set_pretty_string(Some(pretty_version.to_string()));
        let rewritten = Link::new(
            link.source.as_str(),
            link.target.as_str(),
            Box::new(exact),
            link.link_type,
        )
        .with_pretty_constraint("self.version");

        if keep_original {
            result.push(link.clone());
            added.push(rewritten);
        } else {
            result.push(rewritten);
        }
    }

    result.extend(added);
    result
}

impl fmt::Display for AliasPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}alias of {})",
            self.pretty_string(),
            if self.is_root_package_alias { "root " } else { "" },
            self.alias_of.pretty_version
        )
    }
}
