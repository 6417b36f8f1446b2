use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;

use knot_semver::{Constraint, Stability, VersionConstraint};

use super::literal::Literal;
use crate::error::{Result, SolverError};
use crate::package::{AliasPackage, PoolPackage};
use crate::repository::Repository;

/// Package identifier, assigned sequentially by the pool starting at 1
pub type PackageId = u32;

/// Filters applied to every pool query
#[derive(Debug, Clone, Default)]
pub struct PoolConfig {
    /// Least stable version accepted for packages without a flag
    pub minimum_stability: Stability,
    /// Per-name overrides of `minimum_stability`
    pub stability_flags: HashMap<String, Stability>,
    /// Extra constraint every package of a given name has to satisfy
    pub filter_requires: HashMap<String, Arc<dyn VersionConstraint>>,
}

impl PoolConfig {
    pub fn with_minimum_stability(mut self, stability: Stability) -> Self {
        self.minimum_stability = stability;
        self
    }

    pub fn with_stability_flag(mut self, name: &str, stability: Stability) -> Self {
        self.stability_flags.insert(name.to_lowercase(), stability);
        self
    }

    pub fn with_filter_require(mut self, name: &str, constraint: Box<dyn VersionConstraint>) -> Self {
        self.filter_requires
            .insert(name.to_lowercase(), Arc::from(constraint));
        self
    }

    /// Global stability check with per-name exceptions; any of the package's
    /// names may grant acceptance.
    pub fn is_package_acceptable(&self, names: &[&str], stability: Stability) -> bool {
        names.iter().any(|name| match self.stability_flags.get(*name) {
            Some(flag) => stability.priority() <= flag.priority(),
            None => stability.priority() <= self.minimum_stability.priority(),
        })
    }
}

/// A root-level alias such as `dev-main as 1.0.0`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootAlias {
    pub package: String,
    /// Normalized version being aliased
    pub version: String,
    /// Alias as written
    pub alias: String,
    pub alias_normalized: String,
}

/// Options for [`Pool::what_provides_with`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ProvideQuery {
    /// Only packages whose own name is the queried name
    pub must_match_name: bool,
    /// Ignore filterRequires, stability rules and the whitelist
    pub bypass_filters: bool,
}

impl ProvideQuery {
    pub fn must_match_name() -> Self {
        Self {
            must_match_name: true,
            bypass_filters: false,
        }
    }

    pub fn unfiltered() -> Self {
        Self {
            must_match_name: true,
            bypass_filters: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Match {
    None,
    /// Own name matches, version does not
    Name,
    Exact,
    Provide,
    Replace,
    Filtered,
}

/// Central registry of every package the solver may consider
///
/// Ids are handed out in repository-add order and never reused. Queries for a
/// name go through the provide index, which knows every name a package
/// answers to (own name, provides, replaces).
#[derive(Debug)]
pub struct Pool {
    config: PoolConfig,
    repositories: Vec<Arc<dyn Repository>>,
    packages: Vec<PoolPackage>,
    package_repos: Vec<usize>,
    alias_targets: Vec<Option<PackageId>>,
    concrete_ids: HashMap<usize, PackageId>,
    provide_index: HashMap<String, Vec<PackageId>>,
    whitelist: Option<HashSet<PackageId>>,
    provider_cache: RefCell<HashMap<(String, ProvideQuery), Rc<[PackageId]>>>,
}

impl Default for Pool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

impl Pool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            repositories: Vec::new(),
            packages: Vec::new(),
            package_repos: Vec::new(),
            alias_targets: Vec::new(),
            concrete_ids: HashMap::new(),
            provide_index: HashMap::new(),
            whitelist: None,
            provider_cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Registers every package of `repo`, in enumeration order.
    pub fn add_repository(&mut self, repo: Arc<dyn Repository>) {
        self.add_repository_with_aliases(repo, &[]);
    }

    /// Like [`Pool::add_repository`], also registering a root alias right
    /// after each package it applies to.
    pub fn add_repository_with_aliases(&mut self, repo: Arc<dyn Repository>, aliases: &[RootAlias]) {
        let repo_index = self.repositories.len();
        let first_id = self.next_id();

        for package in repo.packages() {
            self.register(package.clone(), repo_index);

            let PoolPackage::Concrete(concrete) = package else {
                continue;
            };
            for root_alias in aliases {
                if root_alias.package == concrete.name && root_alias.version == concrete.version {
                    let mut alias = AliasPackage::new(
                        concrete.clone(),
                        root_alias.alias_normalized.clone(),
                        root_alias.alias.clone(),
                    );
                    alias.set_root_package_alias(true);
                    self.register(PoolPackage::Alias(Arc::new(alias)), repo_index);
                }
            }
        }

        // aliases may be listed before their base package
        for id in first_id..self.next_id() {
            let index = (id - 1) as usize;
            if let PoolPackage::Alias(alias) = &self.packages[index] {
                let key = Arc::as_ptr(alias.alias_of()) as usize;
                self.alias_targets[index] = self.concrete_ids.get(&key).copied();
            }
        }

        log::debug!(
            "Added repository {} with {} packages",
            repo.name(),
            self.next_id() - first_id
        );
        self.repositories.push(repo);
        self.provider_cache.borrow_mut().clear();
    }

    fn next_id(&self) -> PackageId {
        self.packages.len() as PackageId + 1
    }

    fn register(&mut self, package: PoolPackage, repo_index: usize) -> PackageId {
        let id = self.next_id();
        for name in package.names() {
            self.provide_index
                .entry(name.to_string())
                .or_default()
                .push(id);
        }
        if let PoolPackage::Concrete(concrete) = &package {
            self.concrete_ids
                .insert(Arc::as_ptr(concrete) as usize, id);
        }
        self.packages.push(package);
        self.package_repos.push(repo_index);
        self.alias_targets.push(None);
        id
    }

    /// Priority of a registered repository: 0 for the first, then -1, -2, ...
    pub fn priority(&self, repo: &Arc<dyn Repository>) -> Result<i32> {
        self.repository_index(repo)
            .map(|index| -(index as i32))
            .ok_or_else(|| SolverError::RepositoryNotFound {
                name: repo.name().to_string(),
            })
    }

    fn repository_index(&self, repo: &Arc<dyn Repository>) -> Option<usize> {
        let wanted = Arc::as_ptr(repo) as *const ();
        self.repositories
            .iter()
            .position(|r| Arc::as_ptr(r) as *const () == wanted)
    }

    /// Ids of every package registered from `repo`, in id order
    pub fn repository_package_ids(&self, repo: &Arc<dyn Repository>) -> Result<BTreeSet<PackageId>> {
        let index = self
            .repository_index(repo)
            .ok_or_else(|| SolverError::RepositoryNotFound {
                name: repo.name().to_string(),
            })?;
        Ok(self
            .package_repos
            .iter()
            .enumerate()
            .filter(|(_, r)| **r == index)
            .map(|(i, _)| i as PackageId + 1)
            .collect())
    }

    /// Priority of the repository a package came from
    pub fn priority_of(&self, id: PackageId) -> i32 {
        -(self.package_repository(id) as i32)
    }

    /// Index (add order) of the repository a package came from
    pub fn package_repository(&self, id: PackageId) -> usize {
        self.package_repos[(id - 1) as usize]
    }

    pub fn repositories(&self) -> &[Arc<dyn Repository>] {
        &self.repositories
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Every registered id, ascending
    pub fn ids(&self) -> impl Iterator<Item = PackageId> {
        1..=self.packages.len() as PackageId
    }

    pub fn get(&self, id: PackageId) -> Option<&PoolPackage> {
        id.checked_sub(1)
            .and_then(|index| self.packages.get(index as usize))
    }

    pub fn try_package(&self, id: PackageId) -> Result<&PoolPackage> {
        self.get(id).ok_or(SolverError::UnknownPackage(id))
    }

    /// Package for an id handed out by this pool.
    ///
    /// # Panics
    /// Panics if the id was not assigned by this pool.
    pub fn package(&self, id: PackageId) -> &PoolPackage {
        &self.packages[(id - 1) as usize]
    }

    pub fn literal_to_package(&self, literal: Literal) -> &PoolPackage {
        self.package(literal.id())
    }

    /// Id of the concrete package an alias points at
    pub fn alias_of(&self, id: PackageId) -> Option<PackageId> {
        self.alias_targets[(id - 1) as usize]
    }

    pub fn is_installed_package(&self, id: PackageId) -> bool {
        self.repositories
            .get(self.package_repository(id))
            .is_some_and(|repo| repo.is_installed())
    }

    /// Restricts every later filtered query to `ids` (aliases are visible
    /// when their base is); `None` lifts the restriction.
    pub fn set_whitelist(&mut self, ids: Option<HashSet<PackageId>>) {
        self.whitelist = ids;
        self.provider_cache.borrow_mut().clear();
    }

    pub fn is_whitelisted(&self, id: PackageId) -> bool {
        let Some(whitelist) = &self.whitelist else {
            return true;
        };
        let id = self.alias_of(id).unwrap_or(id);
        whitelist.contains(&id)
    }

    /// Packages answering to `name` that satisfy `constraint`
    ///
    /// Unconstrained results are cached; repeated calls return the same
    /// shared slice.
    pub fn what_provides(
        &self,
        name: &str,
        constraint: Option<&dyn VersionConstraint>,
    ) -> Rc<[PackageId]> {
        self.what_provides_with(name, constraint, ProvideQuery::default())
    }

    pub fn what_provides_with(
        &self,
        name: &str,
        constraint: Option<&dyn VersionConstraint>,
        query: ProvideQuery,
    ) -> Rc<[PackageId]> {
        let name = name.to_lowercase();

        if constraint.is_none() {
            if let Some(cached) = self.provider_cache.borrow().get(&(name.clone(), query)) {
                return cached.clone();
            }
        }

        let result: Rc<[PackageId]> = self.compute_what_provides(&name, constraint, query).into();

        if constraint.is_none() {
            self.provider_cache
                .borrow_mut()
                .insert((name, query), result.clone());
        }
        result
    }

    fn compute_what_provides(
        &self,
        name: &str,
        constraint: Option<&dyn VersionConstraint>,
        query: ProvideQuery,
    ) -> Vec<PackageId> {
        let Some(candidates) = self.provide_index.get(name) else {
            return Vec::new();
        };

        let mut matches = Vec::new();
        let mut provide_matches = Vec::new();
        let mut name_match = false;

        for &id in candidates {
            let candidate = self.package(id);
            if query.must_match_name && candidate.name() != name {
                continue;
            }

            if !query.bypass_filters && (!self.is_whitelisted(id) || !self.is_acceptable(id)) {
                continue;
            }

            match self.match_candidate(candidate, name, constraint, query.bypass_filters) {
                Match::None | Match::Filtered => {}
                Match::Name => name_match = true,
                Match::Exact => {
                    name_match = true;
                    matches.push(id);
                }
                Match::Provide => provide_matches.push(id),
                Match::Replace => matches.push(id),
            }
        }

        // a real package of that name hides mere providers
        if !name_match {
            matches.extend(provide_matches);
            matches.sort_unstable();
        }
        matches
    }

    fn is_acceptable(&self, id: PackageId) -> bool {
        if self.is_installed_package(id) {
            return true;
        }
        let package = self.package(id);
        self.config
            .is_package_acceptable(&package.names(), package.stability())
    }

    fn match_candidate(
        &self,
        candidate: &PoolPackage,
        name: &str,
        constraint: Option<&dyn VersionConstraint>,
        bypass_filters: bool,
    ) -> Match {
        if candidate.name() == name {
            let version = Constraint::exact(candidate.version());

            if !bypass_filters && !candidate.is_alias() && candidate.stability() != Stability::Dev {
                if let Some(filter) = self.config.filter_requires.get(name) {
                    if !filter.matches(&version) {
                        return Match::Filtered;
                    }
                }
            }

            return match constraint {
                None => Match::Exact,
                Some(constraint) if constraint.matches(&version) => Match::Exact,
                Some(_) => Match::Name,
            };
        }

        let satisfied = |links: &[crate::package::Link]| {
            links.iter().any(|link| {
                link.target == name
                    && constraint.map_or(true, |c| c.matches(&*link.constraint))
            })
        };

        if satisfied(candidate.provides()) {
            return Match::Provide;
        }
        if satisfied(candidate.replaces()) {
            return Match::Replace;
        }

        Match::None
    }

    /// `install foo 1.0`, `don't install foo 1.0`, `keep foo 1.0` or
    /// `remove foo 1.0`, depending on polarity and installed state
    pub fn literal_to_pretty_string(&self, literal: Literal, installed: &BTreeSet<PackageId>) -> String {
        let package = self.literal_to_package(literal);
        let is_installed = installed.contains(&literal.id());
        let verb = match (literal.is_positive(), is_installed) {
            (true, true) => "keep",
            (true, false) => "install",
            (false, true) => "remove",
            (false, false) => "don't install",
        };
        format!("{} {}", verb, package.pretty_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::Package;
    use crate::repository::{ArrayRepository, InstalledRepository};
    use knot_semver::VersionParser;

    fn pkg(name: &str, version: &str) -> Package {
        Package::new(name, version).unwrap()
    }

    fn constraint(c: &str) -> Box<dyn VersionConstraint> {
        VersionParser::new().parse_constraints(c).unwrap()
    }

    fn repo(name: &str, packages: Vec<Package>) -> Arc<dyn Repository> {
        Arc::new(ArrayRepository::new(name).with_packages(packages))
    }

    #[test]
    fn test_ids_follow_add_order() {
        let mut pool = Pool::default();
        pool.add_repository(repo("first", vec![pkg("foo", "1.0")]));
        pool.add_repository(repo("second", vec![pkg("foo", "1.0"), pkg("foo", "2.0")]));

        assert_eq!(&*pool.what_provides("foo", None), &[1, 2, 3]);
        assert_eq!(pool.package(3).version(), "2.0.0.0");
        assert_eq!(pool.len(), 3);
        assert!(pool.get(0).is_none());
        assert!(pool.get(4).is_none());
        assert!(matches!(pool.try_package(9), Err(SolverError::UnknownPackage(9))));
    }

    #[test]
    fn test_unconstrained_results_are_shared() {
        let mut pool = Pool::default();
        pool.add_repository(repo("remote", vec![pkg("foo", "1.0")]));

        let first = pool.what_provides("foo", None);
        let second = pool.what_provides("foo", None);
        assert!(Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_constraint_filters_versions() {
        let mut pool = Pool::default();
        pool.add_repository(repo("remote", vec![pkg("foo", "1.0"), pkg("foo", "2.0")]));

        let c = constraint(">=1.5");
        assert_eq!(&*pool.what_provides("foo", Some(c.as_ref())), &[2]);
        assert!(pool.what_provides("bar", None).is_empty());
    }

    #[test]
    fn test_priority() {
        let first = repo("first", vec![]);
        let second = repo("second", vec![]);
        let stranger = repo("stranger", vec![]);

        let mut pool = Pool::default();
        pool.add_repository(first.clone());
        pool.add_repository(second.clone());

        assert_eq!(pool.priority(&first).unwrap(), 0);
        assert_eq!(pool.priority(&second).unwrap(), -1);
        assert!(matches!(
            pool.priority(&stranger),
            Err(SolverError::RepositoryNotFound { .. })
        ));
    }

    #[test]
    fn test_provides_hidden_by_real_package() {
        let provider = pkg("impl", "1.0").with_provide("virtual", "1.0").unwrap();
        let mut pool = Pool::default();
        pool.add_repository(repo("remote", vec![provider]));
        assert_eq!(&*pool.what_provides("virtual", None), &[1]);

        let mut pool = Pool::default();
        let provider = pkg("impl", "1.0").with_provide("virtual", "1.0").unwrap();
        pool.add_repository(repo("remote", vec![provider, pkg("virtual", "3.0")]));
        let c = constraint("^1.0");
        // the real `virtual` does not match but still hides the provider
        assert!(pool.what_provides("virtual", Some(c.as_ref())).is_empty());
    }

    #[test]
    fn test_replace_always_counts() {
        let replacer = pkg("fork", "1.0").with_replace("orig", "1.0").unwrap();
        let mut pool = Pool::default();
        pool.add_repository(repo("remote", vec![pkg("orig", "1.0"), replacer]));

        assert_eq!(&*pool.what_provides("orig", None), &[1, 2]);
        let only_named = pool.what_provides_with("orig", None, ProvideQuery::must_match_name());
        assert_eq!(&*only_named, &[1]);
    }

    #[test]
    fn test_minimum_stability() {
        let config = PoolConfig::default().with_stability_flag("bar", Stability::Dev);
        let mut pool = Pool::new(config);
        pool.add_repository(repo(
            "remote",
            vec![pkg("foo", "1.0"), pkg("foo", "2.0-beta1"), pkg("bar", "dev-main")],
        ));

        assert_eq!(&*pool.what_provides("foo", None), &[1]);
        assert_eq!(&*pool.what_provides("bar", None), &[3]);
        let all = pool.what_provides_with("foo", None, ProvideQuery::unfiltered());
        assert_eq!(&*all, &[1, 2]);
    }

    #[test]
    fn test_installed_packages_skip_stability() {
        let installed: Arc<dyn Repository> =
            Arc::new(InstalledRepository::new().with_packages(vec![pkg("foo", "dev-main")]));
        let mut pool = Pool::default();
        pool.add_repository(installed.clone());
        assert_eq!(&*pool.what_provides("foo", None), &[1]);
        assert_eq!(pool.repository_package_ids(&installed).unwrap().len(), 1);
        assert!(pool.is_installed_package(1));
    }

    #[test]
    fn test_filter_requires() {
        let config = PoolConfig::default().with_filter_require("foo", constraint("<2.0"));
        let mut pool = Pool::new(config);
        pool.add_repository(repo("remote", vec![pkg("foo", "1.0"), pkg("foo", "2.0")]));
        assert_eq!(&*pool.what_provides("foo", None), &[1]);
    }

    #[test]
    fn test_whitelist() {
        let mut pool = Pool::default();
        pool.add_repository(repo("remote", vec![pkg("foo", "1.0"), pkg("foo", "2.0")]));
        let before = pool.what_provides("foo", None);

        pool.set_whitelist(Some([2].into_iter().collect()));
        let after = pool.what_provides("foo", None);
        assert_eq!(&*after, &[2]);
        assert!(!Rc::ptr_eq(&before, &after));

        let bypass = pool.what_provides_with("foo", None, ProvideQuery::unfiltered());
        assert_eq!(&*bypass, &[1, 2]);
    }

    #[test]
    fn test_root_alias() {
        let mut pool = Pool::default();
        let aliases = vec![RootAlias {
            package: "foo".into(),
            version: "dev-main".into(),
            alias: "1.0.0".into(),
            alias_normalized: "1.0.0.0".into(),
        }];
        pool.add_repository_with_aliases(repo("remote", vec![pkg("foo", "dev-main")]), &aliases);

        assert_eq!(pool.len(), 2);
        assert!(pool.package(2).is_root_package_alias());
        assert_eq!(pool.alias_of(2), Some(1));
        assert_eq!(pool.alias_of(1), None);
    }

    #[test]
    fn test_literal_to_pretty_string() {
        let mut pool = Pool::default();
        pool.add_repository(repo("remote", vec![pkg("foo", "1.0"), pkg("bar", "2.0")]));
        let installed: BTreeSet<PackageId> = [1].into_iter().collect();

        assert_eq!(pool.literal_to_pretty_string(Literal::positive(1), &installed), "keep foo 1.0");
        assert_eq!(pool.literal_to_pretty_string(Literal::negative(1), &installed), "remove foo 1.0");
        assert_eq!(pool.literal_to_pretty_string(Literal::positive(2), &installed), "install bar 2.0");
        assert_eq!(
            pool.literal_to_pretty_string(Literal::negative(2), &installed),
            "don't install bar 2.0"
        );
    }
}
