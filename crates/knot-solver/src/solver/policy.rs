use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};

use indexmap::IndexMap;
use knot_semver::{Constraint, Operator};

use super::literal::Literal;
use super::pool::{PackageId, Pool};
use crate::package::PoolPackage;

/// Decides which candidate the solver tries first
pub trait Policy {
    /// `a <op> b`, taking stability preference into account
    fn version_compare(&self, a: &PoolPackage, b: &PoolPackage, operator: Operator) -> bool;

    /// Other packages that could take the place of `id` on update
    fn find_update_packages(&self, pool: &Pool, id: PackageId) -> Vec<PackageId>;

    /// Narrows `literals` to the preferred candidates, best first.
    ///
    /// Packages in `installed` win over every other version of their name.
    fn select_preferred_packages(
        &self,
        pool: &Pool,
        installed: &BTreeSet<PackageId>,
        literals: &[Literal],
        required_package: Option<&str>,
    ) -> Vec<Literal>;
}

/// Composer's default candidate ordering
///
/// Per package name: installed version if allowed, then the best repository,
/// then the best version (highest unless `prefer_lowest`), then aliases over
/// their base package.
#[derive(Debug, Clone, Default)]
pub struct DefaultPolicy {
    /// Prefer stable versions over less stable ones, whatever the version
    pub prefer_stable: bool,
    /// Prefer lowest versions
    pub prefer_lowest: bool,
}

impl DefaultPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set preference for stable versions
    pub fn prefer_stable(mut self, prefer: bool) -> Self {
        self.prefer_stable = prefer;
        self
    }

    /// Set preference for lowest versions
    pub fn prefer_lowest(mut self, prefer: bool) -> Self {
        self.prefer_lowest = prefer;
        self
    }

    /// Candidates grouped by name, installed ones first within a group
    fn group_literals_by_name(
        &self,
        pool: &Pool,
        installed: &BTreeSet<PackageId>,
        literals: &[Literal],
    ) -> IndexMap<String, Vec<Literal>> {
        let mut groups: IndexMap<String, Vec<Literal>> = IndexMap::new();
        for &literal in literals {
            let name = pool.literal_to_package(literal).name().to_string();
            let group = groups.entry(name).or_default();
            if installed.contains(&literal.id()) {
                group.insert(0, literal);
            } else {
                group.push(literal);
            }
        }
        groups
    }

    /// Ordering used to rank candidates; `Less` means `a` is preferred.
    ///
    /// Composed of key comparisons only, so it is a total order.
    #[allow(clippy::too_many_arguments)]
    fn compare_by_priority(
        &self,
        pool: &Pool,
        installed: &BTreeSet<PackageId>,
        replacers: &HashSet<PackageId>,
        a: PackageId,
        b: PackageId,
        required_package: Option<&str>,
        ignore_replace: bool,
    ) -> Ordering {
        let pa = pool.package(a);
        let pb = pool.package(b);

        // installed first, then repository priority (higher wins)
        let installed_rank = |id: PackageId| !installed.contains(&id);
        let ordering = installed_rank(a)
            .cmp(&installed_rank(b))
            .then_with(|| pool.priority_of(b).cmp(&pool.priority_of(a)))
            // prefer root package aliases
            .then_with(|| pb.is_root_package_alias().cmp(&pa.is_root_package_alias()));
        if ordering != Ordering::Equal {
            return ordering;
        }

        if !ignore_replace {
            // originals before packages replacing them
            let ordering = replacers.contains(&a).cmp(&replacers.contains(&b));
            if ordering != Ordering::Equal {
                return ordering;
            }

            if let Some(vendor) = required_package.and_then(|name| name.split_once('/')).map(|(v, _)| v) {
                let prefix = format!("{}/", vendor);
                let other_vendor = |p: &PoolPackage| !p.name().starts_with(&prefix);
                let ordering = other_vendor(pa).cmp(&other_vendor(pb));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }

        // an alias directly before its base package, otherwise insertion order
        let base_id = |id: PackageId| pool.alias_of(id).unwrap_or(id);
        base_id(a)
            .cmp(&base_id(b))
            .then_with(|| pb.is_alias().cmp(&pa.is_alias()))
            .then_with(|| a.cmp(&b))
    }

    /// Candidates that replace another candidate's name
    fn find_replacers(&self, pool: &Pool, literals: &[Literal]) -> HashSet<PackageId> {
        let names: HashSet<&str> = literals
            .iter()
            .map(|lit| pool.literal_to_package(*lit).name())
            .collect();

        literals
            .iter()
            .map(|lit| lit.id())
            .filter(|&id| {
                let package = pool.package(id);
                package
                    .replaces()
                    .iter()
                    .any(|link| link.target != package.name() && names.contains(link.target.as_str()))
            })
            .collect()
    }

    /// Preferred installed candidates, if any. Otherwise packages from the
    /// installed repository plus every candidate of the best other repository.
    fn prune_to_highest_priority_or_installed(
        &self,
        pool: &Pool,
        installed: &BTreeSet<PackageId>,
        literals: Vec<Literal>,
    ) -> Vec<Literal> {
        let kept: Vec<Literal> = literals
            .iter()
            .copied()
            .filter(|lit| installed.contains(&lit.id()))
            .collect();
        if !kept.is_empty() {
            return kept;
        }

        let top_priority = literals
            .iter()
            .find(|lit| !pool.is_installed_package(lit.id()))
            .map(|lit| pool.priority_of(lit.id()));
        literals
            .into_iter()
            .filter(|lit| {
                pool.is_installed_package(lit.id()) || Some(pool.priority_of(lit.id())) == top_priority
            })
            .collect()
    }

    /// Keeps only the best version (and anything equal to it)
    fn prune_to_best_version(&self, pool: &Pool, literals: Vec<Literal>) -> Vec<Literal> {
        let operator = if self.prefer_lowest {
            Operator::LessThan
        } else {
            Operator::GreaterThan
        };

        let mut best: Vec<Literal> = Vec::new();
        for literal in literals {
            let Some(&current) = best.first() else {
                best.push(literal);
                continue;
            };

            let package = pool.literal_to_package(literal);
            let best_package = pool.literal_to_package(current);
            if self.version_compare(package, best_package, operator) {
                best = vec![literal];
            } else if self.version_compare(package, best_package, Operator::Equal) {
                best.push(literal);
            }
        }
        best
    }

    /// Drops aliases that are not root aliases when a root alias exists
    fn prune_remote_aliases(&self, pool: &Pool, literals: Vec<Literal>) -> Vec<Literal> {
        let has_root_alias = literals
            .iter()
            .any(|lit| pool.literal_to_package(*lit).is_root_package_alias());
        if !has_root_alias {
            return literals;
        }

        literals
            .into_iter()
            .filter(|lit| {
                let package = pool.literal_to_package(*lit);
                !package.is_alias() || package.is_root_package_alias()
            })
            .collect()
    }
}

impl Policy for DefaultPolicy {
    fn version_compare(&self, a: &PoolPackage, b: &PoolPackage, operator: Operator) -> bool {
        if self.prefer_stable {
            let stability_a = a.stability().priority();
            let stability_b = b.stability().priority();
            if stability_a != stability_b {
                // the more stable package wins whatever the operator
                return stability_a < stability_b;
            }
        }

        let constraint = Constraint::new(operator, b.version());
        constraint.match_specific(&Constraint::exact(a.version()), true)
    }

    fn find_update_packages(&self, pool: &Pool, id: PackageId) -> Vec<PackageId> {
        let package = pool.package(id);
        pool.what_provides(package.name(), None)
            .iter()
            .copied()
            .filter(|&candidate| candidate != id)
            .collect()
    }

    fn select_preferred_packages(
        &self,
        pool: &Pool,
        installed: &BTreeSet<PackageId>,
        literals: &[Literal],
        required_package: Option<&str>,
    ) -> Vec<Literal> {
        let replacers = self.find_replacers(pool, literals);
        let groups = self.group_literals_by_name(pool, installed, literals);

        let mut selected = Vec::with_capacity(literals.len());
        for (_, mut group) in groups {
            group.sort_by(|a, b| {
                self.compare_by_priority(pool, installed, &replacers, a.id(), b.id(), required_package, true)
            });

            let group = self.prune_to_highest_priority_or_installed(pool, installed, group);
            let group = self.prune_to_best_version(pool, group);
            let group = self.prune_remote_aliases(pool, group);
            selected.extend(group);
        }

        selected.sort_by(|a, b| {
            self.compare_by_priority(pool, installed, &replacers, a.id(), b.id(), required_package, false)
        });
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::Package;
    use crate::repository::{ArrayRepository, Repository};
    use crate::solver::pool::{PoolConfig, RootAlias};
    use knot_semver::Stability;
    use std::sync::Arc;

    fn pool_with(repos: Vec<Vec<Package>>) -> Pool {
        let mut pool = Pool::new(PoolConfig::default().with_minimum_stability(Stability::Dev));
        for (i, packages) in repos.into_iter().enumerate() {
            let repo: Arc<dyn Repository> =
                Arc::new(ArrayRepository::new(format!("repo{}", i)).with_packages(packages));
            pool.add_repository(repo);
        }
        pool
    }

    fn pkg(name: &str, version: &str) -> Package {
        Package::new(name, version).unwrap()
    }

    fn positives(ids: &[PackageId]) -> Vec<Literal> {
        ids.iter().map(|id| Literal::positive(*id)).collect()
    }

    fn select(policy: &DefaultPolicy, pool: &Pool, ids: &[PackageId]) -> Vec<PackageId> {
        policy
            .select_preferred_packages(pool, &BTreeSet::new(), &positives(ids), None)
            .into_iter()
            .map(|lit| lit.id())
            .collect()
    }

    #[test]
    fn test_select_single() {
        let pool = pool_with(vec![vec![pkg("a", "1.0")]]);
        assert_eq!(select(&DefaultPolicy::new(), &pool, &[1]), vec![1]);
    }

    #[test]
    fn test_select_newest() {
        let pool = pool_with(vec![vec![pkg("a", "1.0"), pkg("a", "2.0"), pkg("a", "1.5")]]);
        assert_eq!(select(&DefaultPolicy::new(), &pool, &[1, 2, 3]), vec![2]);
    }

    #[test]
    fn test_select_lowest() {
        let pool = pool_with(vec![vec![pkg("a", "1.0"), pkg("a", "2.0")]]);
        let policy = DefaultPolicy::new().prefer_lowest(true);
        assert_eq!(select(&policy, &pool, &[1, 2]), vec![1]);
    }

    #[test]
    fn test_select_newest_with_dev() {
        let pool = pool_with(vec![vec![pkg("a", "2.0-dev"), pkg("a", "1.0")]]);
        assert_eq!(select(&DefaultPolicy::new(), &pool, &[1, 2]), vec![1]);

        let stable = DefaultPolicy::new().prefer_stable(true);
        assert_eq!(select(&stable, &pool, &[1, 2]), vec![2]);
    }

    #[test]
    fn test_select_lowest_with_prefer_stable() {
        let pool = pool_with(vec![vec![pkg("a", "1.0-beta1"), pkg("a", "1.1"), pkg("a", "1.2")]]);
        let policy = DefaultPolicy::new().prefer_stable(true).prefer_lowest(true);
        assert_eq!(select(&policy, &pool, &[1, 2, 3]), vec![2]);
    }

    #[test]
    fn test_select_installed_over_newer() {
        let pool = pool_with(vec![vec![pkg("a", "1.0")], vec![pkg("a", "2.0")]]);
        let installed: BTreeSet<PackageId> = [1].into_iter().collect();
        let selected = DefaultPolicy::new().select_preferred_packages(
            &pool,
            &installed,
            &positives(&[1, 2]),
            None,
        );
        assert_eq!(selected, positives(&[1]));
    }

    #[test]
    fn test_updatable_installed_competes_on_version() {
        use crate::repository::InstalledRepository;

        let mut pool = Pool::default();
        let installed: Arc<dyn Repository> =
            Arc::new(InstalledRepository::new().with_packages(vec![pkg("a", "1.0")]));
        pool.add_repository(installed);
        pool.add_repository(Arc::new(ArrayRepository::new("remote").with_packages(vec![pkg("a", "2.0")])));

        assert_eq!(select(&DefaultPolicy::new(), &pool, &[1, 2]), vec![2]);
    }

    #[test]
    fn test_repository_priority_beats_version() {
        let pool = pool_with(vec![vec![pkg("a", "1.0")], vec![pkg("a", "2.0")]]);
        assert_eq!(select(&DefaultPolicy::new(), &pool, &[1, 2]), vec![1]);
    }

    #[test]
    fn test_select_all_providers() {
        let pool = pool_with(vec![vec![
            pkg("a", "1.0").with_provide("x", "1.0").unwrap(),
            pkg("b", "2.0").with_provide("x", "1.0").unwrap(),
        ]]);
        assert_eq!(select(&DefaultPolicy::new(), &pool, &[1, 2]), vec![1, 2]);
    }

    #[test]
    fn test_prefer_original_over_replacer() {
        let pool = pool_with(vec![vec![
            pkg("vendor/replacer", "1.0").with_replace("vendor/original", "*").unwrap(),
            pkg("vendor/original", "1.0"),
        ]]);
        let selected: Vec<PackageId> = DefaultPolicy::new()
            .select_preferred_packages(&pool, &BTreeSet::new(), &positives(&[1, 2]), Some("vendor/original"))
            .into_iter()
            .map(|lit| lit.id())
            .collect();
        assert_eq!(selected, vec![2, 1]);
    }

    #[test]
    fn test_prefer_same_vendor() {
        let pool = pool_with(vec![vec![
            pkg("other/impl", "1.0").with_provide("vendor/api", "1.0").unwrap(),
            pkg("vendor/impl", "1.0").with_provide("vendor/api", "1.0").unwrap(),
        ]]);
        let selected: Vec<PackageId> = DefaultPolicy::new()
            .select_preferred_packages(&pool, &BTreeSet::new(), &positives(&[1, 2]), Some("vendor/api"))
            .into_iter()
            .map(|lit| lit.id())
            .collect();
        assert_eq!(selected, vec![2, 1]);
    }

    #[test]
    fn test_root_alias_preferred_over_remote_alias() {
        let mut pool = Pool::new(PoolConfig::default().with_minimum_stability(Stability::Dev));
        let mut repo = ArrayRepository::new("vcs");
        let base = repo.add_package(pkg("a", "dev-main"));
        repo.add_alias(crate::package::AliasPackage::new(
            base,
            "1.0.9999999.9999999-dev".into(),
            "1.0.x-dev".into(),
        ));
        let aliases = vec![RootAlias {
            package: "a".into(),
            version: "dev-main".into(),
            alias: "1.0.x-dev".into(),
            alias_normalized: "1.0.9999999.9999999-dev".into(),
        }];
        pool.add_repository_with_aliases(Arc::new(repo), &aliases);

        // 1 = dev-main, 2 = root alias, 3 = branch alias
        assert!(pool.package(2).is_root_package_alias());
        assert_eq!(select(&DefaultPolicy::new(), &pool, &[1, 2, 3]), vec![2]);
    }

    #[test]
    fn test_find_update_packages() {
        let pool = pool_with(vec![vec![pkg("a", "1.0"), pkg("a", "2.0"), pkg("b", "1.0")]]);
        assert_eq!(DefaultPolicy::new().find_update_packages(&pool, 1), vec![2]);
    }

    #[test]
    fn test_version_compare() {
        let pool = pool_with(vec![vec![pkg("a", "1.0"), pkg("a", "2.0-beta1")]]);
        let policy = DefaultPolicy::new();
        assert!(policy.version_compare(pool.package(2), pool.package(1), Operator::GreaterThan));

        let stable = DefaultPolicy::new().prefer_stable(true);
        assert!(stable.version_compare(pool.package(1), pool.package(2), Operator::GreaterThan));
        assert!(!stable.version_compare(pool.package(2), pool.package(1), Operator::GreaterThan));
    }
}
