use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::time::Instant;

use super::literal::Literal;
use super::policy::Policy;
use super::pool::{PackageId, Pool};
use super::request::{Job, JobCommand};
use super::rule::{Rule, RuleOrigin, RuleReason};
use super::rule_set::{RuleGroup, RuleSet};
use crate::package::Link;

/// Generates SAT rules from a dependency graph.
///
/// This converts the dependency relationships into clauses:
/// - Jobs: at least one candidate must be installed, or none may be
/// - Requires: if A is installed, then B|C|D must be installed
/// - Conflicts and replaces: A and B cannot both be installed
/// - Same-name: only one version of a package can be installed
/// - Aliases: if an alias is installed, its base package must be installed
/// - Updates: weak preference to keep an installed package or move it
///   to one of its update candidates
pub struct RuleSetGenerator<'a> {
    pool: &'a Pool,
    policy: &'a dyn Policy,
    installed: &'a BTreeSet<PackageId>,
    rules: RuleSet,
    /// Packages whose rules have been generated
    added: HashSet<PackageId>,
}

impl<'a> RuleSetGenerator<'a> {
    pub fn new(pool: &'a Pool, policy: &'a dyn Policy, installed: &'a BTreeSet<PackageId>) -> Self {
        Self {
            pool,
            policy,
            installed,
            rules: RuleSet::new(),
            added: HashSet::new(),
        }
    }

    /// Ids reachable from the installed packages, their update candidates
    /// and the candidates of every install job, following requires (every
    /// provider of the target) and alias links.
    ///
    /// Must run against a pool without an active whitelist.
    pub fn compute_whitelist(
        pool: &Pool,
        policy: &dyn Policy,
        installed: &BTreeSet<PackageId>,
        jobs: &[Job],
    ) -> HashSet<PackageId> {
        let mut whitelist = HashSet::new();

        for &id in installed {
            whitelist_from_package(pool, id, &mut whitelist);
            for update in policy.find_update_packages(pool, id) {
                whitelist_from_package(pool, update, &mut whitelist);
            }
        }

        for job in jobs.iter().filter(|job| job.command == JobCommand::Install) {
            for &id in pool.what_provides(&job.package_name, job.constraint()).iter() {
                whitelist_from_package(pool, id, &mut whitelist);
            }
        }

        whitelist
    }

    /// Generate all rules for the given jobs.
    ///
    /// `update_map` maps every installed package that may change to the
    /// index of the job that allowed it.
    pub fn generate(mut self, jobs: &[Job], update_map: &BTreeMap<PackageId, usize>) -> RuleSet {
        let start = Instant::now();

        // Installed packages first, so their rules get the lowest ids
        for &id in self.installed {
            self.add_rules_for_package(id);
        }
        log::debug!("After installed package rules: {} rules", self.rules.len());

        for (&id, &job_index) in update_map {
            self.add_rules_for_update_packages(id, job_index, &jobs[job_index]);
        }
        log::debug!("After update rules: {} rules", self.rules.len());

        self.add_job_rules(jobs);
        log::debug!("After job rules: {} rules", self.rules.len());

        log::info!(
            "Rule generation stats: {} packages processed, {} rules in {:?}",
            self.added.len(),
            self.rules.len(),
            start.elapsed()
        );

        self.rules
    }

    /// Add all rules for a package and everything it pulls in
    fn add_rules_for_package(&mut self, package_id: PackageId) {
        let mut queue = VecDeque::from([package_id]);

        while let Some(id) = queue.pop_front() {
            if !self.added.insert(id) {
                continue;
            }
            let package = self.pool.package(id);

            if let Some(base) = self.pool.alias_of(id) {
                queue.push_back(base);
                self.add_rule(
                    Rule::new(
                        vec![Literal::negative(id), Literal::positive(base)],
                        RuleReason::PackageAlias,
                        RuleOrigin::Package(id),
                    ),
                    RuleGroup::Package,
                );
            }

            for link in package.requires() {
                let providers = self.pool.what_provides(&link.target, Some(&*link.constraint));
                if let Some(rule) = self.create_require_rule(id, &providers, link) {
                    self.add_rule(rule, RuleGroup::Package);
                }
                queue.extend(providers.iter().copied());
            }

            for link in package.conflicts() {
                let conflicting = self.pool.what_provides(&link.target, Some(&*link.constraint));
                for &other in conflicting.iter() {
                    if other == id {
                        continue;
                    }
                    self.add_rule(
                        self.create_pair_rule(id, other, RuleReason::PackageConflict, link),
                        RuleGroup::Package,
                    );
                }
            }

            let is_installed = self.installed.contains(&id);
            for link in package.replaces() {
                let obsoleted = self.pool.what_provides(&link.target, Some(&*link.constraint));
                for &other in obsoleted.iter() {
                    if other == id || self.alias_equivalent(id, other) {
                        continue;
                    }
                    let reason = if is_installed {
                        RuleReason::InstalledPackageObsoletes
                    } else {
                        RuleReason::PackageObsoletes
                    };
                    self.add_rule(self.create_pair_rule(id, other, reason, link), RuleGroup::Package);
                }
            }

            if !is_installed {
                self.add_implicit_rules(id);
            }
        }
    }

    /// Same-name and implicit-obsolete rules against every other package
    /// known under this package's name
    fn add_implicit_rules(&mut self, id: PackageId) {
        let package = self.pool.package(id);

        for &other in self.pool.what_provides(package.name(), None).iter() {
            if other == id {
                continue;
            }

            if self.pool.alias_of(id) == Some(other) {
                self.add_rule(
                    Rule::new(
                        vec![Literal::negative(id), Literal::positive(other)],
                        RuleReason::PackageAlias,
                        RuleOrigin::Package(id),
                    ),
                    RuleGroup::Package,
                );
            } else if !self.alias_equivalent(id, other) {
                let reason = if package.name() == self.pool.package(other).name() {
                    RuleReason::PackageSameName
                } else {
                    RuleReason::PackageImplicitObsoletes
                };
                self.add_rule(
                    Rule::new(
                        vec![Literal::negative(id), Literal::negative(other)],
                        reason,
                        RuleOrigin::Package(id),
                    ),
                    RuleGroup::Package,
                );
            }
        }
    }

    /// Rules for every update candidate plus the weak preference to keep
    /// the installed package or take one of its updates
    fn add_rules_for_update_packages(&mut self, id: PackageId, job_index: usize, job: &Job) {
        let updates = self.policy.find_update_packages(self.pool, id);
        for &update in &updates {
            self.add_rules_for_package(update);
        }

        let mut literals = vec![Literal::positive(id)];
        literals.extend(updates.iter().map(|&update| Literal::positive(update)));
        self.add_rule(
            Rule::new(
                literals,
                RuleReason::InternalAllowUpdate,
                RuleOrigin::Job {
                    index: job_index,
                    job: job.clone(),
                },
            )
            .weak(),
            RuleGroup::Update,
        );
    }

    fn add_job_rules(&mut self, jobs: &[Job]) {
        for (index, job) in jobs.iter().enumerate() {
            let origin = || RuleOrigin::Job {
                index,
                job: job.clone(),
            };

            match job.command {
                JobCommand::Install => {
                    let candidates = self.pool.what_provides(&job.package_name, job.constraint());
                    if candidates.is_empty() {
                        log::warn!("No packages satisfy install request for {}", job.target_string());
                    }

                    for &id in candidates.iter() {
                        if !self.installed.contains(&id) {
                            self.add_rules_for_package(id);
                        }
                    }

                    // An empty rule still goes in so the failure can be explained
                    let literals = candidates.iter().map(|&id| Literal::positive(id)).collect();
                    self.add_rule(Rule::new(literals, RuleReason::JobInstall, origin()), RuleGroup::Job);

                    if job.fixed {
                        let pinned: Vec<Literal> = candidates
                            .iter()
                            .copied()
                            .filter(|id| self.installed.contains(id))
                            .map(Literal::positive)
                            .collect();
                        if !pinned.is_empty() {
                            self.add_rule(Rule::new(pinned, RuleReason::JobInstall, origin()), RuleGroup::Job);
                        }
                    }
                }
                JobCommand::Uninstall => {
                    // every match, installed or not, so none is picked as a replacement
                    let candidates = self.pool.what_provides(&job.package_name, job.constraint());
                    for &id in candidates.iter() {
                        self.add_rule(
                            Rule::new(vec![Literal::negative(id)], RuleReason::JobUninstall, origin()),
                            RuleGroup::Job,
                        );
                    }
                }
                // handled through the update map
                JobCommand::Update | JobCommand::UpdateAll => {}
            }
        }
    }

    /// `[-P, providers...]`, or nothing when P satisfies its own requirement
    fn create_require_rule(&self, id: PackageId, providers: &[PackageId], link: &Link) -> Option<Rule> {
        if providers.contains(&id) {
            return None;
        }

        let mut literals = vec![Literal::negative(id)];
        literals.extend(providers.iter().map(|&provider| Literal::positive(provider)));
        Some(Rule::new(
            literals,
            RuleReason::PackageRequires,
            RuleOrigin::Link {
                source: id,
                link: link.clone(),
            },
        ))
    }

    fn create_pair_rule(&self, id: PackageId, other: PackageId, reason: RuleReason, link: &Link) -> Rule {
        Rule::new(
            vec![Literal::negative(id), Literal::negative(other)],
            reason,
            RuleOrigin::Link {
                source: id,
                link: link.clone(),
            },
        )
    }

    /// An alias and its base (or two aliases of one base) never exclude
    /// each other.
    fn alias_equivalent(&self, a: PackageId, b: PackageId) -> bool {
        let base_a = self.pool.alias_of(a);
        let base_b = self.pool.alias_of(b);
        base_a == Some(b) || base_b == Some(a) || (base_a.is_some() && base_a == base_b)
    }

    fn add_rule(&mut self, rule: Rule, group: RuleGroup) {
        self.rules.add(rule, group);
    }
}

fn whitelist_from_package(pool: &Pool, id: PackageId, whitelist: &mut HashSet<PackageId>) {
    let mut queue = VecDeque::from([id]);

    while let Some(id) = queue.pop_front() {
        if !whitelist.insert(id) {
            continue;
        }

        if let Some(base) = pool.alias_of(id) {
            queue.push_back(base);
            continue;
        }

        for link in pool.package(id).requires() {
            queue.extend(
                pool.what_provides(&link.target, Some(&*link.constraint))
                    .iter()
                    .copied(),
            );
        }
    }
}
