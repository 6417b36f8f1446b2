use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use indexmap::IndexMap;

use super::literal::Literal;
use super::pool::{PackageId, Pool};
use super::request::Job;
use crate::package::Link;

/// Index of a rule inside its [`RuleSet`](super::rule_set::RuleSet)
pub type RuleId = usize;

/// Why a rule exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleReason {
    /// One of the job's candidates must be installed
    JobInstall,
    /// None of the job's candidates may be installed
    JobUninstall,
    /// Weak preference: keep or update an installed package
    InternalAllowUpdate,
    /// If A is installed, one of its requirement's providers must be
    PackageRequires,
    /// A and B cannot both be installed
    PackageConflict,
    /// A replaces B, so not both
    PackageObsoletes,
    /// An installed package replaces B
    InstalledPackageObsoletes,
    /// A is known under B's name through provide/replace
    PackageImplicitObsoletes,
    /// Two versions of one package
    PackageSameName,
    /// Alias requires its base package
    PackageAlias,
    /// Derived during conflict analysis
    Learned,
    Undefined,
}

impl RuleReason {
    pub fn is_job(&self) -> bool {
        matches!(self, RuleReason::JobInstall | RuleReason::JobUninstall)
    }
}

/// Where a rule came from
#[derive(Debug, Clone)]
pub enum RuleOrigin {
    None,
    /// Job at `index` in the request
    Job { index: usize, job: Job },
    /// Link declared by package `source`
    Link { source: PackageId, link: Link },
    /// Alias package
    Package(PackageId),
    /// Index into the solver's learned-rule derivations
    Learned(usize),
}

/// A clause: at least one literal has to hold
///
/// # Examples
///
/// - `[A]` - A must be installed (assertion)
/// - `[-A]` - A must not be installed
/// - `[-A, B, C]` - if A is installed, B or C must be
/// - `[-A, -B]` - A and B cannot both be installed
#[derive(Debug, Clone)]
pub struct Rule {
    literals: Vec<Literal>,
    reason: RuleReason,
    origin: RuleOrigin,
    enabled: bool,
    weak: bool,
}

impl Rule {
    /// Generated rule; literals are sorted by signed value and deduplicated.
    pub fn new(mut literals: Vec<Literal>, reason: RuleReason, origin: RuleOrigin) -> Self {
        literals.sort();
        literals.dedup();
        Self {
            literals,
            reason,
            origin,
            enabled: true,
            weak: false,
        }
    }

    /// Learned rule; the asserting literal stays first.
    pub fn learned(literals: Vec<Literal>, why: usize) -> Self {
        Self {
            literals,
            reason: RuleReason::Learned,
            origin: RuleOrigin::Learned(why),
            enabled: true,
            weak: false,
        }
    }

    pub fn weak(mut self) -> Self {
        self.weak = true;
        self
    }

    pub fn literals(&self) -> &[Literal] {
        &self.literals
    }

    pub fn reason(&self) -> RuleReason {
        self.reason
    }

    pub fn origin(&self) -> &RuleOrigin {
        &self.origin
    }

    pub fn job(&self) -> Option<&Job> {
        match &self.origin {
            RuleOrigin::Job { job, .. } => Some(job),
            _ => None,
        }
    }

    pub fn job_index(&self) -> Option<usize> {
        match &self.origin {
            RuleOrigin::Job { index, .. } => Some(*index),
            _ => None,
        }
    }

    pub fn link(&self) -> Option<&Link> {
        match &self.origin {
            RuleOrigin::Link { link, .. } => Some(link),
            _ => None,
        }
    }

    /// Name this rule asks for: the job target or the required link target
    pub fn required_package(&self) -> Option<&str> {
        match &self.origin {
            RuleOrigin::Job { job, .. } => Some(job.package_name.as_str()),
            RuleOrigin::Link { link, .. } if self.reason == RuleReason::PackageRequires => {
                Some(link.target.as_str())
            }
            _ => None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_disabled(&self) -> bool {
        !self.enabled
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn is_weak(&self) -> bool {
        self.weak
    }

    /// Single-literal rule
    pub fn is_assertion(&self) -> bool {
        self.literals.len() == 1
    }

    pub fn is_empty(&self) -> bool {
        self.literals.is_empty()
    }

    /// Same literals, in any order
    pub fn equals_literals(&self, other: &Rule) -> bool {
        self.sorted_literals() == other.sorted_literals()
    }

    fn sorted_literals(&self) -> Vec<Literal> {
        let mut sorted = self.literals.clone();
        sorted.sort();
        sorted
    }

    /// Order-independent hash of the literal set
    pub fn literal_hash(&self) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.sorted_literals().hash(&mut hasher);
        hasher.finish()
    }

    /// Human readable explanation of a non-job rule
    pub fn pretty_string(&self, pool: &Pool, installed: &BTreeSet<PackageId>) -> String {
        let literal_text = || {
            self.literals
                .iter()
                .map(|lit| pool.literal_to_pretty_string(*lit, installed))
                .collect::<Vec<_>>()
                .join(" | ")
        };

        match self.reason {
            RuleReason::JobInstall => format!("Install command rule ({})", literal_text()),
            RuleReason::JobUninstall => format!("Remove command rule ({})", literal_text()),
            RuleReason::PackageConflict => {
                let (Some(first), Some(second)) = (self.literals.first(), self.literals.get(1))
                else {
                    return literal_text();
                };
                format!(
                    "{} conflicts with {}.",
                    pool.literal_to_package(*first).pretty_string(),
                    format_packages_unique(pool, &[second.id()])
                )
            }
            RuleReason::PackageRequires => {
                let RuleOrigin::Link { source, link } = &self.origin else {
                    return literal_text();
                };
                let source_package = pool.package(*source);
                let text = link.pretty_string(
                    source_package.pretty_name(),
                    source_package.pretty_version(),
                );

                let candidates: Vec<PackageId> = self
                    .literals
                    .iter()
                    .filter(|lit| lit.is_positive())
                    .map(|lit| lit.id())
                    .collect();
                if candidates.is_empty() {
                    format!("{} -> no matching package found.", text)
                } else {
                    format!(
                        "{} -> satisfiable by {}.",
                        text,
                        format_packages_unique(pool, &candidates)
                    )
                }
            }
            RuleReason::PackageSameName => {
                let mut ids: Vec<PackageId> = self.literals.iter().map(|lit| lit.id()).collect();
                ids.sort_unstable();
                format!("Can only install one of: {}.", format_packages_unique(pool, &ids))
            }
            RuleReason::Learned => format!("Conclusion: {}", literal_text()),
            RuleReason::Undefined => format!("({})", literal_text()),
            RuleReason::InternalAllowUpdate
            | RuleReason::PackageObsoletes
            | RuleReason::InstalledPackageObsoletes
            | RuleReason::PackageImplicitObsoletes
            | RuleReason::PackageAlias => literal_text(),
        }
    }
}

/// `foo[1.0, 2.0], bar[1.1]`: packages grouped by name, versions deduplicated
pub fn format_packages_unique(pool: &Pool, ids: &[PackageId]) -> String {
    let mut grouped: IndexMap<&str, Vec<&str>> = IndexMap::new();
    for &id in ids {
        let package = pool.package(id);
        let versions = grouped.entry(package.pretty_name()).or_default();
        if !versions.contains(&package.pretty_version()) {
            versions.push(package.pretty_version());
        }
    }

    grouped
        .iter()
        .map(|(name, versions)| format!("{}[{}]", name, versions.join(", ")))
        .collect::<Vec<_>>()
        .join(", ")
}

impl PartialEq for Rule {
    fn eq(&self, other: &Self) -> bool {
        self.equals_literals(other)
    }
}

impl Eq for Rule {}

impl Hash for Rule {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.sorted_literals().hash(state);
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_disabled() {
            f.write_str("disabled(")?;
        }
        f.write_str("(")?;
        for (i, literal) in self.literals.iter().enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            write!(f, "{}", literal)?;
        }
        f.write_str(")")?;
        if self.is_disabled() {
            f.write_str(")")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::Package;
    use crate::repository::ArrayRepository;
    use std::sync::Arc;

    fn lits(values: &[i64]) -> Vec<Literal> {
        values.iter().map(|v| Literal::from_signed(*v).unwrap()).collect()
    }

    fn pool() -> Pool {
        let repo = ArrayRepository::new("remote").with_packages(vec![
            Package::new("foo", "1.0").unwrap(),
            Package::new("foo", "2.0").unwrap(),
            Package::new("bar", "1.0").unwrap(),
        ]);
        let mut pool = Pool::default();
        pool.add_repository(Arc::new(repo));
        pool
    }

    #[test]
    fn test_literals_sorted_and_deduplicated() {
        let rule = Rule::new(lits(&[2, -1, 2, -3]), RuleReason::PackageRequires, RuleOrigin::None);
        assert_eq!(rule.literals(), lits(&[-3, -1, 2]).as_slice());
        assert_eq!(rule.to_string(), "(-3|-1|2)");
    }

    #[test]
    fn test_learned_keeps_order() {
        let rule = Rule::learned(lits(&[3, -1]), 0);
        assert_eq!(rule.literals(), lits(&[3, -1]).as_slice());
        assert_eq!(rule.reason(), RuleReason::Learned);
    }

    #[test]
    fn test_equality_ignores_order() {
        let a = Rule::learned(lits(&[1, -2]), 0);
        let b = Rule::new(lits(&[-2, 1]), RuleReason::PackageRequires, RuleOrigin::None);
        assert_eq!(a, b);
        assert_eq!(a.literal_hash(), b.literal_hash());
    }

    #[test]
    fn test_enable_disable() {
        let mut rule = Rule::new(lits(&[1]), RuleReason::JobInstall, RuleOrigin::None);
        assert!(rule.is_assertion());
        rule.disable();
        assert!(rule.is_disabled());
        assert_eq!(rule.to_string(), "disabled((1))");
        rule.enable();
        assert!(rule.is_enabled());
    }

    #[test]
    fn test_pretty_same_name() {
        let pool = pool();
        let rule = Rule::new(lits(&[-1, -2]), RuleReason::PackageSameName, RuleOrigin::None);
        assert_eq!(
            rule.pretty_string(&pool, &BTreeSet::new()),
            "Can only install one of: foo[1.0, 2.0]."
        );
    }

    #[test]
    fn test_pretty_conflict() {
        let pool = pool();
        let rule = Rule::new(lits(&[-1, -3]), RuleReason::PackageConflict, RuleOrigin::None);
        assert_eq!(
            rule.pretty_string(&pool, &BTreeSet::new()),
            "bar 1.0 conflicts with foo[1.0]."
        );
    }

    #[test]
    fn test_pretty_learned() {
        let pool = pool();
        let installed: BTreeSet<PackageId> = [1].into_iter().collect();
        let rule = Rule::learned(lits(&[-1, 3]), 0);
        assert_eq!(
            rule.pretty_string(&pool, &installed),
            "Conclusion: remove foo 1.0 | install bar 1.0"
        );
    }

    #[test]
    fn test_format_packages_unique() {
        let pool = pool();
        assert_eq!(format_packages_unique(&pool, &[1, 3, 2, 1]), "foo[1.0, 2.0], bar[1.0]");
    }
}
