use std::collections::{BTreeSet, HashSet};
use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;

use super::pool::{PackageId, Pool, ProvideQuery};
use super::request::{Job, JobCommand};
use super::rule::{format_packages_unique, Rule, RuleId, RuleReason};

lazy_static! {
    static ref VALID_NAME: Regex = Regex::new(r"^[A-Za-z0-9_./-]+$").unwrap();
    static ref NAME_CHARS: Regex = Regex::new(r"[A-Za-z0-9_./-]+").unwrap();
}

/// The chain of rules that made one job unsatisfiable
///
/// Rules are collected in sections: conflict analysis starts a new section
/// every time it reaches a rule the user can act on.
#[derive(Debug, Clone, Default)]
pub struct Problem {
    sections: Vec<Vec<(RuleId, Rule)>>,
    current: Vec<(RuleId, Rule)>,
    seen: HashSet<RuleId>,
}

impl Problem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a rule to the current section; a rule is recorded once.
    pub fn add_rule(&mut self, id: RuleId, rule: &Rule) {
        if self.seen.insert(id) {
            self.current.push((id, rule.clone()));
        }
    }

    pub fn next_section(&mut self) {
        if !self.current.is_empty() {
            self.sections.push(std::mem::take(&mut self.current));
        }
    }

    /// Closed sections, most recently closed first, followed by the rules
    /// of the open section in insertion order
    pub fn reasons(&self) -> Vec<&Rule> {
        self.sections
            .iter()
            .rev()
            .flatten()
            .chain(self.current.iter())
            .map(|(_, rule)| rule)
            .collect()
    }

    /// Ids of every recorded rule, in [`Problem::reasons`] order
    pub fn rule_ids(&self) -> Vec<RuleId> {
        self.sections
            .iter()
            .rev()
            .flatten()
            .chain(self.current.iter())
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Human readable explanation, one `\n    - ` line per reason
    pub fn pretty_string(&self, pool: &Pool, installed: &BTreeSet<PackageId>) -> String {
        let reasons = self.reasons();

        if let [rule] = reasons.as_slice() {
            if let Some(job) = rule.job() {
                if job.command == JobCommand::Install && rule.is_empty() {
                    return format!("\n    - {}", missing_package_text(pool, job));
                }
            }
        }

        let messages: Vec<String> = reasons
            .iter()
            .map(|rule| match rule.job() {
                Some(job) if rule.reason().is_job() || rule.reason() == RuleReason::InternalAllowUpdate => {
                    job_text(pool, job, rule)
                }
                _ => rule.pretty_string(pool, installed),
            })
            .collect();

        format!("\n    - {}", messages.join("\n    - "))
    }
}

fn constraint_text(job: &Job) -> String {
    job.constraint()
        .map(|c| format!(" {}", c.pretty_string()))
        .unwrap_or_default()
}

fn job_text(pool: &Pool, job: &Job, rule: &Rule) -> String {
    match job.command {
        JobCommand::Install => {
            let candidates: Vec<PackageId> = rule.literals().iter().map(|lit| lit.id()).collect();
            if candidates.is_empty() {
                format!(
                    "No package found to satisfy install request for {}{}",
                    job.package_name,
                    constraint_text(job)
                )
            } else {
                format!(
                    "Installation request for {}{} -> satisfiable by {}.",
                    job.package_name,
                    constraint_text(job),
                    format_packages_unique(pool, &candidates)
                )
            }
        }
        JobCommand::Uninstall => format!("Removal request for {}{}", job.package_name, constraint_text(job)),
        JobCommand::Update | JobCommand::UpdateAll => {
            format!("Update request for {}{}.", job.package_name, constraint_text(job))
        }
    }
}

/// Explains an install job that matched nothing, looking past the
/// whitelist and stability filters for versions that do exist.
fn missing_package_text(pool: &Pool, job: &Job) -> String {
    let name = job.package_name.as_str();

    if !VALID_NAME.is_match(name) {
        let illegal = NAME_CHARS.replace_all(name, "");
        return format!(
            "The requested package {} could not be found, it looks like its name is invalid, \"{}\" is not allowed in package names.",
            name, illegal
        );
    }

    let filtered = pool.what_provides_with(name, job.constraint(), ProvideQuery::unfiltered());
    if !filtered.is_empty() {
        return format!(
            "The requested package {}{} is satisfiable by {} but these conflict with your requirements or minimum-stability.",
            name,
            constraint_text(job),
            format_packages_unique(pool, &filtered)
        );
    }

    let any_version = pool.what_provides_with(name, None, ProvideQuery::unfiltered());
    if !any_version.is_empty() {
        return format!(
            "The requested package {}{} exists as {} but these are rejected by your constraint.",
            name,
            constraint_text(job),
            format_packages_unique(pool, &any_version)
        );
    }

    format!(
        "The requested package {} could not be found in any version, there may be a typo in the package name.",
        name
    )
}

/// Every problem of a failed solve, rendered while the pool was at hand
#[derive(Debug, Clone, Default)]
pub struct SolverProblems {
    problems: Vec<Problem>,
    messages: Vec<String>,
}

impl SolverProblems {
    pub fn new(problems: Vec<Problem>, pool: &Pool, installed: &BTreeSet<PackageId>) -> Self {
        let messages = problems
            .iter()
            .map(|problem| problem.pretty_string(pool, installed))
            .collect();
        Self { problems, messages }
    }

    pub fn problems(&self) -> &[Problem] {
        &self.problems
    }

    /// Rendered text of each problem, in order
    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }
}

impl fmt::Display for SolverProblems {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        for (i, message) in self.messages.iter().enumerate() {
            writeln!(f, "  Problem {}{}", i + 1, message)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::Package;
    use crate::repository::ArrayRepository;
    use crate::solver::literal::Literal;
    use crate::solver::pool::PoolConfig;
    use crate::solver::rule::RuleOrigin;
    use knot_semver::Stability;
    use std::sync::Arc;

    fn job_rule(job: Job, literals: Vec<Literal>) -> Rule {
        Rule::new(literals, RuleReason::JobInstall, RuleOrigin::Job { index: 0, job })
    }

    fn install(name: &str, constraint: Option<&str>) -> Job {
        Job::parse(JobCommand::Install, name, constraint).unwrap()
    }

    fn rule(values: &[i64], reason: RuleReason) -> Rule {
        let literals = values.iter().map(|v| Literal::from_signed(*v).unwrap()).collect();
        Rule::new(literals, reason, RuleOrigin::None)
    }

    #[test]
    fn test_rules_added_once() {
        let mut problem = Problem::new();
        let r = rule(&[-1, -2], RuleReason::PackageConflict);
        problem.add_rule(3, &r);
        problem.next_section();
        problem.add_rule(3, &r);
        assert_eq!(problem.rule_ids(), vec![3]);
    }

    #[test]
    fn test_reasons_order() {
        let mut problem = Problem::new();
        let r = rule(&[1], RuleReason::Undefined);
        problem.add_rule(0, &r);
        problem.add_rule(1, &r);
        problem.next_section();
        problem.add_rule(2, &r);
        problem.next_section();
        problem.add_rule(3, &r);
        problem.add_rule(4, &r);

        assert_eq!(problem.rule_ids(), vec![2, 0, 1, 3, 4]);
        assert_eq!(problem.reasons().len(), 5);
    }

    #[test]
    fn test_package_not_found() {
        let pool = Pool::default();
        let mut problem = Problem::new();
        problem.add_rule(0, &job_rule(install("acme/ghost", None), vec![]));
        assert_eq!(
            problem.pretty_string(&pool, &BTreeSet::new()),
            "\n    - The requested package acme/ghost could not be found in any version, there may be a typo in the package name."
        );
    }

    #[test]
    fn test_invalid_package_name() {
        let pool = Pool::default();
        let mut problem = Problem::new();
        problem.add_rule(0, &job_rule(install("acme/gh ost!", None), vec![]));
        assert_eq!(
            problem.pretty_string(&pool, &BTreeSet::new()),
            "\n    - The requested package acme/gh ost! could not be found, it looks like its name is invalid, \" !\" is not allowed in package names."
        );
    }

    #[test]
    fn test_rejected_by_constraint() {
        let mut pool = Pool::default();
        pool.add_repository(Arc::new(
            ArrayRepository::new("remote").with_packages(vec![Package::new("foo", "1.0").unwrap()]),
        ));
        let mut problem = Problem::new();
        problem.add_rule(0, &job_rule(install("foo", Some("^2.0")), vec![]));
        assert_eq!(
            problem.pretty_string(&pool, &BTreeSet::new()),
            "\n    - The requested package foo ^2.0 exists as foo[1.0] but these are rejected by your constraint."
        );
    }

    #[test]
    fn test_filtered_by_stability() {
        let mut pool = Pool::new(PoolConfig::default().with_minimum_stability(Stability::Stable));
        pool.add_repository(Arc::new(
            ArrayRepository::new("remote").with_packages(vec![Package::new("foo", "1.0-beta1").unwrap()]),
        ));
        let mut problem = Problem::new();
        problem.add_rule(0, &job_rule(install("foo", None), vec![]));
        assert_eq!(
            problem.pretty_string(&pool, &BTreeSet::new()),
            "\n    - The requested package foo is satisfiable by foo[1.0-beta1] but these conflict with your requirements or minimum-stability."
        );
    }

    #[test]
    fn test_job_and_conflict_text() {
        let mut pool = Pool::default();
        pool.add_repository(Arc::new(ArrayRepository::new("remote").with_packages(vec![
            Package::new("foo", "1.0").unwrap(),
            Package::new("bar", "1.0").unwrap(),
        ])));

        let mut problem = Problem::new();
        problem.add_rule(0, &rule(&[-2, -1], RuleReason::PackageConflict));
        problem.add_rule(1, &job_rule(install("foo", None), vec![Literal::positive(1)]));

        assert_eq!(
            problem.pretty_string(&pool, &BTreeSet::new()),
            "\n    - bar 1.0 conflicts with foo[1.0].\n    - Installation request for foo -> satisfiable by foo[1.0]."
        );
    }

    #[test]
    fn test_solver_problems_display() {
        let pool = Pool::default();
        let mut problem = Problem::new();
        problem.add_rule(0, &job_rule(install("ghost", None), vec![]));
        let problems = SolverProblems::new(vec![problem], &pool, &BTreeSet::new());

        assert_eq!(problems.len(), 1);
        assert_eq!(
            problems.to_string(),
            "\n  Problem 1\n    - The requested package ghost could not be found in any version, there may be a typo in the package name.\n"
        );
    }
}
