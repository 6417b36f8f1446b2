use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use super::decisions::Decisions;
use super::literal::Literal;
use super::policy::Policy;
use super::pool::{PackageId, Pool};
use super::problem::{Problem, SolverProblems};
use super::request::{Job, JobCommand, Request};
use super::rule::{Rule, RuleId, RuleReason};
use super::rule_generator::RuleSetGenerator;
use super::rule_set::{RuleGroup, RuleSet};
use super::transaction::Transaction;
use super::watch_graph::WatchGraph;
use crate::error::{Result, SolverError};
use crate::repository::Repository;

/// Level of assertions and everything they imply
const ROOT_LEVEL: u32 = 0;

/// Upper bound on main-loop rounds before the solver gives up
const MAX_ITERATIONS: usize = 1_000_000;

/// The main SAT solver for dependency resolution.
///
/// Implements a CDCL (Conflict-Driven Clause Learning) algorithm adapted
/// for package dependency resolution. A solver is single-use per request;
/// all search state lives for one [`Solver::solve`] call.
pub struct Solver<'a> {
    /// Package pool
    pool: &'a mut Pool,
    /// Selection policy
    policy: &'a dyn Policy,
    /// Repository holding the currently installed packages
    installed: Arc<dyn Repository>,
    learned_positive_literal: bool,
}

impl<'a> Solver<'a> {
    /// Create a new solver
    ///
    /// `installed` must already be registered in `pool`.
    pub fn new(pool: &'a mut Pool, policy: &'a dyn Policy, installed: Arc<dyn Repository>) -> Self {
        Self {
            pool,
            policy,
            installed,
            learned_positive_literal: false,
        }
    }

    /// Whether conflict analysis ever learned a rule asserting that a
    /// package must be installed
    pub fn learned_positive_literal(&self) -> bool {
        self.learned_positive_literal
    }

    /// Solve the dependency resolution problem.
    ///
    /// Returns the operations leading from the installed state to a
    /// solution, or [`SolverError::Unsolvable`] with one problem per
    /// failing job. The pool's whitelist is cleared again afterwards.
    pub fn solve(&mut self, request: &Request) -> Result<Transaction> {
        let result = self.run_solve(request);
        self.pool.set_whitelist(None);
        result
    }

    fn run_solve(&mut self, request: &Request) -> Result<Transaction> {
        let start = Instant::now();
        let jobs = request.jobs();

        self.pool.set_whitelist(None);
        let installed = self.pool.repository_package_ids(&self.installed)?;
        let update_map = build_update_map(self.pool, &installed, jobs);

        let whitelist = RuleSetGenerator::compute_whitelist(self.pool, self.policy, &installed, jobs);
        log::debug!(
            "Whitelisted {} of {} packages",
            whitelist.len(),
            self.pool.len()
        );
        self.pool.set_whitelist(Some(whitelist));

        let pool: &Pool = &*self.pool;
        let rules = RuleSetGenerator::new(pool, self.policy, &installed).generate(jobs, &update_map);

        let mut state = SolverState::new(pool, self.policy, rules, installed, update_map);
        let outcome = state.run();
        self.learned_positive_literal = state.learned_positive_literal;
        outcome?;

        log::info!(
            "Solved {} jobs in {:?}: {} decisions, {} rules ({} learned)",
            jobs.len(),
            start.elapsed(),
            state.decisions.len(),
            state.rules.len(),
            state.rules.group(RuleGroup::Learned).len()
        );

        if !state.problems.is_empty() {
            log::info!("Found {} problems", state.problems.len());
            return Err(SolverError::Unsolvable(SolverProblems::new(
                state.problems,
                pool,
                &state.installed,
            )));
        }

        Ok(Transaction::from_decisions(
            pool,
            self.policy,
            &state.installed,
            &state.decisions,
        ))
    }
}

/// Installed packages a job allows to change, mapped to that job's index
fn build_update_map(
    pool: &Pool,
    installed: &BTreeSet<PackageId>,
    jobs: &[Job],
) -> BTreeMap<PackageId, usize> {
    let mut update_map = BTreeMap::new();

    for (index, job) in jobs.iter().enumerate() {
        match job.command {
            JobCommand::Update => {
                for &id in pool.what_provides(&job.package_name, job.constraint()).iter() {
                    if installed.contains(&id) {
                        update_map.entry(id).or_insert(index);
                    }
                }
            }
            JobCommand::UpdateAll => {
                for &id in installed {
                    update_map.entry(id).or_insert(index);
                }
            }
            JobCommand::Install | JobCommand::Uninstall => {}
        }
    }

    update_map
}

/// Untried alternatives of a policy choice made at `level`
#[derive(Debug)]
struct Branch {
    literals: Vec<Literal>,
    level: u32,
}

struct SolverState<'p> {
    pool: &'p Pool,
    policy: &'p dyn Policy,
    rules: RuleSet,
    watch_graph: WatchGraph,
    decisions: Decisions,
    installed: BTreeSet<PackageId>,
    update_map: BTreeMap<PackageId, usize>,
    /// Installed packages no job allows to change; the policy keeps them
    locked: BTreeSet<PackageId>,
    propagate_index: usize,
    branches: Vec<Branch>,
    problems: Vec<Problem>,
    /// Rules each learned rule was derived from
    learned_pool: Vec<Vec<RuleId>>,
    learned_why: HashMap<RuleId, usize>,
    learned_positive_literal: bool,
}

impl<'p> SolverState<'p> {
    fn new(
        pool: &'p Pool,
        policy: &'p dyn Policy,
        rules: RuleSet,
        installed: BTreeSet<PackageId>,
        update_map: BTreeMap<PackageId, usize>,
    ) -> Self {
        let locked = installed
            .iter()
            .copied()
            .filter(|id| !update_map.contains_key(id))
            .collect();

        Self {
            pool,
            policy,
            rules,
            watch_graph: WatchGraph::new(),
            decisions: Decisions::new(pool.len()),
            installed,
            update_map,
            locked,
            propagate_index: 0,
            branches: Vec::new(),
            problems: Vec::new(),
            learned_pool: Vec::new(),
            learned_why: HashMap::new(),
            learned_positive_literal: false,
        }
    }

    fn run(&mut self) -> Result<()> {
        self.check_for_missing_packages();

        self.watch_graph = WatchGraph::from_rules(&self.rules);
        log::debug!("Watching {} of {} rules", self.watch_graph.len(), self.rules.len());

        self.make_assertion_rule_decisions()?;
        self.run_sat()?;

        // Installed packages nothing asked for are removed
        let undecided: Vec<PackageId> = self
            .installed
            .iter()
            .copied()
            .filter(|&id| self.decisions.undecided(id))
            .collect();
        for id in undecided {
            self.decisions.decide(Literal::negative(id), ROOT_LEVEL, None)?;
        }

        log::trace!("Final decisions: {}", self.decisions);
        Ok(())
    }

    /// Install jobs without a single candidate become problems right away
    fn check_for_missing_packages(&mut self) {
        for id in self.rules.group(RuleGroup::Job).to_vec() {
            let rule = self.rules.get(id);
            if rule.is_disabled() || !rule.is_empty() || rule.reason() != RuleReason::JobInstall {
                continue;
            }

            let mut problem = Problem::new();
            problem.add_rule(id, rule);
            self.problems.push(problem);
            self.rules.get_mut(id).disable();
        }
    }

    /// Decides every single-literal rule at the root level, turning clashes
    /// between them into problems.
    fn make_assertion_rule_decisions(&mut self) -> Result<()> {
        let decision_start = self.decisions.len();
        let mut rule_index = 0;

        while rule_index < self.rules.len() {
            let id = rule_index;
            rule_index += 1;

            let rule = self.rules.get(id);
            if !rule.is_assertion() || rule.is_disabled() || rule.is_weak() {
                continue;
            }

            let literal = rule.literals()[0];
            if !self.decisions.decided(literal.id()) {
                self.decisions.decide(literal, ROOT_LEVEL, Some(id))?;
                continue;
            }
            if self.decisions.satisfy(literal) {
                continue;
            }

            // found a conflict
            if self.rules.group_of(id) == RuleGroup::Learned {
                self.rules.get_mut(id).disable();
                continue;
            }

            let conflict = self.decisions.decision_reason(literal.id());
            let mut problem = Problem::new();
            problem.add_rule(id, rule);
            if let Some(conflict) = conflict {
                problem.add_rule(conflict, self.rules.get(conflict));
            }

            if conflict.is_some_and(|c| self.rules.group_of(c) == RuleGroup::Package) {
                self.disable_problem(id);
                self.problems.push(problem);
                continue;
            }

            // conflict with another job: every job assertion on this package
            // goes into the problem
            for assert_id in self.rules.group(RuleGroup::Job).to_vec() {
                let assert_rule = self.rules.get(assert_id);
                if assert_rule.is_disabled() || !assert_rule.is_assertion() {
                    continue;
                }
                if assert_rule.literals()[0].id() != literal.id() {
                    continue;
                }
                problem.add_rule(assert_id, assert_rule);
                self.disable_problem(assert_id);
            }
            self.problems.push(problem);

            if decision_start == 0 {
                self.decisions.revert_all();
            } else {
                self.decisions.revert_to_position(decision_start - 1);
            }
            self.propagate_index = self.propagate_index.min(self.decisions.len());
            rule_index = 0;
        }

        Ok(())
    }

    /// Runs unit propagation from the first unpropagated decision.
    ///
    /// Returns the conflicting rule, if any.
    fn propagate(&mut self, level: u32) -> Result<Option<RuleId>> {
        while let Some(decision) = self.decisions.at(self.propagate_index).copied() {
            let conflict = self.watch_graph.propagate_literal(
                decision.literal,
                level,
                &mut self.decisions,
                &self.rules,
            )?;
            self.propagate_index += 1;

            if conflict.is_some() {
                return Ok(conflict);
            }
        }
        Ok(None)
    }

    /// Undoes every decision above `level`
    fn revert(&mut self, level: u32) {
        while let Some(literal) = self.decisions.last_literal() {
            match self.decisions.decision_level(literal.id()) {
                Some(decided_at) if decided_at > level => {}
                _ => break,
            }
            self.decisions.revert_last();
            self.propagate_index = self.decisions.len();
        }

        while self.branches.last().is_some_and(|branch| branch.level >= level) {
            self.branches.pop();
        }
    }

    /// Decides `literal` one level deeper and propagates, learning from and
    /// backjumping over every conflict. Returns the resulting level.
    fn set_propagate_learn(&mut self, level: u32, literal: Literal, reason: Option<RuleId>) -> Result<u32> {
        let mut level = level + 1;
        self.decisions.decide(literal, level, reason)?;

        while let Some(conflict) = self.propagate(level)? {
            if level == ROOT_LEVEL {
                return self.analyze_unsolvable(conflict);
            }

            let (learn_literal, new_level, rule, why) = self.analyze(level, conflict)?;
            if new_level >= level {
                return Err(SolverError::Bug(format!(
                    "Trying to revert to invalid level {} from level {}",
                    new_level, level
                )));
            }

            level = new_level;
            self.revert(level);

            let rule_count = self.rules.len();
            let rule_id = self.rules.add(rule, RuleGroup::Learned);
            if self.rules.len() > rule_count {
                self.learned_why.insert(rule_id, why);
                self.watch_graph.insert_learned(&self.rules, rule_id, &self.decisions);
            }
            log::debug!("Learned {} at level {}", self.rules.get(rule_id), level);

            if learn_literal.is_positive() {
                self.learned_positive_literal = true;
            }
            self.decisions.decide(learn_literal, level, Some(rule_id))?;
        }

        Ok(level)
    }

    /// Picks the policy's favourite from `queue` and installs it, keeping
    /// the remaining candidates as a branch.
    fn select_and_install(&mut self, level: u32, queue: Vec<Literal>, rule_id: RuleId) -> Result<u32> {
        let required = self.rules.get(rule_id).required_package();
        let mut literals =
            self.policy
                .select_preferred_packages(self.pool, &self.locked, &queue, required);

        if literals.is_empty() {
            return Err(SolverError::Bug(format!(
                "Policy selected nothing from {:?} for {}",
                queue,
                self.rules.get(rule_id)
            )));
        }

        let selected = literals.remove(0);
        if !literals.is_empty() {
            self.branches.push(Branch { literals, level });
        }

        self.set_propagate_learn(level, selected, Some(rule_id))
    }

    /// First-UIP conflict analysis
    ///
    /// Returns the asserting literal, the level to jump back to, the learned
    /// rule and the index of its derivation in `learned_pool`.
    fn analyze(&mut self, level: u32, conflict: RuleId) -> Result<(Literal, u32, Rule, usize)> {
        let mut rule_id = conflict;
        let mut rule_level = ROOT_LEVEL;
        let mut num = 0usize;
        let mut root_num = 0i64;
        let mut seen: HashSet<PackageId> = HashSet::new();
        let mut asserting: Option<Literal> = None;
        let mut other_literals: Vec<Literal> = Vec::new();
        let mut decision_id = self.decisions.len();

        self.learned_pool.push(Vec::new());
        let why = self.learned_pool.len() - 1;

        'analyze: loop {
            self.learned_pool[why].push(rule_id);

            for &literal in self.rules.get(rule_id).literals() {
                // skip the one true literal
                if self.decisions.satisfy(literal) {
                    continue;
                }
                if !seen.insert(literal.id()) {
                    continue;
                }

                let decided_at = self.decisions.decision_level(literal.id()).ok_or_else(|| {
                    SolverError::Bug(format!(
                        "Undecided literal {} in conflict rule {}",
                        literal,
                        self.rules.get(rule_id)
                    ))
                })?;

                if decided_at == ROOT_LEVEL {
                    root_num += 1;
                } else if decided_at == level {
                    num += 1;
                } else {
                    // neither root nor conflict level: part of the new rule
                    other_literals.push(literal);
                    rule_level = rule_level.max(decided_at);
                }
            }

            let mut root_retry = true;
            while root_retry {
                root_retry = false;

                if num == 0 {
                    root_num -= 1;
                    if root_num == 0 {
                        // all root literals done
                        break 'analyze;
                    }
                }

                let literal = loop {
                    if decision_id == 0 {
                        return Err(SolverError::Bug(format!(
                            "Reached invalid decision id while looking through {} for a literal present in the analyzed rule {}",
                            self.rules.get(rule_id),
                            self.rules.get(conflict)
                        )));
                    }
                    decision_id -= 1;
                    let literal = self.decisions.at(decision_id).map(|d| d.literal);
                    if let Some(literal) = literal.filter(|l| seen.contains(&l.id())) {
                        break literal;
                    }
                };
                seen.remove(&literal.id());

                if num != 0 {
                    num -= 1;
                    if num == 0 {
                        asserting = Some(-literal);
                        if root_num == 0 {
                            break 'analyze;
                        }

                        for other in &other_literals {
                            seen.remove(&other.id());
                        }
                        // only root marks left
                        root_num += 1;
                        root_retry = true;
                    }
                }
            }

            rule_id = self
                .decisions
                .at(decision_id)
                .and_then(|decision| decision.reason)
                .ok_or_else(|| {
                    SolverError::Bug(format!(
                        "Decision without reason reached while analyzing {}",
                        self.rules.get(conflict)
                    ))
                })?;
        }

        let asserting = asserting.ok_or_else(|| {
            SolverError::Bug(format!(
                "Did not find a learnable literal in analyzed rule {}",
                self.rules.get(conflict)
            ))
        })?;

        let mut literals = Vec::with_capacity(other_literals.len() + 1);
        literals.push(asserting);
        literals.extend(other_literals);

        Ok((asserting, rule_level, Rule::learned(literals, why), why))
    }

    /// Records the user-facing rules behind `rule_id`, expanding learned
    /// rules into their derivation. Package rules are left out.
    fn analyze_unsolvable_rule(&self, problem: &mut Problem, rule_id: RuleId) {
        let mut stack = vec![rule_id];

        while let Some(id) = stack.pop() {
            if let Some(&why) = self.learned_why.get(&id) {
                stack.extend(self.learned_pool[why].iter().rev().copied());
                continue;
            }

            if self.rules.group_of(id) == RuleGroup::Package {
                continue;
            }

            problem.next_section();
            problem.add_rule(id, self.rules.get(id));
        }
    }

    /// Turns a root-level conflict into a problem, disables the rules
    /// involved and restarts the search.
    fn analyze_unsolvable(&mut self, conflict: RuleId) -> Result<u32> {
        let mut problem = Problem::new();
        problem.add_rule(conflict, self.rules.get(conflict));
        self.analyze_unsolvable_rule(&mut problem, conflict);

        let mut seen: HashSet<PackageId> = HashSet::new();
        self.mark_unsatisfied(conflict, &mut seen);

        let trail: Vec<_> = self.decisions.iter().copied().collect();
        for decision in trail {
            // skip literals that are not in this rule
            if !seen.contains(&decision.literal.id()) {
                continue;
            }
            let Some(why) = decision.reason else {
                continue;
            };

            problem.add_rule(why, self.rules.get(why));
            self.analyze_unsolvable_rule(&mut problem, why);
            self.mark_unsatisfied(why, &mut seen);
        }

        let involved = problem.rule_ids();
        log::debug!("Unsolvable: {} rules involved", involved.len());
        self.problems.push(problem);

        for id in involved {
            self.disable_problem(id);
        }
        self.reset_solver()?;

        Ok(ROOT_LEVEL)
    }

    fn mark_unsatisfied(&self, rule_id: RuleId, seen: &mut HashSet<PackageId>) {
        for &literal in self.rules.get(rule_id).literals() {
            // skip the one true literal
            if !self.decisions.satisfy(literal) {
                seen.insert(literal.id());
            }
        }
    }

    /// Disables a rule; a job rule takes every rule of its job with it.
    fn disable_problem(&mut self, rule_id: RuleId) {
        let Some(job_index) = self.rules.get(rule_id).job_index() else {
            self.rules.get_mut(rule_id).disable();
            return;
        };

        for id in 0..self.rules.len() {
            if self.rules.get(id).job_index() == Some(job_index) {
                self.rules.get_mut(id).disable();
            }
        }
    }

    fn reset_solver(&mut self) -> Result<()> {
        self.decisions.revert_all();
        self.propagate_index = 0;
        self.branches.clear();

        self.enable_disable_learned_rules();
        self.make_assertion_rule_decisions()
    }

    /// Learned rules follow the state of the rules they were derived from
    fn enable_disable_learned_rules(&mut self) {
        for id in self.rules.group(RuleGroup::Learned).to_vec() {
            let Some(&why) = self.learned_why.get(&id) else {
                continue;
            };

            let found_disabled = self.learned_pool[why]
                .iter()
                .any(|&source| self.rules.get(source).is_disabled());

            let rule = self.rules.get_mut(id);
            if found_disabled && rule.is_enabled() {
                rule.disable();
            } else if !found_disabled && rule.is_disabled() {
                rule.enable();
            }
        }
    }

    /// Keeps only installed candidates unless one of them may be updated
    fn prune_to_installed(&self, queue: Vec<Literal>) -> Vec<Literal> {
        let mut pruned = Vec::new();
        for &literal in &queue {
            if self.installed.contains(&literal.id()) {
                pruned.push(literal);
                if self.update_map.contains_key(&literal.id()) {
                    return queue;
                }
            }
        }
        pruned
    }

    /// First enabled, unsatisfied weak update rule with undecided candidates
    fn next_update_preference(&self) -> Option<(RuleId, Vec<Literal>)> {
        for &id in self.rules.group(RuleGroup::Update) {
            let rule = self.rules.get(id);
            if rule.is_disabled() {
                continue;
            }
            if rule.literals().iter().any(|&lit| self.decisions.satisfy(lit)) {
                continue;
            }

            let queue: Vec<Literal> = rule
                .literals()
                .iter()
                .copied()
                .filter(|lit| lit.is_positive() && self.decisions.undecided(lit.id()))
                .collect();
            if !queue.is_empty() {
                return Some((id, queue));
            }
        }
        None
    }

    /// Latest-found branch alternative that ended up decided deeper than
    /// the branch itself: `(branch index, offset, literal, branch level)`
    fn find_minimization_candidate(&self) -> Option<(usize, usize, Literal, u32)> {
        let mut found = None;
        for (index, branch) in self.branches.iter().enumerate().rev() {
            for (offset, &literal) in branch.literals.iter().enumerate() {
                let deeper = self
                    .decisions
                    .decision_level(literal.id())
                    .is_some_and(|decided_at| decided_at > branch.level + 1);
                if literal.is_positive() && deeper {
                    found = Some((index, offset, literal, branch.level));
                }
            }
        }
        found
    }

    fn run_sat(&mut self) -> Result<()> {
        self.propagate_index = 0;

        let mut level = ROOT_LEVEL;
        let mut system_level = level + 1;
        let mut iterations = 0usize;

        loop {
            iterations += 1;
            if iterations > MAX_ITERATIONS {
                return Err(SolverError::Bug(format!(
                    "Solver exceeded {} iterations",
                    MAX_ITERATIONS
                )));
            }

            if level == ROOT_LEVEL {
                if let Some(conflict) = self.propagate(level)? {
                    level = self.analyze_unsolvable(conflict)?;
                    continue;
                }
            }

            // handle job rules
            if level < system_level {
                let job_rules = self.rules.group(RuleGroup::Job).to_vec();
                let mut jobs_left = false;

                for (position, &rule_id) in job_rules.iter().enumerate() {
                    let rule = self.rules.get(rule_id);
                    if rule.is_disabled() {
                        continue;
                    }

                    let mut queue = Vec::new();
                    let mut none_satisfied = true;
                    for &literal in rule.literals() {
                        if self.decisions.satisfy(literal) {
                            none_satisfied = false;
                            break;
                        }
                        if literal.is_positive() && self.decisions.undecided(literal.id()) {
                            queue.push(literal);
                        }
                    }
                    if !none_satisfied || queue.is_empty() {
                        continue;
                    }

                    // prune all update packages until installed version
                    // except for requested updates
                    if self.installed.len() != self.update_map.len() {
                        queue = self.prune_to_installed(queue);
                    }
                    if queue.is_empty() {
                        continue;
                    }

                    let previous_level = level;
                    level = self.select_and_install(level, queue, rule_id)?;
                    if level <= previous_level {
                        jobs_left = position + 1 < job_rules.len();
                        break;
                    }
                }

                system_level = level + 1;
                if jobs_left {
                    continue;
                }
            }

            if level < system_level {
                system_level = level;
            }

            // decide on every rule that is not fulfilled yet and offers a
            // choice between two or more packages
            let mut i = 0;
            let mut n = 0;
            while n < self.rules.len() {
                if i == self.rules.len() {
                    i = 0;
                }
                let rule_id = i;
                i += 1;
                n += 1;

                let rule = self.rules.get(rule_id);
                if rule.is_disabled() || rule.is_weak() {
                    continue;
                }

                // all negative literals installed, no positive one installed
                let mut queue = Vec::new();
                let mut fulfilled = false;
                for &literal in rule.literals() {
                    let installed = self.decisions.decided_install(literal.id());
                    if literal.is_negative() != installed {
                        fulfilled = true;
                        break;
                    }
                    if literal.is_positive() && self.decisions.undecided(literal.id()) {
                        queue.push(literal);
                    }
                }
                if fulfilled || queue.len() < 2 {
                    continue;
                }

                level = self.select_and_install(level, queue, rule_id)?;
                // something changed, so look at all rules again
                n = 0;
            }

            if level < system_level {
                continue;
            }

            // soft preferences: keep or update packages allowed to change
            if let Some((rule_id, queue)) = self.next_update_preference() {
                level = self.select_and_install(level, queue, rule_id)?;
                continue;
            }

            // minimization step
            if let Some((index, offset, literal, branch_level)) = self.find_minimization_candidate() {
                self.branches[index].literals.remove(offset);
                level = branch_level;
                self.revert(level);
                let why = self.decisions.last_reason();
                level = self.set_propagate_learn(level, literal, why)?;
                continue;
            }

            break;
        }

        Ok(())
    }
}
