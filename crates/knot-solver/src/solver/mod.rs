//! SAT-based dependency resolver
//!
//! This module implements a CDCL (Conflict-Driven Clause Learning) solver for
//! package dependency resolution, following Composer's solver design.
//!
//! # Architecture
//!
//! - [`Pool`]: registry of every candidate package, queried by name/constraint
//! - [`Request`]: ordered list of jobs (install, remove, update)
//! - [`RuleSet`]: clauses generated from the dependency graph
//! - [`Policy`]: candidate ordering used for branching
//! - [`Solver`]: propagation, learning, backjumping and branching
//! - [`Problem`]: explanation of an unsatisfiable job
//! - [`Transaction`]: ordered operations for a solution
//!
//! # Algorithm Overview
//!
//! 1. **Rule Generation**: convert the dependency graph to clauses
//! 2. **Unit Propagation**: force decisions from unit clauses
//! 3. **Decision Making**: choose package versions using the policy
//! 4. **Conflict Analysis**: learn from conflicts to avoid repeating mistakes
//! 5. **Backjumping**: revert to the level where the learned clause asserts
//! 6. **Minimization**: retry untried alternatives of earlier branches

mod decisions;
mod literal;
mod policy;
mod pool;
mod problem;
mod request;
mod rule;
mod rule_generator;
mod rule_set;
#[allow(clippy::module_inception)]
mod solver;
mod transaction;
mod watch_graph;


pub use decisions::{Decision, Decisions};
pub use literal::{Literal, Polarity};
pub use policy::{DefaultPolicy, Policy};
pub use pool::{PackageId, Pool, PoolConfig, ProvideQuery, RootAlias};
pub use problem::{Problem, SolverProblems};
pub use request::{Job, JobCommand, Request};
pub use rule::{format_packages_unique, Rule, RuleId, RuleOrigin, RuleReason};
pub use rule_generator::RuleSetGenerator;
pub use rule_set::{RuleGroup, RuleSet};
pub use solver::Solver;
pub use transaction::{Operation, OperationKind, Transaction};
pub use watch_graph::WatchGraph;
