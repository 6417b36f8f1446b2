//! Dependency resolution for Composer-style package graphs
//!
//! Packages from one or more repositories are registered in a [`Pool`],
//! which hands out stable integer ids. A [`Request`] lists jobs (install,
//! remove, update) and the [`Solver`] turns pool and request into boolean
//! clauses, runs a CDCL search over them and returns either an ordered
//! [`Transaction`] or a set of human-readable problems.
//!
//! ```no_run
//! use std::sync::Arc;
//! use knot_solver::{
//!     ArrayRepository, DefaultPolicy, InstalledRepository, Package, Pool, Repository, Request,
//!     Solver,
//! };
//!
//! # fn main() -> knot_solver::Result<()> {
//! let mut remote = ArrayRepository::new("remote");
//! remote.add_package(Package::new("acme/log", "1.2.0")?);
//!
//! let installed: Arc<dyn Repository> = Arc::new(InstalledRepository::new());
//! let mut pool = Pool::default();
//! pool.add_repository(installed.clone());
//! pool.add_repository(Arc::new(remote));
//!
//! let mut request = Request::new();
//! request.install("acme/log", None);
//!
//! let policy = DefaultPolicy::default();
//! let transaction = Solver::new(&mut pool, &policy, installed).solve(&request)?;
//! for operation in transaction.operations() {
//!     println!("{}", operation);
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod package;
pub mod repository;
pub mod solver;

pub use error::{Result, SolverError};
pub use package::{AliasPackage, Link, LinkType, Package, PackageManifest, PoolPackage};
pub use repository::{ArrayRepository, InstalledRepository, Repository};
pub use solver::{
    DefaultPolicy, Job, JobCommand, Literal, Operation, OperationKind, PackageId, Policy, Pool,
    PoolConfig, Problem, Request, RootAlias, Rule, RuleReason, Solver, SolverProblems,
    Transaction,
};
