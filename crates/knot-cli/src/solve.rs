//! Solve command - resolve a scenario file and print the operations.

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use knot_solver::{Pool, Repository, Solver, SolverError, Transaction};
use std::path::PathBuf;
use std::sync::Arc;

use crate::scenario::Scenario;

/// Exit code for requirements that cannot be satisfied
pub const EXIT_UNSOLVABLE: i32 = 2;

#[derive(Args, Debug)]
pub struct SolveArgs {
    /// Scenario file (JSON)
    pub scenario: PathBuf,

    /// Print the operations as a JSON array
    #[arg(long)]
    pub json: bool,
}

pub fn execute(args: SolveArgs) -> Result<i32> {
    let scenario = Scenario::load(&args.scenario)?;

    match resolve(&scenario)? {
        Ok(transaction) => {
            print_transaction(&transaction, args.json)?;
            Ok(0)
        }
        Err(problems) => {
            eprintln!(
                "{} Your requirements could not be resolved to an installable set of packages.",
                style("Error:").red().bold()
            );
            eprint!("{}", problems);
            Ok(EXIT_UNSOLVABLE)
        }
    }
}

/// Runs the solver; the inner error carries the rendered problems
fn resolve(scenario: &Scenario) -> Result<std::result::Result<Transaction, knot_solver::SolverProblems>> {
    let config = scenario.pool_config()?;
    let policy = scenario.policy();
    let request = scenario.request()?;
    let aliases = scenario.root_aliases()?;

    let installed: Arc<dyn Repository> = Arc::new(scenario.installed_repository()?);
    let mut pool = Pool::new(config);
    pool.add_repository(installed.clone());
    for repo in scenario.remote_repositories()? {
        pool.add_repository_with_aliases(Arc::new(repo), &aliases);
    }
    log::debug!(
        "Loaded {} packages from {} repositories",
        pool.len(),
        pool.repositories().len()
    );

    match Solver::new(&mut pool, &policy, installed).solve(&request) {
        Ok(transaction) => Ok(Ok(transaction)),
        Err(SolverError::Unsolvable(problems)) => Ok(Err(problems)),
        Err(e) => Err(e).context("Dependency resolution failed"),
    }
}

fn print_transaction(transaction: &Transaction, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(transaction.operations())?);
        return Ok(());
    }

    if transaction.is_empty() {
        println!("{} Nothing to install, update or remove", style("Info:").cyan());
        return Ok(());
    }

    println!(
        "{} Package operations: {}",
        style("Resolved").green().bold(),
        transaction
    );
    for operation in transaction.operations() {
        println!("  {} {}", style("-").green(), operation);
    }
    Ok(())
}
