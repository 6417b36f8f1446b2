/// Integration tests for dependency resolution
///
/// These tests drive the public API the way a frontend does: repositories
/// are loaded from JSON package listings, jobs are parsed from strings and
/// the outcome is checked through the rendered operations and problems.

use std::sync::Arc;

use knot_semver::Stability;
use knot_solver::{
    ArrayRepository, DefaultPolicy, InstalledRepository, Job, JobCommand, Pool, PoolConfig,
    Repository, Request, Solver, SolverError, Transaction,
};
use serde_json::json;

fn solve(
    config: PoolConfig,
    installed: serde_json::Value,
    remote: serde_json::Value,
    jobs: &[(JobCommand, &str, Option<&str>)],
) -> knot_solver::Result<Transaction> {
    let installed: Arc<dyn Repository> = Arc::new(InstalledRepository::from_json(&installed)?);
    let mut pool = Pool::new(config);
    pool.add_repository(installed.clone());
    pool.add_repository(Arc::new(ArrayRepository::from_json("packagist", &remote)?));

    let mut request = Request::new();
    for (command, name, constraint) in jobs {
        request.add_job(Job::parse(*command, name, *constraint)?);
    }

    let policy = DefaultPolicy::new();
    Solver::new(&mut pool, &policy, installed).solve(&request)
}

fn rendered(transaction: &Transaction) -> Vec<String> {
    transaction.operations().iter().map(|op| op.to_string()).collect()
}

#[test]
fn test_install_with_transitive_requirements() {
    let remote = json!([
        {"name": "acme/app", "version": "1.0.0", "require": {"acme/http": "^2.0"}},
        {"name": "acme/http", "version": "2.0.0", "require": {"acme/log": "^1.0"}},
        {"name": "acme/http", "version": "2.3.1", "require": {"acme/log": "^1.2"}},
        {"name": "acme/log", "version": "1.1.0"},
        {"name": "acme/log", "version": "1.4.0"}
    ]);

    let transaction = solve(
        PoolConfig::default(),
        json!([]),
        remote,
        &[(JobCommand::Install, "acme/app", None)],
    )
    .unwrap();

    assert_eq!(
        rendered(&transaction),
        vec![
            "Installing acme/log (1.4.0)",
            "Installing acme/http (2.3.1)",
            "Installing acme/app (1.0.0)",
        ]
    );
    assert_eq!(transaction.to_string(), "3 installs, 0 updates, 0 removals");
}

#[test]
fn test_update_with_constraint() {
    let installed = json!([{"name": "acme/log", "version": "1.1.0"}]);
    let remote = json!([
        {"name": "acme/log", "version": "1.1.0"},
        {"name": "acme/log", "version": "1.4.0"},
        {"name": "acme/log", "version": "2.0.0"}
    ]);

    let transaction = solve(
        PoolConfig::default(),
        installed,
        remote,
        &[
            (JobCommand::Install, "acme/log", Some("^1.0")),
            (JobCommand::Update, "acme/log", None),
        ],
    )
    .unwrap();

    assert_eq!(rendered(&transaction), vec!["Updating acme/log (1.1.0 => 1.4.0)"]);

    let json = serde_json::to_value(transaction.operations()).unwrap();
    assert_eq!(
        json,
        json!([{"type": "update", "package": "acme/log", "version": "1.4.0", "from": "1.1.0"}])
    );
}

#[test]
fn test_branch_alias_satisfies_requirement() {
    let remote = json!([
        {
            "name": "acme/core",
            "version": "dev-main",
            "extra": {"branch-alias": {"dev-main": "2.1.x-dev"}}
        },
        {"name": "acme/app", "version": "1.0.0", "require": {"acme/core": "2.1.*"}}
    ]);

    let transaction = solve(
        PoolConfig::default().with_minimum_stability(Stability::Dev),
        json!([]),
        remote,
        &[(JobCommand::Install, "acme/app", None)],
    )
    .unwrap();

    assert_eq!(
        rendered(&transaction),
        vec![
            "Installing acme/core (dev-main)",
            "Marking acme/core (2.1.x-dev) as installed, alias of acme/core (dev-main)",
            "Installing acme/app (1.0.0)",
        ]
    );
}

#[test]
fn test_stability_filter_explains_missing_package() {
    let remote = json!([{"name": "acme/beta", "version": "1.0.0-beta2"}]);

    let error = solve(
        PoolConfig::default().with_minimum_stability(Stability::Stable),
        json!([]),
        remote,
        &[(JobCommand::Install, "acme/beta", None)],
    )
    .unwrap_err();

    let SolverError::Unsolvable(problems) = &error else {
        panic!("expected unsolvable, got {}", error);
    };
    assert_eq!(problems.len(), 1);
    assert!(problems.messages()[0].contains("minimum-stability"));
    assert!(error.to_string().contains("\n  Problem 1\n    - The requested package acme/beta"));
}

#[test]
fn test_invalid_constraint_is_rejected() {
    let error = Job::parse(JobCommand::Install, "acme/log", Some(">=foo")).unwrap_err();
    assert!(matches!(error, SolverError::InvalidConstraint(_)));
}
