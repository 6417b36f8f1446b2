use knot_semver::VersionParserError;
use thiserror::Error;

use crate::solver::SolverProblems;

#[derive(Error, Debug)]
pub enum SolverError {
    // Resolution errors
    #[error("Your requirements could not be resolved to an installable set of packages.\n{0}")]
    Unsolvable(SolverProblems),

    // Pool errors
    #[error("Repository not found in pool: {name}")]
    RepositoryNotFound { name: String },

    // Package errors
    #[error("Unknown package id: {0}")]
    UnknownPackage(u32),

    #[error("Invalid package {name}: {reason}")]
    InvalidPackage { name: String, reason: String },

    // Version constraint errors
    #[error("Invalid version constraint: {0}")]
    InvalidConstraint(#[from] VersionParserError),

    // JSON/parsing errors
    #[error("Failed to parse package data: {0}")]
    JsonParse(#[from] serde_json::Error),

    // Broken internal invariant
    #[error("Solver bug: {0}")]
    Bug(String),
}

impl SolverError {
    pub fn is_unsolvable(&self) -> bool {
        matches!(self, SolverError::Unsolvable(_))
    }
}

pub type Result<T> = std::result::Result<T, SolverError>;
