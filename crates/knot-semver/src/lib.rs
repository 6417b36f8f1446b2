//! Version handling for the knot resolver
//!
//! Versions are kept in Composer's normalized form (`1.2.0.0`,
//! `1.0.0.0-beta2`, `dev-main`, `2.1.9999999.9999999-dev`). This crate turns
//! user-facing version strings and constraint expressions into that form,
//! orders normalized versions, and decides whether two constraints intersect.

mod comparator;
pub mod constraint;
mod version_parser;

pub use comparator::{compare_versions, Comparator};
pub use constraint::{
    Constraint, MatchAllConstraint, MultiConstraint, Operator,
    VersionConstraint,
};
pub use version_parser::{Stability, VersionParser, VersionParserError};
