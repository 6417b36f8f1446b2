//! Constraint types for version matching

mod constraint;
mod match_all;
mod multi_constraint;
mod operator;
mod version_constraint;

pub use constraint::Constraint;
pub use match_all::MatchAllConstraint;
pub use multi_constraint::MultiConstraint;
pub use operator::{InvalidOperatorError, Operator};
pub use version_constraint::VersionConstraint;
