use std::fmt;

use super::{Constraint, MultiConstraint};

/// Common behaviour of every constraint kind.
///
/// `matches` answers "is there a version accepted by both sides?". A package
/// version is tested by wrapping it in an `==` [`Constraint`] and passing it as
/// the provider.
pub trait VersionConstraint: fmt::Debug + fmt::Display + Send + Sync {
    fn matches(&self, provider: &dyn VersionConstraint) -> bool;

    /// The string the constraint was written as, falling back to `Display`.
    fn pretty_string(&self) -> String;

    fn set_pretty_string(&mut self, pretty: Option<String>);

    fn clone_box(&self) -> Box<dyn VersionConstraint>;

    fn as_single(&self) -> Option<&Constraint> {
        None
    }

    fn as_multi(&self) -> Option<&MultiConstraint> {
        None
    }

    fn is_match_all(&self) -> bool {
        false
    }
}

impl Clone for Box<dyn VersionConstraint> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}
