//! Single `<operator> <version>` constraint

use std::fmt;

use super::{Operator, VersionConstraint};
use crate::comparator::compare_versions;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    operator: Operator,
    version: String,
    pretty_string: Option<String>,
}

fn is_branch(version: &str) -> bool {
    version.starts_with("dev-")
}

impl Constraint {
    /// `version` must already be normalized.
    pub fn new(operator: Operator, version: impl Into<String>) -> Self {
        Constraint {
            operator,
            version: version.into(),
            pretty_string: None,
        }
    }

    /// `== version`, the form used to test a concrete package version.
    pub fn exact(version: impl Into<String>) -> Self {
        Self::new(Operator::Equal, version)
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Whether the two single constraints share at least one version.
    ///
    /// With `compare_branches` off, named `dev-` branches never compare with
    /// numbered versions.
    pub fn match_specific(&self, provider: &Constraint, compare_branches: bool) -> bool {
        let is_eq = self.operator == Operator::Equal;
        let is_ne = self.operator == Operator::NotEqual;
        let provider_eq = provider.operator == Operator::Equal;
        let provider_ne = provider.operator == Operator::NotEqual;

        if is_ne || provider_ne {
            if is_ne && !provider_ne && !provider_eq && is_branch(&provider.version) {
                return false;
            }
            if provider_ne && !is_ne && !is_eq && is_branch(&self.version) {
                return false;
            }
            if !is_eq && !provider_eq {
                return true;
            }
            return version_compare(
                &provider.version,
                &self.version,
                Operator::NotEqual,
                compare_branches,
            );
        }

        // <= 2.0 and < 1.0 always overlap somewhere below 1.0
        if !is_eq
            && self.operator.direction().is_some()
            && self.operator.direction() == provider.operator.direction()
        {
            return !(is_branch(&self.version) || is_branch(&provider.version));
        }

        let (left, right, operator) = if is_eq {
            (&self.version, &provider.version, provider.operator)
        } else {
            (&provider.version, &self.version, self.operator)
        };

        if !version_compare(left, right, operator, compare_branches) {
            return false;
        }

        // >= 1.0 against < 1.0 touches at 1.0 but does not overlap
        let touching = provider.operator.is_strict()
            && !self.operator.is_strict()
            && compare_versions(&provider.version, &self.version).is_eq();
        !touching
    }
}

fn version_compare(a: &str, b: &str, operator: Operator, compare_branches: bool) -> bool {
    let a_branch = is_branch(a);
    let b_branch = is_branch(b);

    if operator == Operator::NotEqual && (a_branch || b_branch) {
        return a != b;
    }
    if a_branch && b_branch {
        return operator == Operator::Equal && a == b;
    }
    if !compare_branches && (a_branch || b_branch) {
        return false;
    }

    operator.holds(compare_versions(a, b))
}

impl VersionConstraint for Constraint {
    fn matches(&self, provider: &dyn VersionConstraint) -> bool {
        match provider.as_single() {
            Some(single) => self.match_specific(single, false),
            None => provider.matches(self),
        }
    }

    fn pretty_string(&self) -> String {
        self.pretty_string
            .clone()
            .unwrap_or_else(|| self.to_string())
    }

    fn set_pretty_string(&mut self, pretty: Option<String>) {
        self.pretty_string = pretty;
    }

    fn clone_box(&self) -> Box<dyn VersionConstraint> {
        Box::new(self.clone())
    }

    fn as_single(&self) -> Option<&Constraint> {
        Some(self)
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.operator, self.version)
    }
}
