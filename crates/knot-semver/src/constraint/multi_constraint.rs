//! AND / OR combinations of constraints

use std::fmt;

use super::{MatchAllConstraint, VersionConstraint};

#[derive(Debug, Clone)]
pub struct MultiConstraint {
    constraints: Vec<Box<dyn VersionConstraint>>,
    conjunctive: bool,
    pretty_string: Option<String>,
}

impl MultiConstraint {
    pub fn new(constraints: Vec<Box<dyn VersionConstraint>>, conjunctive: bool) -> Self {
        MultiConstraint {
            constraints,
            conjunctive,
            pretty_string: None,
        }
    }

    /// Builds the smallest equivalent constraint: `*` for no parts, the part
    /// itself for one, a `MultiConstraint` otherwise.
    pub fn create(
        mut constraints: Vec<Box<dyn VersionConstraint>>,
        conjunctive: bool,
    ) -> Box<dyn VersionConstraint> {
        match constraints.len() {
            0 => Box::new(MatchAllConstraint::new()),
            1 => constraints.remove(0),
            _ => Box::new(Self::new(constraints, conjunctive)),
        }
    }

    pub fn constraints(&self) -> &[Box<dyn VersionConstraint>] {
        &self.constraints
    }

    pub fn is_conjunctive(&self) -> bool {
        self.conjunctive
    }

    pub fn is_disjunctive(&self) -> bool {
        !self.conjunctive
    }
}

impl VersionConstraint for MultiConstraint {
    fn matches(&self, provider: &dyn VersionConstraint) -> bool {
        if !self.conjunctive {
            return self.constraints.iter().any(|c| provider.matches(c.as_ref()));
        }

        // [>1 <2] against [<1 || >2]: each OR branch has to hold the whole AND
        if let Some(multi) = provider.as_multi() {
            if multi.is_disjunctive() {
                return provider.matches(self);
            }
        }

        self.constraints.iter().all(|c| provider.matches(c.as_ref()))
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

    fn as_multi(&self) -> Option<&MultiConstraint> {
        Some(self)
    }
}

impl fmt::Display for MultiConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.constraints.iter().map(|c| c.to_string()).collect();
        let separator = if self.conjunctive { " " } else { " || " };
        write!(f, "[{}]", parts.join(separator))
    }
}
