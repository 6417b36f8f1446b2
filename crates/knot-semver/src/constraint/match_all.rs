use std::fmt;

use super::VersionConstraint;

/// Accepts every version (`*`)
#[derive(Debug, Clone, Default)]
pub struct MatchAllConstraint {
    pretty_string: Option<String>,
}

impl MatchAllConstraint {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VersionConstraint for MatchAllConstraint {
    fn matches(&self, _provider: &dyn VersionConstraint) -> bool {
        true
    }

    fn pretty_string(&self) -> String {
        self.pretty_string.clone().unwrap_or_else(|| "*".to_string())
    }

    fn set_pretty_string(&mut self, pretty: Option<String>) {
        self.pretty_string = pretty;
    }

    fn clone_box(&self) -> Box<dyn VersionConstraint> {
        Box::new(self.clone())
    }

    fn is_match_all(&self) -> bool {
        true
    }
}

impl fmt::Display for MatchAllConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("*")
    }
}
