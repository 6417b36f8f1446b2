use std::fmt;

use super::literal::Literal;
use super::pool::PackageId;
use super::rule::RuleId;
use crate::error::{Result, SolverError};

/// One entry of the decision trail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub literal: Literal,
    pub level: u32,
    /// Rule that forced the literal; `None` for free choices
    pub reason: Option<RuleId>,
}

/// Assignment trail plus a per-package lookup of the decided level
///
/// `decision_map[id]` is `0` when undecided and `±(level + 1)` otherwise,
/// the sign being the decided polarity.
#[derive(Debug, Clone, Default)]
pub struct Decisions {
    decision_map: Vec<i64>,
    queue: Vec<Decision>,
}

impl Decisions {
    pub fn new(package_count: usize) -> Self {
        Self {
            decision_map: vec![0; package_count + 1],
            queue: Vec::new(),
        }
    }

    fn map_value(&self, id: PackageId) -> i64 {
        self.decision_map.get(id as usize).copied().unwrap_or(0)
    }

    /// Records `literal` at `level`; deciding a package twice is a bug.
    pub fn decide(&mut self, literal: Literal, level: u32, reason: Option<RuleId>) -> Result<()> {
        let index = literal.id() as usize;
        let previous = self.map_value(literal.id());
        if previous != 0 {
            return Err(SolverError::Bug(format!(
                "Trying to decide {} on level {}, even though {} was previously decided as {}",
                literal,
                level,
                literal.id(),
                previous
            )));
        }

        if index >= self.decision_map.len() {
            self.decision_map.resize(index + 1, 0);
        }
        let value = i64::from(level) + 1;
        self.decision_map[index] = if literal.is_positive() { value } else { -value };
        self.queue.push(Decision {
            literal,
            level,
            reason,
        });
        Ok(())
    }

    /// The literal currently holds
    pub fn satisfy(&self, literal: Literal) -> bool {
        let value = self.map_value(literal.id());
        (literal.is_positive() && value > 0) || (literal.is_negative() && value < 0)
    }

    /// The opposite literal currently holds
    pub fn conflict(&self, literal: Literal) -> bool {
        let value = self.map_value(literal.id());
        (literal.is_positive() && value < 0) || (literal.is_negative() && value > 0)
    }

    pub fn decided(&self, id: PackageId) -> bool {
        self.map_value(id) != 0
    }

    pub fn undecided(&self, id: PackageId) -> bool {
        self.map_value(id) == 0
    }

    /// Decided as installed
    pub fn decided_install(&self, id: PackageId) -> bool {
        self.map_value(id) > 0
    }

    pub fn decision_level(&self, id: PackageId) -> Option<u32> {
        match self.map_value(id) {
            0 => None,
            value => Some((value.unsigned_abs() - 1) as u32),
        }
    }

    pub fn decision_reason(&self, id: PackageId) -> Option<RuleId> {
        self.queue
            .iter()
            .find(|decision| decision.literal.id() == id)
            .and_then(|decision| decision.reason)
    }

    pub fn last_reason(&self) -> Option<RuleId> {
        self.queue.last().and_then(|decision| decision.reason)
    }

    pub fn last_literal(&self) -> Option<Literal> {
        self.queue.last().map(|decision| decision.literal)
    }

    pub fn revert_last(&mut self) {
        if let Some(decision) = self.queue.pop() {
            if let Some(slot) = self.decision_map.get_mut(decision.literal.id() as usize) {
                *slot = 0;
            }
        }
    }

    /// Undoes every decision
    pub fn revert_all(&mut self) {
        while !self.queue.is_empty() {
            self.revert_last();
        }
    }

    /// Keeps the first `position + 1` decisions
    pub fn revert_to_position(&mut self, position: usize) {
        while self.queue.len() > position + 1 {
            self.revert_last();
        }
    }

    pub fn contains_at(&self, position: usize) -> bool {
        position < self.queue.len()
    }

    pub fn at(&self, position: usize) -> Option<&Decision> {
        self.queue.get(position)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Most recent decision first
    pub fn iter(&self) -> impl Iterator<Item = &Decision> {
        self.queue.iter().rev()
    }

    /// Oldest decision first
    pub fn iter_forward(&self) -> impl Iterator<Item = &Decision> {
        self.queue.iter()
    }

    /// Ids decided as installed, in trail order
    pub fn decided_ids(&self) -> Vec<PackageId> {
        self.queue
            .iter()
            .filter(|decision| decision.literal.is_positive())
            .map(|decision| decision.literal.id())
            .collect()
    }
}

impl fmt::Display for Decisions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries: Vec<String> = self
            .queue
            .iter()
            .map(|decision| format!("{}:{}", decision.level, decision.literal))
            .collect();
        write!(f, "[{}]", entries.join(","))
    }
}
