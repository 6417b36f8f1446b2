use std::collections::HashMap;
use std::fmt;

use super::rule::{Rule, RuleId};

/// Rule categories, iterated in this order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleGroup {
    Package,
    Job,
    Update,
    Learned,
}

impl RuleGroup {
    pub const ALL: [RuleGroup; 4] = [
        RuleGroup::Package,
        RuleGroup::Job,
        RuleGroup::Update,
        RuleGroup::Learned,
    ];

    fn index(self) -> usize {
        match self {
            RuleGroup::Package => 0,
            RuleGroup::Job => 1,
            RuleGroup::Update => 2,
            RuleGroup::Learned => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RuleGroup::Package => "PACKAGE",
            RuleGroup::Job => "JOB",
            RuleGroup::Update => "UPDATE",
            RuleGroup::Learned => "LEARNED",
        }
    }
}

/// All rules of one solve
///
/// Ids follow global insertion order. Rules with an identical non-empty
/// literal set are stored once; empty rules each keep their own id.
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
    rule_groups: Vec<RuleGroup>,
    groups: [Vec<RuleId>; 4],
    by_hash: HashMap<u64, Vec<RuleId>>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule and returns its id, or the id of the already stored rule
    /// with the same literals.
    pub fn add(&mut self, rule: Rule, group: RuleGroup) -> RuleId {
        if rule.is_empty() {
            return self.push(rule, group);
        }

        let hash = rule.literal_hash();
        if let Some(candidates) = self.by_hash.get(&hash) {
            if let Some(&existing) = candidates
                .iter()
                .find(|&&id| self.rules[id].equals_literals(&rule))
            {
                return existing;
            }
        }

        let id = self.push(rule, group);
        self.by_hash.entry(hash).or_default().push(id);
        id
    }

    fn push(&mut self, rule: Rule, group: RuleGroup) -> RuleId {
        let id = self.rules.len();
        self.rules.push(rule);
        self.rule_groups.push(group);
        self.groups[group.index()].push(id);
        id
    }

    pub fn get(&self, id: RuleId) -> &Rule {
        &self.rules[id]
    }

    pub fn get_mut(&mut self, id: RuleId) -> &mut Rule {
        &mut self.rules[id]
    }

    pub fn group_of(&self, id: RuleId) -> RuleGroup {
        self.rule_groups[id]
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Ids of one group in insertion order
    pub fn group(&self, group: RuleGroup) -> &[RuleId] {
        &self.groups[group.index()]
    }

    /// Every id, group by group
    pub fn iter_ids(&self) -> impl Iterator<Item = RuleId> + '_ {
        RuleGroup::ALL
            .into_iter()
            .flat_map(move |group| self.group(group).iter().copied())
    }

    /// `(id, rule)` pairs in id order
    pub fn iter(&self) -> impl Iterator<Item = (RuleId, &Rule)> {
        self.rules.iter().enumerate()
    }
}

impl fmt::Display for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for group in RuleGroup::ALL {
            let ids = self.group(group);
            if ids.is_empty() {
                continue;
            }
            writeln!(f, "{}: ", group.as_str())?;
            for &id in ids {
                writeln!(f, "    {}", self.rules[id])?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::literal::Literal;
    use crate::solver::rule::{RuleOrigin, RuleReason};

    fn rule(values: &[i64]) -> Rule {
        let literals = values.iter().map(|v| Literal::from_signed(*v).unwrap()).collect();
        Rule::new(literals, RuleReason::PackageRequires, RuleOrigin::None)
    }

    #[test]
    fn test_add_assigns_sequential_ids() {
        let mut rules = RuleSet::new();
        assert_eq!(rules.add(rule(&[-1, 2]), RuleGroup::Package), 0);
        assert_eq!(rules.add(rule(&[1]), RuleGroup::Job), 1);
        assert_eq!(rules.add(rule(&[-2, -3]), RuleGroup::Package), 2);
        assert_eq!(rules.len(), 3);
        assert_eq!(rules.group(RuleGroup::Package), &[0, 2]);
        assert_eq!(rules.group_of(1), RuleGroup::Job);
    }

    #[test]
    fn test_duplicates_are_merged() {
        let mut rules = RuleSet::new();
        let first = rules.add(rule(&[-1, 2]), RuleGroup::Package);
        let again = rules.add(rule(&[2, -1]), RuleGroup::Package);
        assert_eq!(first, again);
        assert_eq!(rules.len(), 1);
    }

    #[test]
    fn test_empty_rules_are_kept_apart() {
        let mut rules = RuleSet::new();
        let ghost = rules.add(rule(&[]), RuleGroup::Job);
        let phantom = rules.add(rule(&[]), RuleGroup::Job);
        assert_ne!(ghost, phantom);
        assert_eq!(rules.group(RuleGroup::Job), &[0, 1]);
    }

    #[test]
    fn test_iteration_is_grouped() {
        let mut rules = RuleSet::new();
        rules.add(rule(&[1]), RuleGroup::Job);
        rules.add(rule(&[-1, 2]), RuleGroup::Package);
        rules.add(Rule::learned(vec![Literal::negative(2)], 0), RuleGroup::Learned);

        let ids: Vec<RuleId> = rules.iter_ids().collect();
        assert_eq!(ids, vec![1, 0, 2]);
        assert_eq!(rules.iter().count(), 3);
    }

    #[test]
    fn test_display() {
        let mut rules = RuleSet::new();
        rules.add(rule(&[-1, 2]), RuleGroup::Package);
        assert_eq!(rules.to_string(), "PACKAGE: \n    (-1|2)\n");
    }
}
