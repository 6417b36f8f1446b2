//! Two-watched-literal propagation index

use std::collections::HashMap;

use super::decisions::Decisions;
use super::literal::Literal;
use super::rule::RuleId;
use super::rule_set::RuleSet;
use crate::error::Result;

#[derive(Debug, Clone)]
struct WatchNode {
    rule: RuleId,
    watch1: Literal,
    watch2: Literal,
}

impl WatchNode {
    fn other_watch(&self, literal: Literal) -> Literal {
        if self.watch1 == literal {
            self.watch2
        } else {
            self.watch1
        }
    }

    fn move_watch(&mut self, from: Literal, to: Literal) {
        if self.watch1 == from {
            self.watch1 = to;
        } else {
            self.watch2 = to;
        }
    }
}

/// Every rule with two or more literals watches two of them; a rule only
/// needs a look when one of its watched literals becomes false.
///
/// Assertions, empty rules and weak rules are never watched.
#[derive(Debug, Default)]
pub struct WatchGraph {
    nodes: Vec<WatchNode>,
    chains: HashMap<Literal, Vec<usize>>,
}

impl WatchGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Watches every eligible rule of `rules`
    pub fn from_rules(rules: &RuleSet) -> Self {
        let mut graph = Self::new();
        for id in rules.iter_ids() {
            graph.insert(rules, id);
        }
        graph
    }

    /// Watches the first two literals of the rule
    pub fn insert(&mut self, rules: &RuleSet, rule_id: RuleId) {
        let rule = rules.get(rule_id);
        if rule.is_weak() || rule.literals().len() < 2 {
            return;
        }
        let literals = rule.literals();
        self.add_node(WatchNode {
            rule: rule_id,
            watch1: literals[0],
            watch2: literals[1],
        });
    }

    /// Watches the first literal plus the one decided at the highest level,
    /// so the learned rule becomes unit right after backjumping.
    pub fn insert_learned(&mut self, rules: &RuleSet, rule_id: RuleId, decisions: &Decisions) {
        let rule = rules.get(rule_id);
        let literals = rule.literals();
        if literals.len() < 2 {
            return;
        }

        let mut watch2 = literals[1];
        let mut highest = None;
        for &literal in &literals[1..] {
            let level = decisions.decision_level(literal.id());
            if level > highest {
                highest = level;
                watch2 = literal;
            }
        }

        self.add_node(WatchNode {
            rule: rule_id,
            watch1: literals[0],
            watch2,
        });
    }

    fn add_node(&mut self, node: WatchNode) {
        let index = self.nodes.len();
        self.chains.entry(node.watch1).or_default().push(index);
        self.chains.entry(node.watch2).or_default().push(index);
        self.nodes.push(node);
    }

    /// Visits the rules watching `-decided`, moving watches where possible
    /// and deciding unit literals at `level`. Returns the first rule whose
    /// literals are all false.
    pub fn propagate_literal(
        &mut self,
        decided: Literal,
        level: u32,
        decisions: &mut Decisions,
        rules: &RuleSet,
    ) -> Result<Option<RuleId>> {
        let watched = -decided;
        let Some(chain) = self.chains.remove(&watched) else {
            return Ok(None);
        };

        let mut kept = Vec::with_capacity(chain.len());
        let mut outcome = Ok(None);

        for (position, &node_index) in chain.iter().enumerate() {
            let node = &self.nodes[node_index];
            let rule = rules.get(node.rule);
            let other = node.other_watch(watched);

            if rule.is_disabled() || decisions.satisfy(other) {
                kept.push(node_index);
                continue;
            }

            let replacement = rule
                .literals()
                .iter()
                .copied()
                .find(|&lit| lit != watched && lit != other && !decisions.conflict(lit));

            if let Some(replacement) = replacement {
                self.nodes[node_index].move_watch(watched, replacement);
                self.chains.entry(replacement).or_default().push(node_index);
                continue;
            }

            kept.push(node_index);

            if decisions.conflict(other) {
                outcome = Ok(Some(node.rule));
            } else if let Err(e) = decisions.decide(other, level, Some(node.rule)) {
                outcome = Err(e);
            }

            if !matches!(outcome, Ok(None)) {
                kept.extend_from_slice(&chain[position + 1..]);
                break;
            }
        }

        if !kept.is_empty() {
            self.chains.insert(watched, kept);
        }
        outcome
    }

    /// Number of watched rules
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::rule::{Rule, RuleOrigin, RuleReason};
    use crate::solver::rule_set::RuleGroup;

    fn rule(values: &[i64]) -> Rule {
        let literals = values.iter().map(|v| Literal::from_signed(*v).unwrap()).collect();
        Rule::new(literals, RuleReason::PackageRequires, RuleOrigin::None)
    }

    #[test]
    fn test_assertions_are_not_watched() {
        let mut rules = RuleSet::new();
        rules.add(rule(&[1]), RuleGroup::Job);
        rules.add(rule(&[-1, 2]), RuleGroup::Package);
        rules.add(rule(&[1, 2]).weak(), RuleGroup::Update);
        let graph = WatchGraph::from_rules(&rules);
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_unit_propagation() {
        let mut rules = RuleSet::new();
        let requires = rules.add(rule(&[-1, 2]), RuleGroup::Package);
        let mut graph = WatchGraph::from_rules(&rules);
        let mut decisions = Decisions::new(2);

        decisions.decide(Literal::positive(1), 1, None).unwrap();
        let conflict = graph
            .propagate_literal(Literal::positive(1), 1, &mut decisions, &rules)
            .unwrap();

        assert_eq!(conflict, None);
        assert!(decisions.satisfy(Literal::positive(2)));
        assert_eq!(decisions.decision_reason(2), Some(requires));
    }

    #[test]
    fn test_watch_moves_to_free_literal() {
        let mut rules = RuleSet::new();
        rules.add(rule(&[-1, 2, 3]), RuleGroup::Package);
        let mut graph = WatchGraph::from_rules(&rules);
        let mut decisions = Decisions::new(3);

        decisions.decide(Literal::negative(2), 1, None).unwrap();
        graph
            .propagate_literal(Literal::negative(2), 1, &mut decisions, &rules)
            .unwrap();
        assert!(decisions.undecided(3));

        decisions.decide(Literal::positive(1), 2, None).unwrap();
        graph
            .propagate_literal(Literal::positive(1), 2, &mut decisions, &rules)
            .unwrap();
        assert!(decisions.satisfy(Literal::positive(3)));
    }

    #[test]
    fn test_conflict_detected() {
        let mut rules = RuleSet::new();
        let conflict_rule = rules.add(rule(&[-1, -2]), RuleGroup::Package);
        let mut graph = WatchGraph::from_rules(&rules);
        let mut decisions = Decisions::new(2);

        decisions.decide(Literal::positive(2), 1, None).unwrap();
        decisions.decide(Literal::positive(1), 1, None).unwrap();
        let conflict = graph
            .propagate_literal(Literal::positive(1), 1, &mut decisions, &rules)
            .unwrap();
        assert_eq!(conflict, Some(conflict_rule));
    }

    #[test]
    fn test_disabled_rules_are_skipped() {
        let mut rules = RuleSet::new();
        let id = rules.add(rule(&[-1, 2]), RuleGroup::Package);
        let mut graph = WatchGraph::from_rules(&rules);
        rules.get_mut(id).disable();

        let mut decisions = Decisions::new(2);
        decisions.decide(Literal::positive(1), 1, None).unwrap();
        graph
            .propagate_literal(Literal::positive(1), 1, &mut decisions, &rules)
            .unwrap();
        assert!(decisions.undecided(2));
    }

    #[test]
    fn test_learned_rule_watches_highest_level() {
        let mut rules = RuleSet::new();
        let mut decisions = Decisions::new(3);
        decisions.decide(Literal::positive(2), 1, None).unwrap();
        decisions.decide(Literal::positive(3), 2, None).unwrap();

        let learned = rules.add(
            Rule::learned(
                vec![Literal::negative(1), Literal::negative(2), Literal::negative(3)],
                0,
            ),
            RuleGroup::Learned,
        );
        let mut graph = WatchGraph::new();
        graph.insert_learned(&rules, learned, &decisions);

        decisions.revert_last();
        decisions.decide(Literal::positive(1), 1, None).unwrap();
        // watch sits on -3 (level 2) and -1; -2 is not watched
        let conflict = graph
            .propagate_literal(Literal::positive(1), 1, &mut decisions, &rules)
            .unwrap();
        assert_eq!(conflict, None);
        assert!(decisions.satisfy(Literal::negative(3)));
    }
}
