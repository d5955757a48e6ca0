use super::{AutomatonError, ParserStateSet, StateNumber};
use crate::{
    lookahead::{LookaheadNumber, TerminalSet},
    rule::{RuleKind, RuleNumber},
    rule_position::RulePosition,
    types::{Queue, Set},
};

/// A rule position reachable inside a state, with the lookahead that must
/// follow the completion of its rule. The lookahead is relative to the
/// state: `UP` stands for whatever follows the state's own positions.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ClosureItem {
    pub rule_position: RulePosition,
    pub lookahead: LookaheadNumber,
}

/// A closure item of a previous state that references a completed rule.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ParentRelation {
    pub rule_position: RulePosition,
    pub lookahead: LookaheadNumber,
}

impl ParserStateSet {
    /// The closure of a state: its own positions (with lookahead `UP`) plus
    /// the start positions of every non-terminal they expect, transitively.
    pub fn closure(&mut self, state: StateNumber) -> Result<Vec<ClosureItem>, AutomatonError> {
        self.check_state(state)?;
        if let Some(items) = self.closures.get(&state) {
            return Ok(items.clone());
        }
        let items = self.calc_closure(state)?;
        self.closures.insert(state, items.clone());
        Ok(items)
    }

    fn calc_closure(&mut self, state: StateNumber) -> Result<Vec<ClosureItem>, AutomatonError> {
        let mut queue: Queue<ClosureItem> = self.states[state.index()]
            .rule_positions
            .iter()
            .map(|&rule_position| ClosureItem {
                rule_position,
                lookahead: LookaheadNumber::UP,
            })
            .collect();
        let mut done = Set::default();
        let mut items = vec![];

        // (position, lookahead) pairs are finite, so this terminates even
        // for left-recursive rules.
        while let Some(item) = queue.pop() {
            if !done.insert(item) {
                continue;
            }
            items.push(item);

            let rp = item.rule_position;
            if rp.is_at_end() {
                continue;
            }
            let children = rp.items(self.rule(rp.rule())?)?.to_vec();
            for child in children {
                let child_rule = self.rule(child)?;
                if child_rule.kind() != RuleKind::NonTerminal {
                    continue;
                }
                let starts = child_rule.positions_at_start();
                let follow = self.lookaheads.get(item.lookahead).content().clone();
                let child_follow = self.first_of_next(rp, &follow)?;
                let lookahead = self.lookaheads.create(child_follow);
                queue.extend(starts.into_iter().map(|rule_position| ClosureItem {
                    rule_position,
                    lookahead,
                }));
            }
        }

        tracing::trace!("closure of {:?}: {} items", state, items.len());
        Ok(items)
    }

    /// Terminals that can be consumed first from `start`, with `follow`
    /// added when the rest of the rule can match empty.
    pub fn first_of(
        &self,
        start: RulePosition,
        follow: &TerminalSet,
    ) -> Result<TerminalSet, AutomatonError> {
        let mut first = TerminalSet::default();
        let mut visited = Set::default();
        let mut pending = vec![start];
        while let Some(rp) = pending.pop() {
            if !visited.insert(rp) {
                continue;
            }
            if rp.is_at_end() {
                first.union_with(follow);
                continue;
            }
            let rule = self.rule(rp.rule())?;
            for &item in rp.items(rule)? {
                first.union_with(self.rule_set.first_terminals(item)?);
                if self.rule_set.is_nullable(item) {
                    pending.extend(rp.next(rule)?);
                }
            }
        }
        Ok(first)
    }

    /// [`first_of`](Self::first_of) over every successor of `rp`.
    pub fn first_of_next(
        &self,
        rp: RulePosition,
        follow: &TerminalSet,
    ) -> Result<TerminalSet, AutomatonError> {
        let mut first = TerminalSet::default();
        for next in rp.next(self.rule(rp.rule())?)? {
            first.union_with(&self.first_of(next, follow)?);
        }
        Ok(first)
    }

    /// Closure items of `previous` at which `child` is referenced.
    pub fn parent_relations(
        &mut self,
        child: RuleNumber,
        previous: StateNumber,
    ) -> Result<Vec<ParentRelation>, AutomatonError> {
        let closure = self.closure(previous)?;
        let Some(parents) = self.parent_positions.get(&child) else {
            return Ok(vec![]);
        };
        Ok(closure
            .into_iter()
            .filter(|item| parents.contains(&item.rule_position))
            .map(|item| ParentRelation {
                rule_position: item.rule_position,
                lookahead: item.lookahead,
            })
            .collect())
    }

    /// Context-free over-approximation of what may follow a match of
    /// `rule`, found by climbing the parent index up to the goal.
    pub fn follow_of(&self, rule: RuleNumber) -> Result<TerminalSet, AutomatonError> {
        let up: TerminalSet = [RuleNumber::USE_PARENT_LOOKAHEAD].into_iter().collect();
        let mut follow = TerminalSet::default();
        let mut visited = Set::default();
        let mut pending = vec![rule];
        while let Some(child) = pending.pop() {
            if !visited.insert(child) {
                continue;
            }
            if child == RuleNumber::GOAL {
                follow.insert(RuleNumber::END_OF_TEXT);
                continue;
            }
            for &parent in self.parent_positions(child) {
                let mut first = self.first_of_next(parent, &up)?;
                if first.remove(RuleNumber::USE_PARENT_LOOKAHEAD) {
                    pending.push(parent.rule());
                }
                follow.union_with(&first);
            }
        }
        Ok(follow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule_set::RuleSet;
    use std::sync::Arc;

    // S = 'a' | S1 ; S1 = S 'a'
    fn left_recursive() -> ParserStateSet {
        let rules = RuleSet::define(|b| {
            let a = b.literal("a");
            let s = b.non_terminal("S")?;
            let s1 = b.non_terminal("S1")?;
            b.choice(s, crate::rule::ChoiceKind::LongestPriority, [a, s1])?;
            b.concatenation(s1, [s, a])?;
            Ok(())
        })
        .unwrap();
        let s = rules.find_runtime_rule("S").unwrap().number();
        ParserStateSet::new(Arc::new(rules), s, false).unwrap()
    }

    #[test]
    fn closure_terminates_on_left_recursion() {
        let mut set = left_recursive();
        let start = set.start_state();
        let items = set.closure(start).unwrap();
        for item in &items {
            eprintln!(
                "{} {}",
                set.display_position(&item.rule_position),
                set.display_lookahead(item.lookahead)
            );
        }
        // G@0; S/0@0, S/1@0 and S1@0, each under `UP` and under {'a'}
        assert_eq!(items.len(), 7);
        assert_eq!(items[0].lookahead, LookaheadNumber::UP);
        assert_eq!(set.closure(start).unwrap(), items);
    }

    #[test]
    fn first_and_follow() {
        let set = left_recursive();
        let rules = set.rule_set().clone();
        let a = rules.find_terminal_rule("a").unwrap().number();
        let s = rules.find_runtime_rule("S").unwrap().number();
        let s1 = rules.find_runtime_rule("S1").unwrap().number();

        let start = RulePosition::new(s1, 0, crate::rule_position::Position::START_OF_RULE);
        let first: Vec<_> = set.first_of(start, &TerminalSet::default()).unwrap().iter().collect();
        assert_eq!(first, vec![a]);

        let follow: Vec<_> = set.follow_of(s).unwrap().iter().collect();
        assert_eq!(follow, vec![RuleNumber::END_OF_TEXT, a]);
        let follow: Vec<_> = set.follow_of(a).unwrap().iter().collect();
        assert_eq!(follow, vec![RuleNumber::END_OF_TEXT, a]);
    }
}
