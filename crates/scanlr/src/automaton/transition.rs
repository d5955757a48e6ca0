use super::{AutomatonError, ParserStateSet, StateNumber};
use crate::{
    lookahead::{LookaheadNumber, TerminalSet},
    rule::{RuleKind, RuleNumber},
    rule_position::{Position, RulePosition},
    types::{Map, Set},
    util::display_fn,
};
use std::fmt;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Action {
    /// Consume a terminal.
    Width,
    /// Complete a rule that starts a parent, creating the parent's node on
    /// top of the previous node.
    Height,
    /// Complete a rule inside an in-progress parent, replacing the
    /// parent's node.
    Graft,
    /// Accept.
    Goal,
    /// Consume a match of an embedded rule set.
    Embed,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Width => "WIDTH",
            Self::Height => "HEIGHT",
            Self::Graft => "GRAFT",
            Self::Goal => "GOAL",
            Self::Embed => "EMBED",
        })
    }
}

/// An edge of the automaton.
///
/// `guard` must match the input after the transition fires. `up` becomes
/// the runtime lookahead of the node it creates. Both may contain `UP`,
/// which is resolved against the runtime lookahead of the head (for WIDTH
/// and EMBED) or of the previous node (for HEIGHT and GRAFT).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Transition {
    from: StateNumber,
    to: StateNumber,
    action: Action,
    guard: LookaheadNumber,
    up: LookaheadNumber,
    prev_guard: Option<Vec<RulePosition>>,
}

impl Transition {
    pub fn from(&self) -> StateNumber {
        self.from
    }

    pub fn to(&self) -> StateNumber {
        self.to
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn guard(&self) -> LookaheadNumber {
        self.guard
    }

    pub fn up(&self) -> LookaheadNumber {
        self.up
    }

    /// For HEIGHT and GRAFT, the parent positions in the previous state
    /// this transition was derived from.
    pub fn prev_guard(&self) -> Option<&[RulePosition]> {
        self.prev_guard.as_deref()
    }

    pub fn display<'a>(&'a self, set: &'a ParserStateSet) -> impl fmt::Display + 'a {
        display_fn(move |f| {
            write!(
                f,
                "{:?} --{}--> {:?} guard={} up={}",
                self.from,
                self.action,
                self.to,
                set.display_lookahead(self.guard),
                set.display_lookahead(self.up)
            )?;
            if let Some(prev_guard) = &self.prev_guard {
                f.write_str(" prev=[")?;
                for (i, rp) in prev_guard.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", set.display_position(rp))?;
                }
                f.write_str("]")?;
            }
            Ok(())
        })
    }
}

#[derive(Default)]
struct Grouped {
    guard: TerminalSet,
    positions: Set<RulePosition>,
    prev_guard: Set<RulePosition>,
}

impl ParserStateSet {
    pub(super) fn calc_transitions(
        &mut self,
        from: StateNumber,
        previous: Option<StateNumber>,
    ) -> Result<Vec<Transition>, AutomatonError> {
        let positions = self.states[from.index()].rule_positions.clone();
        let num_completed = positions.iter().filter(|rp| rp.is_at_end()).count();
        let transitions = match (num_completed, &positions[..]) {
            (0, _) => self.calc_width_transitions(from)?,
            (1, &[completed]) => self.calc_completion_transitions(from, completed, previous)?,
            _ => {
                return Err(AutomatonError::invariant(format!(
                    "state {:?} is neither a frame nor a single completed position",
                    from
                )))
            }
        };

        tracing::trace!(
            "transitions {:?} (previous {:?}): {}",
            from,
            previous,
            transitions.len()
        );
        Ok(transitions)
    }

    /// WIDTH and EMBED transitions for each terminal or embedded rule
    /// expected in the closure of a frame state.
    fn calc_width_transitions(
        &mut self,
        from: StateNumber,
    ) -> Result<Vec<Transition>, AutomatonError> {
        let closure = self.closure(from)?;
        let mut groups: Map<RuleNumber, TerminalSet> = Map::default();
        for item in closure {
            let rp = item.rule_position;
            let children = rp.items(self.rule(rp.rule())?)?.to_vec();
            for child in children {
                if !matches!(self.rule(child)?.kind(), RuleKind::Terminal | RuleKind::Embedded) {
                    continue;
                }
                let follow = self.lookaheads.get(item.lookahead).content().clone();
                let guard = self.first_of_next(rp, &follow)?;
                groups.entry(child).or_default().union_with(&guard);
            }
        }

        let mut transitions = Vec::with_capacity(groups.len());
        for (leaf, guard) in groups {
            let action = if self.rule(leaf)?.is_embedded() {
                Action::Embed
            } else {
                Action::Width
            };
            let to = self.create_state(vec![RulePosition::new(
                leaf,
                RulePosition::OPTION_NONE,
                Position::END_OF_RULE,
            )]);
            let guard = self.lookaheads.create(guard);
            transitions.push(Transition {
                from,
                to,
                action,
                guard,
                up: guard,
                prev_guard: None,
            });
        }
        Ok(transitions)
    }

    /// HEIGHT, GRAFT and GOAL transitions out of a completed state.
    fn calc_completion_transitions(
        &mut self,
        from: StateNumber,
        completed: RulePosition,
        previous: Option<StateNumber>,
    ) -> Result<Vec<Transition>, AutomatonError> {
        let goal = Transition {
            from,
            to: from,
            action: Action::Goal,
            guard: LookaheadNumber::EMPTY,
            up: LookaheadNumber::EMPTY,
            prev_guard: None,
        };
        let rule = completed.rule();
        if rule == RuleNumber::GOAL || !self.parent_positions.contains_key(&rule) {
            return Ok(vec![goal]);
        }
        let Some(previous) = previous else {
            // nothing below to attach to
            return Ok(vec![goal]);
        };

        // Completed targets keep one transition per (action, target, up).
        // In-progress targets sharing (action, up) merge into one state.
        let mut completed_groups: Map<(Action, RulePosition, LookaheadNumber), Grouped> =
            Map::default();
        let mut frame_groups: Map<(Action, LookaheadNumber), Grouped> = Map::default();

        for relation in self.parent_relations(rule, previous)? {
            let parent = relation.rule_position;
            let action = if parent.rule() != RuleNumber::GOAL && parent.is_at_start() {
                Action::Height
            } else {
                Action::Graft
            };
            let follow = self.lookaheads.get(relation.lookahead).content().clone();
            for next in parent.next(self.rule(parent.rule())?)? {
                let guard = self.first_of(next, &follow)?;
                let group = if next.is_at_end() {
                    completed_groups
                        .entry((action, next, relation.lookahead))
                        .or_default()
                } else {
                    frame_groups
                        .entry((action, relation.lookahead))
                        .or_default()
                };
                group.guard.union_with(&guard);
                group.positions.insert(next);
                group.prev_guard.insert(parent);
            }
        }

        let groups = completed_groups
            .into_iter()
            .map(|((action, _, up), group)| (action, up, group))
            .chain(
                frame_groups
                    .into_iter()
                    .map(|((action, up), group)| (action, up, group)),
            );
        let mut transitions = vec![];
        for (action, up, group) in groups {
            let to = self.create_state(group.positions.into_iter().collect());
            let guard = self.lookaheads.create(group.guard);
            let mut prev_guard: Vec<_> = group.prev_guard.into_iter().collect();
            prev_guard.sort();
            transitions.push(Transition {
                from,
                to,
                action,
                guard,
                up,
                prev_guard: Some(prev_guard),
            });
        }
        Ok(transitions)
    }
}
