use super::{Action, AutomatonError, ParserStateSet, StateNumber};
use crate::types::{Map, Set};

impl ParserStateSet {
    /// Derive every state and transition reachable from the start state.
    ///
    /// The walk follows `(state, previous)` pairs the way the runtime would:
    /// WIDTH and EMBED push the current frame, HEIGHT keeps the previous
    /// state, and GRAFT pops back to the states below the previous frame.
    #[tracing::instrument(skip_all, fields(state_set = self.number))]
    pub fn build(&mut self) -> Result<(), AutomatonError> {
        if self.built {
            return Ok(());
        }

        // frame -> states that were below it
        let mut previous_of: Map<StateNumber, Set<Option<StateNumber>>> = Map::default();
        // frame -> GRAFT targets that pop back through it
        let mut grafted_from: Map<StateNumber, Set<StateNumber>> = Map::default();
        let mut done: Set<(StateNumber, Option<StateNumber>)> = Set::default();
        let mut pending = vec![(self.start, None)];

        while let Some((state, previous)) = pending.pop() {
            if !done.insert((state, previous)) {
                continue;
            }

            if self.states[state.index()].is_frame()
                && previous_of.entry(state).or_default().insert(previous)
            {
                // Targets grafted through this frame gain a new context.
                for &target in grafted_from.get(&state).into_iter().flatten() {
                    pending.push((target, previous));
                }
            }

            let transitions = self.transitions(state, previous)?.to_vec();
            for transition in transitions {
                let to = transition.to();
                match transition.action() {
                    Action::Width | Action::Embed => pending.push((to, Some(state))),
                    Action::Height => pending.push((to, previous)),
                    Action::Graft => {
                        let Some(frame) = previous else {
                            return Err(AutomatonError::invariant(format!(
                                "GRAFT out of {:?} without a previous state",
                                state
                            )));
                        };
                        grafted_from.entry(frame).or_default().insert(to);
                        for &below in previous_of.get(&frame).into_iter().flatten() {
                            pending.push((to, below));
                        }
                    }
                    Action::Goal => {}
                }
            }
        }

        self.built = true;
        tracing::debug!(
            num_states = self.states.len(),
            num_lookaheads = self.lookaheads.len(),
            num_contexts = done.len(),
            "automaton built"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{rule::ChoiceKind, rule_set::RuleSet};
    use std::sync::Arc;

    #[test]
    fn build_single_terminal() {
        let rules = RuleSet::define(|b| {
            let a = b.literal("a");
            let s = b.non_terminal("S")?;
            b.concatenation(s, [a])
        })
        .unwrap();
        let s = rules.find_runtime_rule("S").unwrap().number();
        let mut set = ParserStateSet::new(Arc::new(rules), s, false).unwrap();
        set.build().unwrap();
        eprintln!("{}", set);
        assert!(set.is_built());
        assert_eq!(set.num_states(), 4);

        let mut actions: Vec<_> = set
            .states()
            .flat_map(|state| state.transitions_cache())
            .flat_map(|(_, transitions)| transitions.iter().map(|t| t.action()))
            .collect();
        actions.sort();
        assert_eq!(
            actions,
            vec![Action::Width, Action::Height, Action::Graft, Action::Goal]
        );

        set.clear_caches();
        assert!(!set.is_built());
        assert_eq!(set.num_states(), 4);
    }

    #[test]
    fn build_left_recursion_terminates() {
        let rules = RuleSet::define(|b| {
            let a = b.literal("a");
            let s = b.non_terminal("S")?;
            let s1 = b.non_terminal("S1")?;
            b.choice(s, ChoiceKind::LongestPriority, [a, s1])?;
            b.concatenation(s1, [s, a])
        })
        .unwrap();
        let s = rules.find_runtime_rule("S").unwrap().number();
        let mut set = ParserStateSet::new(Arc::new(rules), s, false).unwrap();
        set.build().unwrap();
        eprintln!("{}", set);
        assert!(set.states().any(|state| state.is_goal()));
    }
}
