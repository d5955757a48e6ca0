use super::{ParserStateSet, Transition};
use crate::{rule::RuleNumber, rule_position::RulePosition, types::Map, util::display_fn};
use std::fmt;

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct StateNumber {
    raw: u32,
}

impl StateNumber {
    #[inline]
    pub(crate) const fn new(raw: u32) -> Self {
        Self { raw }
    }

    #[inline]
    pub const fn into_raw(self) -> u32 {
        self.raw
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.raw as usize
    }
}

impl fmt::Debug for StateNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S#{:03}", self.raw)
    }
}

/// A set of rule positions with the transitions derived from it so far.
///
/// Either every position is at the end of its rule (a completed state,
/// always a single position) or none is (a frame state).
#[derive(Debug)]
pub struct ParserState {
    pub(super) number: StateNumber,
    pub(super) rule_positions: Vec<RulePosition>,
    pub(super) transitions: Map<Option<StateNumber>, Vec<Transition>>,
}

impl ParserState {
    pub fn number(&self) -> StateNumber {
        self.number
    }

    /// Sorted and free of duplicates.
    pub fn rule_positions(&self) -> &[RulePosition] {
        &self.rule_positions
    }

    pub fn is_completed(&self) -> bool {
        self.rule_positions.iter().all(|rp| rp.is_at_end())
    }

    pub fn is_frame(&self) -> bool {
        self.rule_positions.iter().all(|rp| !rp.is_at_end())
    }

    /// Whether this is the completed goal state `{G@END}`.
    pub fn is_goal(&self) -> bool {
        matches!(&self.rule_positions[..], [rp] if rp.rule() == RuleNumber::GOAL && rp.is_at_end())
    }

    /// Every `(previous, transitions)` pair derived so far.
    pub fn transitions_cache(
        &self,
    ) -> impl Iterator<Item = (Option<StateNumber>, &[Transition])> + '_ {
        self.transitions
            .iter()
            .map(|(previous, transitions)| (*previous, transitions.as_slice()))
    }

    pub fn display<'a>(&'a self, set: &'a ParserStateSet) -> impl fmt::Display + 'a {
        display_fn(move |f| {
            write!(f, "{:?} [", self.number)?;
            for (i, rp) in self.rule_positions.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}", set.display_position(rp))?;
            }
            f.write_str("]")?;
            for (previous, transitions) in &self.transitions {
                match previous {
                    Some(previous) => write!(f, "\n  after {:?}:", previous)?,
                    None => f.write_str("\n  at bottom:")?,
                }
                for transition in transitions {
                    write!(f, "\n    {}", transition.display(set))?;
                }
            }
            Ok(())
        })
    }
}
