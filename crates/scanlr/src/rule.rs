//! Runtime rules: the nodes of a rule set and the shapes of their right-hand sides.

use crate::{
    rule_position::{Position, RulePosition},
    rule_set::{RuleSet, RuleSetError},
    types::Set,
};
use std::{cmp, fmt, slice, sync::Arc};

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct RuleNumber {
    raw: u32,
}

impl RuleNumber {
    /// Reserved terminal that matches the end of the input text.
    pub const END_OF_TEXT: Self = Self::new(0);

    /// Reserved lookahead member that matches any input.
    pub const ANY_LOOKAHEAD: Self = Self::new(1);

    /// Reserved lookahead member standing for "whatever the enclosing
    /// context expects". Substituted by [`LookaheadSet::resolve`].
    ///
    /// [`LookaheadSet::resolve`]: crate::lookahead::LookaheadSet::resolve
    pub const USE_PARENT_LOOKAHEAD: Self = Self::new(2);

    /// The synthetic goal rule owned by each parser state set.
    pub const GOAL: Self = Self::new(u32::MAX);

    pub(crate) const OFFSET: u32 = 3;

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

    /// Whether this number is one of the reserved lookahead sentinels.
    pub fn is_sentinel(self) -> bool {
        self.raw < Self::OFFSET
    }
}

impl fmt::Debug for RuleNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::END_OF_TEXT => f.write_str("R#EOT"),
            Self::ANY_LOOKAHEAD => f.write_str("R#ANY"),
            Self::USE_PARENT_LOOKAHEAD => f.write_str("R#UP"),
            Self::GOAL => f.write_str("R#GOAL"),
            Self { raw } => write!(f, "R#{:03}", raw),
        }
    }
}

/// What a terminal rule matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Terminal {
    /// A literal string.
    Literal(String),
    /// A regular expression, anchored at the current position when matched.
    Pattern(String),
    /// The zero-width terminal standing for an empty alternative.
    Empty,
    EndOfText,
    AnyLookahead,
    UseParentLookahead,
}

/// Disambiguation policy recorded on a choice. Automaton construction
/// treats every kind the same way.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ChoiceKind {
    Ambiguous,
    LongestPriority,
    PriorityLongest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub kind: ChoiceKind,
    pub alternatives: Vec<RuleNumber>,
}

/// Bounds on the number of items in a list.
///
/// Positions inside a list are repetition ordinals which stop growing at
/// the saturation point, so an unbounded list only ever needs a finite
/// number of distinct positions.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Multiplicity {
    pub min: u32,
    /// `None` means unbounded.
    pub max: Option<u32>,
}

impl Multiplicity {
    pub const fn new(min: u32, max: Option<u32>) -> Self {
        Self { min, max }
    }

    /// Whether another item may follow once `count` items have been matched.
    pub fn can_grow_width(&self, count: u32) -> bool {
        self.max.map_or(true, |max| count < max)
    }

    /// The ordinal following `index`, clamped at the saturation point.
    pub fn increment_index(&self, index: u32) -> u32 {
        cmp::min(index.saturating_add(1), self.saturation())
    }

    /// The largest ordinal a list position can take.
    pub fn saturation(&self) -> u32 {
        match self.max {
            None => cmp::max(self.min, 1),
            Some(max) => max.saturating_sub(1),
        }
    }

    /// Check the bounds of a list taking `stride` positions per item (1 for
    /// a multi, 2 for a separated list).
    pub(crate) fn validate(&self, stride: u32) -> Result<(), String> {
        match self.max {
            Some(0) => return Err("the maximum number of items must be at least 1".into()),
            Some(max) if max < self.min => {
                return Err(format!(
                    "the minimum number of items ({}) exceeds the maximum ({})",
                    self.min, max
                ))
            }
            _ => (),
        }
        // The last ordinal must stay below END_OF_RULE.
        match self.saturation().checked_mul(stride) {
            Some(last) if last < Position::END_OF_RULE.ordinal() => Ok(()),
            _ => Err(format!("the bounds {} are too large", self)),
        }
    }
}

impl fmt::Display for Multiplicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) => write!(f, "{}..{}", self.min, max),
            None => write!(f, "{}..", self.min),
        }
    }
}

/// `item*` style repetition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Multi {
    pub multiplicity: Multiplicity,
    pub item: RuleNumber,
    /// Empty terminal used by the zero-items option, present when `min == 0`.
    pub empty: Option<RuleNumber>,
}

/// `item (separator item)*` style repetition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeparatedList {
    pub multiplicity: Multiplicity,
    pub item: RuleNumber,
    pub separator: RuleNumber,
    pub empty: Option<RuleNumber>,
}

/// Reference to the goal of a separately defined rule set.
#[derive(Clone)]
pub struct Embedded {
    pub rule_set: Arc<RuleSet>,
    pub start: RuleNumber,
}

impl fmt::Debug for Embedded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Embedded")
            .field("rule_set", &self.rule_set.number())
            .field("start", &self.start)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum Rhs {
    Terminal(Terminal),
    /// Matches nothing; `empty` is the rule's own empty terminal.
    Empty {
        empty: RuleNumber,
    },
    Concatenation(Vec<RuleNumber>),
    Choice(Choice),
    Multi(Multi),
    SeparatedList(SeparatedList),
    Embedded(Embedded),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RuleKind {
    Terminal,
    NonTerminal,
    Goal,
    Embedded,
}

#[derive(Debug, Clone)]
pub struct RuntimeRule {
    pub(crate) rule_set: u32,
    pub(crate) number: RuleNumber,
    pub(crate) tag: String,
    pub(crate) is_skip: bool,
    pub(crate) rhs: Rhs,
}

impl RuntimeRule {
    /// The synthetic goal rule `G = user_goal`.
    pub(crate) fn goal(rule_set: u32, user_goal: RuleNumber, user_goal_tag: &str) -> Self {
        Self {
            rule_set,
            number: RuleNumber::GOAL,
            tag: format!("<GOAL {}>", user_goal_tag),
            is_skip: false,
            rhs: Rhs::Concatenation(vec![user_goal]),
        }
    }

    pub fn rule_set(&self) -> u32 {
        self.rule_set
    }

    pub fn number(&self) -> RuleNumber {
        self.number
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn is_skip(&self) -> bool {
        self.is_skip
    }

    pub fn rhs(&self) -> &Rhs {
        &self.rhs
    }

    pub fn kind(&self) -> RuleKind {
        match self.rhs {
            Rhs::Terminal(..) => RuleKind::Terminal,
            Rhs::Embedded(..) => RuleKind::Embedded,
            _ if self.number == RuleNumber::GOAL => RuleKind::Goal,
            _ => RuleKind::NonTerminal,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.rhs, Rhs::Terminal(..))
    }

    pub fn is_empty_terminal(&self) -> bool {
        matches!(self.rhs, Rhs::Terminal(Terminal::Empty))
    }

    pub fn is_pattern(&self) -> bool {
        matches!(self.rhs, Rhs::Terminal(Terminal::Pattern(..)))
    }

    pub fn is_embedded(&self) -> bool {
        matches!(self.rhs, Rhs::Embedded(..))
    }

    /// Terminals and embedded references are consumed in one step by the
    /// automaton, so they have no positions of their own.
    pub fn is_leaf(&self) -> bool {
        self.is_terminal() || self.is_embedded()
    }

    pub fn terminal(&self) -> Option<&Terminal> {
        match &self.rhs {
            Rhs::Terminal(terminal) => Some(terminal),
            _ => None,
        }
    }

    pub fn embedded(&self) -> Option<&Embedded> {
        match &self.rhs {
            Rhs::Embedded(embedded) => Some(embedded),
            _ => None,
        }
    }

    /// The rule positions from which a match of this rule begins, one per
    /// option.
    pub fn positions_at_start(&self) -> Vec<RulePosition> {
        let start = |option| RulePosition::new(self.number, option, Position::START_OF_RULE);
        match &self.rhs {
            Rhs::Terminal(..) | Rhs::Embedded(..) => vec![],
            Rhs::Empty { .. } | Rhs::Concatenation(..) => vec![start(RulePosition::OPTION_NONE)],
            Rhs::Choice(choice) => (0..choice.alternatives.len() as u32).map(start).collect(),
            Rhs::Multi(Multi { empty, .. }) => {
                let mut positions = vec![start(RulePosition::OPTION_MULTI_ITEM)];
                if empty.is_some() {
                    positions.push(start(RulePosition::OPTION_MULTI_EMPTY));
                }
                positions
            }
            Rhs::SeparatedList(SeparatedList { empty, .. }) => {
                let mut positions = vec![start(RulePosition::OPTION_SLIST_ITEM_OR_SEPARATOR)];
                if empty.is_some() {
                    positions.push(start(RulePosition::OPTION_SLIST_EMPTY));
                }
                positions
            }
        }
    }

    /// Every position of this rule that is not at the end, reachable from
    /// the start positions.
    pub fn rule_positions(&self) -> Result<Vec<RulePosition>, RuleSetError> {
        let mut found = Set::default();
        let mut pending = self.positions_at_start();
        while let Some(rp) = pending.pop() {
            if rp.is_at_end() || found.contains(&rp) {
                continue;
            }
            pending.extend(rp.next(self)?);
            found.insert(rp);
        }
        let mut found: Vec<_> = found.into_iter().collect();
        found.sort_unstable();
        Ok(found)
    }

    /// The items expected at `(option, position)`. Empty at the end of the
    /// rule, otherwise exactly one rule.
    pub fn items_at(&self, option: u32, position: Position) -> Result<&[RuleNumber], RuleSetError> {
        if position == Position::END_OF_RULE {
            return Ok(&[]);
        }
        let ordinal = position.ordinal();
        let found = match &self.rhs {
            Rhs::Terminal(..) | Rhs::Embedded(..) => None,
            Rhs::Empty { empty } => {
                (option == RulePosition::OPTION_NONE && ordinal == 0).then_some(empty)
            }
            Rhs::Concatenation(items) => (option == RulePosition::OPTION_NONE)
                .then(|| items.get(ordinal as usize))
                .flatten(),
            Rhs::Choice(choice) => (ordinal == 0)
                .then(|| choice.alternatives.get(option as usize))
                .flatten(),
            Rhs::Multi(multi) => match option {
                RulePosition::OPTION_MULTI_ITEM => {
                    (ordinal <= multi.multiplicity.saturation()).then_some(&multi.item)
                }
                RulePosition::OPTION_MULTI_EMPTY if ordinal == 0 => multi.empty.as_ref(),
                _ => None,
            },
            Rhs::SeparatedList(list) => match option {
                RulePosition::OPTION_SLIST_ITEM_OR_SEPARATOR => {
                    let saturation = list.multiplicity.saturation();
                    if ordinal % 2 == 0 {
                        (ordinal / 2 <= saturation).then_some(&list.item)
                    } else {
                        ((ordinal + 1) / 2 <= saturation).then_some(&list.separator)
                    }
                }
                RulePosition::OPTION_SLIST_EMPTY if ordinal == 0 => list.empty.as_ref(),
                _ => None,
            },
        };
        found
            .map(slice::from_ref)
            .ok_or_else(|| RuleSetError::InternalInvariant {
                msg: format!(
                    "rule `{}` has no item at option {} position {:?}",
                    self.tag, option, position
                ),
            })
    }

    /// Every rule referenced from the right-hand side.
    pub fn rhs_items(&self) -> Vec<RuleNumber> {
        match &self.rhs {
            Rhs::Terminal(..) | Rhs::Embedded(..) => vec![],
            Rhs::Empty { empty } => vec![*empty],
            Rhs::Concatenation(items) => items.clone(),
            Rhs::Choice(choice) => choice.alternatives.clone(),
            Rhs::Multi(multi) => multi.empty.into_iter().chain([multi.item]).collect(),
            Rhs::SeparatedList(list) => list
                .empty
                .into_iter()
                .chain([list.item, list.separator])
                .collect(),
        }
    }
}
