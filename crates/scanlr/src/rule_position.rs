//! Positions inside the right-hand side of a rule.

use crate::{
    rule::{Rhs, RuleNumber, RuntimeRule},
    rule_set::RuleSetError,
    util::display_fn,
};
use std::fmt;

/// Ordinal inside one option of a rule.
///
/// For concatenations this is the index of the next item. For lists it is
/// a saturating repetition ordinal, see [`Multiplicity`].
///
/// [`Multiplicity`]: crate::rule::Multiplicity
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Position {
    raw: u32,
}

impl Position {
    pub const START_OF_RULE: Self = Self::new(0);
    pub const END_OF_RULE: Self = Self::new(u32::MAX);

    /// Position of a multi after its first item.
    pub const POSITION_MULTI_ITEM: Self = Self::new(1);
    /// Position of a separated list expecting its first separator.
    pub const POSITION_SLIST_SEPARATOR: Self = Self::new(1);
    /// Position of a separated list expecting its second item.
    pub const POSITION_SLIST_ITEM: Self = Self::new(2);

    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self { raw }
    }

    #[inline]
    pub const fn ordinal(self) -> u32 {
        self.raw
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::END_OF_RULE => f.write_str("END"),
            Self { raw } => write!(f, "{}", raw),
        }
    }
}

/// A point inside a rule's right-hand side: `(rule, option, position)`.
///
/// The option selects the alternative for choices and distinguishes the
/// item path from the empty path for lists.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RulePosition {
    rule: RuleNumber,
    option: u32,
    position: Position,
}

impl RulePosition {
    pub const OPTION_NONE: u32 = 0;
    pub const OPTION_MULTI_ITEM: u32 = 0;
    pub const OPTION_MULTI_EMPTY: u32 = 1;
    pub const OPTION_SLIST_ITEM_OR_SEPARATOR: u32 = 0;
    pub const OPTION_SLIST_EMPTY: u32 = 1;

    pub const fn new(rule: RuleNumber, option: u32, position: Position) -> Self {
        Self {
            rule,
            option,
            position,
        }
    }

    pub fn rule(&self) -> RuleNumber {
        self.rule
    }

    pub fn option(&self) -> u32 {
        self.option
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn is_at_start(&self) -> bool {
        self.position == Position::START_OF_RULE
    }

    pub fn is_at_end(&self) -> bool {
        self.position == Position::END_OF_RULE
    }

    /// The same rule and option, moved to the end.
    pub fn at_end(&self) -> Self {
        self.with_position(Position::END_OF_RULE)
    }

    fn with_position(&self, position: Position) -> Self {
        Self { position, ..*self }
    }

    fn check_rule(&self, rule: &RuntimeRule) -> Result<(), RuleSetError> {
        if rule.number() != self.rule {
            return Err(RuleSetError::InternalInvariant {
                msg: format!(
                    "rule position {:?} queried with rule `{}` ({:?})",
                    self,
                    rule.tag(),
                    rule.number()
                ),
            });
        }
        Ok(())
    }

    /// Items expected at this position. Empty at the end of the rule.
    pub fn items<'r>(&self, rule: &'r RuntimeRule) -> Result<&'r [RuleNumber], RuleSetError> {
        self.check_rule(rule)?;
        rule.items_at(self.option, self.position)
    }

    /// Positions reachable after consuming the item at this position.
    ///
    /// A position may have two successors: a list can either take another
    /// item (or separator) or finish.
    pub fn next(&self, rule: &RuntimeRule) -> Result<Vec<RulePosition>, RuleSetError> {
        self.check_rule(rule)?;
        if self.is_at_end() {
            return Ok(vec![]);
        }
        // Reject positions that do not exist in this rule.
        rule.items_at(self.option, self.position)?;

        let ordinal = self.position.ordinal();
        let next = match rule.rhs() {
            Rhs::Terminal(..) | Rhs::Embedded(..) => {
                return Err(RuleSetError::InternalInvariant {
                    msg: format!("leaf rule {} has no positions", rule.tag()),
                })
            }
            Rhs::Empty { .. } | Rhs::Choice(..) => vec![self.at_end()],
            Rhs::Concatenation(items) => {
                if ordinal as usize + 1 < items.len() {
                    vec![self.with_position(Position::new(ordinal + 1))]
                } else {
                    vec![self.at_end()]
                }
            }
            Rhs::Multi(multi) => {
                if self.option == Self::OPTION_MULTI_EMPTY {
                    return Ok(vec![self.at_end()]);
                }
                let m = &multi.multiplicity;
                let count = ordinal + 1;
                let mut next = Vec::with_capacity(2);
                if m.can_grow_width(count) {
                    next.push(self.with_position(Position::new(m.increment_index(ordinal))));
                }
                if count >= m.min {
                    next.push(self.at_end());
                }
                next
            }
            Rhs::SeparatedList(list) => {
                if self.option == Self::OPTION_SLIST_EMPTY {
                    return Ok(vec![self.at_end()]);
                }
                if ordinal % 2 == 1 {
                    // separator consumed, an item must follow
                    return Ok(vec![self.with_position(Position::new(ordinal + 1))]);
                }
                let m = &list.multiplicity;
                let index = ordinal / 2;
                let count = index + 1;
                let mut next = Vec::with_capacity(2);
                if m.can_grow_width(count) {
                    let separator = m
                        .increment_index(index)
                        .checked_mul(2)
                        .and_then(|ordinal| ordinal.checked_sub(1))
                        .filter(|&ordinal| ordinal < Position::END_OF_RULE.ordinal())
                        .ok_or_else(|| RuleSetError::InternalInvariant {
                            msg: format!("{} has too many list positions", rule.tag()),
                        })?;
                    next.push(self.with_position(Position::new(separator)));
                }
                if count >= m.min {
                    next.push(self.at_end());
                }
                next
            }
        };
        Ok(next)
    }

    pub fn display<'r>(&'r self, rule: &'r RuntimeRule) -> impl fmt::Display + 'r {
        display_fn(move |f| {
            f.write_str(rule.tag())?;
            if self.option != 0 {
                write!(f, "/{}", self.option)?;
            }
            write!(f, "@{:?}", self.position)
        })
    }
}

impl fmt::Debug for RulePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:?},{},{:?})", self.rule, self.option, self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule_set::RuleSet;

    fn lists() -> RuleSet {
        RuleSet::define(|b| {
            let a = b.literal("a");
            let comma = b.literal(",");
            let star = b.non_terminal("star")?;
            b.multi(star, 0, None, a)?;
            let plus3 = b.non_terminal("plus3")?;
            b.multi(plus3, 3, None, a)?;
            let bounded = b.non_terminal("bounded")?;
            b.multi(bounded, 1, Some(2), a)?;
            let slist = b.non_terminal("slist")?;
            b.separated_list(slist, 0, None, a, comma)?;
            let abc = b.non_terminal("abc")?;
            b.concatenation(abc, [a, a, a])?;
            Ok(())
        })
        .unwrap()
    }

    fn rule<'a>(rules: &'a RuleSet, name: &str) -> &'a RuntimeRule {
        rules.find_runtime_rule(name).unwrap()
    }

    fn pos(rule: &RuntimeRule, option: u32, position: u32) -> RulePosition {
        RulePosition::new(rule.number(), option, Position::new(position))
    }

    #[test]
    fn concatenation_advances_to_end() {
        let rules = lists();
        let abc = rule(&rules, "abc");
        assert_eq!(pos(abc, 0, 0).next(abc).unwrap(), vec![pos(abc, 0, 1)]);
        assert_eq!(pos(abc, 0, 2).next(abc).unwrap(), vec![pos(abc, 0, 2).at_end()]);
        assert!(pos(abc, 0, 2).at_end().next(abc).unwrap().is_empty());
        assert!(pos(abc, 0, 3).items(abc).is_err());
    }

    #[test]
    fn unbounded_multi_saturates() {
        let rules = lists();
        let star = rule(&rules, "star");
        let end = pos(star, 0, 0).at_end();
        assert_eq!(
            pos(star, 0, 0).next(star).unwrap(),
            vec![Position::POSITION_MULTI_ITEM, Position::END_OF_RULE]
                .into_iter()
                .map(|p| RulePosition::new(star.number(), 0, p))
                .collect::<Vec<_>>()
        );
        assert_eq!(pos(star, 0, 1).next(star).unwrap(), vec![pos(star, 0, 1), end]);
        assert_eq!(
            pos(star, RulePosition::OPTION_MULTI_EMPTY, 0).next(star).unwrap(),
            vec![pos(star, RulePosition::OPTION_MULTI_EMPTY, 0).at_end()]
        );
        assert_eq!(star.rule_positions().unwrap().len(), 3);
    }

    #[test]
    fn multi_minimum_is_counted() {
        let rules = lists();
        let plus3 = rule(&rules, "plus3");
        assert_eq!(pos(plus3, 0, 0).next(plus3).unwrap(), vec![pos(plus3, 0, 1)]);
        assert_eq!(pos(plus3, 0, 1).next(plus3).unwrap(), vec![pos(plus3, 0, 2)]);
        assert_eq!(
            pos(plus3, 0, 2).next(plus3).unwrap(),
            vec![pos(plus3, 0, 3), pos(plus3, 0, 3).at_end()]
        );
        assert_eq!(
            pos(plus3, 0, 3).next(plus3).unwrap(),
            vec![pos(plus3, 0, 3), pos(plus3, 0, 3).at_end()]
        );
        assert_eq!(plus3.positions_at_start().len(), 1);
    }

    #[test]
    fn bounded_multi_stops_growing() {
        let rules = lists();
        let bounded = rule(&rules, "bounded");
        let end = pos(bounded, 0, 0).at_end();
        assert_eq!(pos(bounded, 0, 0).next(bounded).unwrap(), vec![pos(bounded, 0, 1), end]);
        assert_eq!(pos(bounded, 0, 1).next(bounded).unwrap(), vec![end]);
        assert!(pos(bounded, 0, 2).next(bounded).is_err());
    }

    #[test]
    fn separated_list_alternates() {
        let rules = lists();
        let slist = rule(&rules, "slist");
        let comma = rules.find_terminal_rule(",").unwrap().number();
        let a = rules.find_terminal_rule("a").unwrap().number();
        let end = pos(slist, 0, 0).at_end();

        assert_eq!(pos(slist, 0, 0).items(slist).unwrap(), &[a]);
        assert_eq!(
            pos(slist, 0, 0).next(slist).unwrap(),
            vec![
                RulePosition::new(slist.number(), 0, Position::POSITION_SLIST_SEPARATOR),
                end
            ]
        );
        assert_eq!(pos(slist, 0, 1).items(slist).unwrap(), &[comma]);
        assert_eq!(
            pos(slist, 0, 1).next(slist).unwrap(),
            vec![RulePosition::new(slist.number(), 0, Position::POSITION_SLIST_ITEM)]
        );
        assert_eq!(pos(slist, 0, 2).next(slist).unwrap(), vec![pos(slist, 0, 1), end]);
        assert_eq!(slist.positions_at_start().len(), 2);
    }

    #[test]
    fn foreign_rule_is_rejected() {
        let rules = lists();
        let abc = rule(&rules, "abc");
        let star = rule(&rules, "star");
        assert!(matches!(
            pos(abc, 0, 0).next(star),
            Err(RuleSetError::InternalInvariant { .. })
        ));
    }

    #[test]
    fn leaf_rule_has_no_successors() {
        let rules = lists();
        let a = rules.find_terminal_rule("a").unwrap();
        assert!(pos(a, 0, 0).next(a).is_err());
        assert!(pos(a, 0, 0).at_end().next(a).unwrap().is_empty());
    }

    #[test]
    fn widest_separated_list_stays_below_end() {
        let rules = RuleSet::define(|b| {
            let a = b.literal("a");
            let comma = b.literal(",");
            let wide = b.non_terminal("wide")?;
            b.separated_list(wide, 0, Some(1 << 31), a, comma)
        })
        .unwrap();
        let wide = rule(&rules, "wide");
        let last = (1u32 << 31) - 1;
        let end = pos(wide, 0, 0).at_end();
        assert_eq!(
            pos(wide, 0, 2 * (last - 1)).next(wide).unwrap(),
            vec![pos(wide, 0, 2 * last - 1), end]
        );
        assert_eq!(pos(wide, 0, 2 * last - 1).next(wide).unwrap(), vec![pos(wide, 0, 2 * last)]);
        assert_eq!(pos(wide, 0, 2 * last).next(wide).unwrap(), vec![end]);
    }
}
