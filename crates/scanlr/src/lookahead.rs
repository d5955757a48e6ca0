//! Lookahead sets and their interning table.

use crate::{
    rule::RuleNumber,
    types::Map,
};
use bit_set::BitSet;
use std::{fmt, hash::Hash};

/// A set of rule numbers used as lookahead: terminals, embedded rules and
/// the reserved sentinels.
#[derive(Clone, Default)]
pub struct TerminalSet {
    inner: BitSet,
}

impl TerminalSet {
    pub fn contains(&self, rule: RuleNumber) -> bool {
        self.inner.contains(rule.index())
    }

    pub fn insert(&mut self, rule: RuleNumber) -> bool {
        self.inner.insert(rule.index())
    }

    pub fn remove(&mut self, rule: RuleNumber) -> bool {
        self.inner.remove(rule.index())
    }

    pub fn union_with(&mut self, other: &Self) {
        self.inner.union_with(&other.inner);
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = RuleNumber> + '_ {
        self.inner.iter().map(|raw| RuleNumber::new(raw as u32))
    }

    pub fn includes_up(&self) -> bool {
        self.contains(RuleNumber::USE_PARENT_LOOKAHEAD)
    }

    pub fn includes_any(&self) -> bool {
        self.contains(RuleNumber::ANY_LOOKAHEAD)
    }
}

// BitSet equality depends on the capacity of the underlying vector, so
// compare and hash by members instead.
impl PartialEq for TerminalSet {
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}

impl Eq for TerminalSet {}

impl Hash for TerminalSet {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        for rule in self.iter() {
            rule.hash(state);
        }
    }
}

impl fmt::Debug for TerminalSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<RuleNumber> for TerminalSet {
    fn from_iter<I: IntoIterator<Item = RuleNumber>>(iter: I) -> Self {
        let mut set = Self::default();
        for rule in iter {
            set.insert(rule);
        }
        set
    }
}

impl crate::digraph::Set for TerminalSet {
    fn union_with(&mut self, other: &Self) {
        TerminalSet::union_with(self, other)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct LookaheadNumber {
    raw: u32,
}

impl LookaheadNumber {
    pub const EMPTY: Self = Self::new(0);
    pub const ANY: Self = Self::new(1);
    pub const EOT: Self = Self::new(2);
    pub const UP: Self = Self::new(3);

    const OFFSET: u32 = 4;

    #[inline]
    const fn new(raw: u32) -> Self {
        Self { raw }
    }

    #[inline]
    fn index(self) -> usize {
        self.raw as usize
    }
}

impl fmt::Debug for LookaheadNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::EMPTY => f.write_str("L#EMPTY"),
            Self::ANY => f.write_str("L#ANY"),
            Self::EOT => f.write_str("L#EOT"),
            Self::UP => f.write_str("L#UP"),
            Self { raw } => write!(f, "L#{:03}", raw),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookaheadSet {
    number: LookaheadNumber,
    content: TerminalSet,
}

impl LookaheadSet {
    pub fn number(&self) -> LookaheadNumber {
        self.number
    }

    pub fn content(&self) -> &TerminalSet {
        &self.content
    }

    /// Substitute the `UP` member with the caller's content.
    ///
    /// A set containing `ANY` resolves to `{ANY}`. Fails when both this set
    /// and the caller still contain `UP`.
    pub fn resolve(&self, caller: &LookaheadSet) -> Result<TerminalSet, LookaheadError> {
        if self.content.includes_any() {
            return Ok([RuleNumber::ANY_LOOKAHEAD].into_iter().collect());
        }
        if !self.content.includes_up() {
            return Ok(self.content.clone());
        }
        if caller.content.includes_up() {
            return Err(LookaheadError::UnresolvedUpLookahead);
        }
        let mut resolved = self.content.clone();
        resolved.remove(RuleNumber::USE_PARENT_LOOKAHEAD);
        resolved.union_with(&caller.content);
        Ok(resolved)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LookaheadError {
    #[error("the `UP` lookahead cannot be resolved against a caller that is itself unresolved")]
    UnresolvedUpLookahead,
}

/// Interning table of lookahead sets. Equal contents always get the same
/// number, and the sentinel sets are registered up front.
#[derive(Debug)]
pub struct LookaheadTable {
    sets: Vec<LookaheadSet>,
    index: Map<TerminalSet, LookaheadNumber>,
}

impl Default for LookaheadTable {
    fn default() -> Self {
        Self::new()
    }
}

impl LookaheadTable {
    pub fn new() -> Self {
        let mut table = Self {
            sets: vec![],
            index: Map::default(),
        };
        let sentinels = [
            (LookaheadNumber::EMPTY, None),
            (LookaheadNumber::ANY, Some(RuleNumber::ANY_LOOKAHEAD)),
            (LookaheadNumber::EOT, Some(RuleNumber::END_OF_TEXT)),
            (LookaheadNumber::UP, Some(RuleNumber::USE_PARENT_LOOKAHEAD)),
        ];
        for (expected, member) in sentinels {
            let number = table.create(member.into_iter().collect());
            debug_assert_eq!(number, expected);
        }
        debug_assert_eq!(table.sets.len() as u32, LookaheadNumber::OFFSET);
        table
    }

    /// Intern `content`, returning the number of the existing set when one
    /// with the same members is already registered.
    pub fn create(&mut self, content: TerminalSet) -> LookaheadNumber {
        if let Some(&number) = self.index.get(&content) {
            return number;
        }
        let number = LookaheadNumber::new(self.sets.len() as u32);
        self.index.insert(content.clone(), number);
        self.sets.push(LookaheadSet { number, content });
        number
    }

    /// # Panics
    /// Panics if `number` was not issued by this table.
    pub fn get(&self, number: LookaheadNumber) -> &LookaheadSet {
        &self.sets[number.index()]
    }

    pub fn union(&mut self, a: LookaheadNumber, b: LookaheadNumber) -> LookaheadNumber {
        let mut content = self.get(a).content.clone();
        content.union_with(&self.get(b).content);
        self.create(content)
    }

    pub fn resolve(
        &mut self,
        number: LookaheadNumber,
        caller: LookaheadNumber,
    ) -> Result<LookaheadNumber, LookaheadError> {
        let resolved = self.get(number).resolve(self.get(caller))?;
        Ok(self.create(resolved))
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LookaheadSet> + '_ {
        self.sets.iter()
    }
}
