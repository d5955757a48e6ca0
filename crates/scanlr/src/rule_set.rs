//! Rule sets and their builder.

use crate::{
    digraph::digraph,
    lookahead::TerminalSet,
    rule::{
        Choice, ChoiceKind, Embedded, Multi, Multiplicity, Rhs, RuleNumber, RuntimeRule,
        SeparatedList, Terminal,
    },
    types::{Map, Set},
    util::display_fn,
};
use bit_set::BitSet;
use std::{
    fmt,
    marker::PhantomData,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
};

static NEXT_RULE_SET_NUMBER: AtomicU32 = AtomicU32::new(0);

/// An immutable, numbered collection of runtime rules.
///
/// Rule numbers index into the rule list. The first few numbers are the
/// reserved lookahead sentinels.
#[derive(Debug)]
pub struct RuleSet {
    number: u32,
    rules: Vec<RuntimeRule>,
    non_terminals: Map<String, RuleNumber>,
    terminals: Map<Terminal, RuleNumber>,
    skip_goal: Option<RuleNumber>,
    nullable: BitSet,
    first_terminals: Vec<TerminalSet>,
}

impl RuleSet {
    /// Define a rule set using the specified function.
    pub fn define<F>(f: F) -> Result<Self, RuleSetError>
    where
        F: FnOnce(&mut RuleSetDef) -> Result<(), RuleSetError>,
    {
        let mut def = RuleSetDef {
            number: NEXT_RULE_SET_NUMBER.fetch_add(1, Ordering::Relaxed),
            rules: vec![],
            non_terminals: Map::default(),
            terminals: Map::default(),
            _marker: PhantomData,
        };

        for (number, tag, terminal) in [
            (RuleNumber::END_OF_TEXT, "<EOT>", Terminal::EndOfText),
            (RuleNumber::ANY_LOOKAHEAD, "<ANY>", Terminal::AnyLookahead),
            (RuleNumber::USE_PARENT_LOOKAHEAD, "<UP>", Terminal::UseParentLookahead),
        ] {
            let pushed = def.push(tag.into(), Some(Rhs::Terminal(terminal)));
            debug_assert_eq!(pushed, number);
        }

        f(&mut def)?;

        def.end()
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn rules(&self) -> &[RuntimeRule] {
        &self.rules
    }

    pub fn rule(&self, number: RuleNumber) -> Result<&RuntimeRule, RuleSetError> {
        self.rules
            .get(number.index())
            .ok_or_else(|| RuleSetError::RuleNotFound {
                name: format!("{:?}", number),
            })
    }

    /// Look up a non-terminal or embedded rule by name.
    pub fn find_runtime_rule(&self, name: &str) -> Result<&RuntimeRule, RuleSetError> {
        match self.non_terminals.get(name) {
            Some(&number) => self.rule(number),
            None => Err(RuleSetError::RuleNotFound { name: name.into() }),
        }
    }

    /// Look up a terminal by its literal value or pattern text, literals first.
    pub fn find_terminal_rule(&self, pattern: &str) -> Result<&RuntimeRule, RuleSetError> {
        let literal = Terminal::Literal(pattern.into());
        let regex = Terminal::Pattern(pattern.into());
        match self
            .terminals
            .get(&literal)
            .or_else(|| self.terminals.get(&regex))
        {
            Some(&number) => self.rule(number),
            None => Err(RuleSetError::RuleNotFound {
                name: pattern.into(),
            }),
        }
    }

    /// Goal of the skip automaton, present when some rules are marked as skip.
    pub fn skip_goal(&self) -> Option<RuleNumber> {
        self.skip_goal
    }

    /// Whether the rule can match the empty string.
    pub fn is_nullable(&self, number: RuleNumber) -> bool {
        self.nullable.contains(number.index())
    }

    /// Terminals and embedded rules that can begin a match of the rule.
    /// Zero-width terminals are never included.
    pub fn first_terminals(&self, number: RuleNumber) -> Result<&TerminalSet, RuleSetError> {
        self.first_terminals
            .get(number.index())
            .ok_or_else(|| RuleSetError::RuleNotFound {
                name: format!("{:?}", number),
            })
    }

    pub fn display_rule(&self, number: RuleNumber) -> impl fmt::Display + '_ {
        display_fn(move |f| match self.rules.get(number.index()) {
            Some(rule) => f.write_str(rule.tag()),
            None if number == RuleNumber::GOAL => f.write_str("<GOAL>"),
            None => write!(f, "{:?}", number),
        })
    }
}

impl fmt::Display for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "## rule set #{}", self.number)?;
        for rule in &self.rules[RuleNumber::OFFSET as usize..] {
            write!(f, "{} ::= ", rule.tag())?;
            let items = |f: &mut fmt::Formatter<'_>, items: &[RuleNumber], sep: &str| -> fmt::Result {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(sep)?;
                    }
                    write!(f, "{}", self.display_rule(*item))?;
                }
                Ok(())
            };
            match rule.rhs() {
                Rhs::Terminal(Terminal::Empty) => f.write_str("<empty terminal>")?,
                Rhs::Terminal(..) => f.write_str("<terminal>")?,
                Rhs::Empty { .. } => f.write_str("<empty>")?,
                Rhs::Concatenation(seq) => items(f, seq, " ")?,
                Rhs::Choice(choice) => {
                    write!(f, "({:?}) ", choice.kind)?;
                    items(f, &choice.alternatives, " | ")?;
                }
                Rhs::Multi(multi) => write!(
                    f,
                    "[{}]{{{}}}",
                    self.display_rule(multi.item),
                    multi.multiplicity
                )?,
                Rhs::SeparatedList(list) => write!(
                    f,
                    "[{} / {}]{{{}}}",
                    self.display_rule(list.item),
                    self.display_rule(list.separator),
                    list.multiplicity
                )?,
                Rhs::Embedded(embedded) => write!(
                    f,
                    "<embedded #{}::{}>",
                    embedded.rule_set.number(),
                    embedded.rule_set.display_rule(embedded.start)
                )?,
            }
            if rule.is_skip() {
                f.write_str(" (skip)")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Repetition shapes accepted by [`RuleSetDef::list`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ListKind {
    Multi,
    SeparatedList,
    Unordered,
    LeftAssociative,
    RightAssociative,
}

#[derive(Debug)]
struct RuleDef {
    tag: String,
    is_skip: bool,
    rhs: Option<Rhs>,
}

/// The contextual values for building a `RuleSet`.
#[derive(Debug)]
pub struct RuleSetDef<'def> {
    number: u32,
    rules: Vec<RuleDef>,
    non_terminals: Map<String, RuleNumber>,
    terminals: Map<Terminal, RuleNumber>,
    _marker: PhantomData<&'def mut ()>,
}

impl<'def> RuleSetDef<'def> {
    fn push(&mut self, tag: String, rhs: Option<Rhs>) -> RuleNumber {
        let number = RuleNumber::new(self.rules.len() as u32);
        self.rules.push(RuleDef {
            tag,
            is_skip: false,
            rhs,
        });
        number
    }

    fn terminal(&mut self, tag: String, terminal: Terminal) -> RuleNumber {
        if let Some(&number) = self.terminals.get(&terminal) {
            return number;
        }
        let number = self.push(tag, Some(Rhs::Terminal(terminal.clone())));
        self.terminals.insert(terminal, number);
        number
    }

    /// Declare a terminal matching `value` literally. Declaring the same
    /// literal twice returns the same rule.
    pub fn literal(&mut self, value: &str) -> RuleNumber {
        self.terminal(format!("'{}'", value), Terminal::Literal(value.into()))
    }

    /// Declare a terminal matching the regular expression `pattern`.
    pub fn pattern(&mut self, pattern: &str) -> RuleNumber {
        self.terminal(format!("{:?}", pattern), Terminal::Pattern(pattern.into()))
    }

    /// Declare a non-terminal. Its right-hand side is given later by one
    /// of the shape methods.
    pub fn non_terminal(&mut self, name: &str) -> Result<RuleNumber, RuleSetError> {
        self.declare_name(name)?;
        let number = self.push(name.into(), None);
        self.non_terminals.insert(name.into(), number);
        Ok(number)
    }

    /// Mark a rule as skip: it is matched between terminals by the skip
    /// automaton instead of appearing in the grammar.
    pub fn skip(&mut self, rule: RuleNumber) -> Result<(), RuleSetError> {
        self.check_item(rule)?;
        self.rules[rule.index()].is_skip = true;
        Ok(())
    }

    /// Declare a rule that matches the goal `start` of another rule set.
    pub fn embedded(
        &mut self,
        name: &str,
        rule_set: Arc<RuleSet>,
        start: RuleNumber,
    ) -> Result<RuleNumber, RuleSetError> {
        let target = rule_set.rule(start)?;
        if start.is_sentinel() {
            return Err(RuleSetError::InvalidRule {
                rule: name.into(),
                msg: format!("cannot embed the reserved rule `{}`", target.tag()),
            });
        }
        self.declare_name(name)?;
        let number = self.push(
            name.into(),
            Some(Rhs::Embedded(Embedded { rule_set, start })),
        );
        self.non_terminals.insert(name.into(), number);
        Ok(number)
    }

    pub fn empty(&mut self, rule: RuleNumber) -> Result<(), RuleSetError> {
        self.check_unset(rule)?;
        let empty = self.empty_terminal(rule);
        self.set_rhs(rule, Rhs::Empty { empty })
    }

    pub fn concatenation<I>(&mut self, rule: RuleNumber, items: I) -> Result<(), RuleSetError>
    where
        I: IntoIterator<Item = RuleNumber>,
    {
        let items: Vec<_> = items.into_iter().collect();
        self.check_unset(rule)?;
        self.check_items(rule, &items)?;
        self.set_rhs(rule, Rhs::Concatenation(items))
    }

    pub fn choice<I>(
        &mut self,
        rule: RuleNumber,
        kind: ChoiceKind,
        alternatives: I,
    ) -> Result<(), RuleSetError>
    where
        I: IntoIterator<Item = RuleNumber>,
    {
        let alternatives: Vec<_> = alternatives.into_iter().collect();
        self.check_unset(rule)?;
        self.check_items(rule, &alternatives)?;
        self.set_rhs(rule, Rhs::Choice(Choice { kind, alternatives }))
    }

    pub fn multi(
        &mut self,
        rule: RuleNumber,
        min: u32,
        max: Option<u32>,
        item: RuleNumber,
    ) -> Result<(), RuleSetError> {
        let multiplicity = self.check_list(rule, min, max, &[item])?;
        let empty = (min == 0).then(|| self.empty_terminal(rule));
        self.set_rhs(
            rule,
            Rhs::Multi(Multi {
                multiplicity,
                item,
                empty,
            }),
        )
    }

    pub fn separated_list(
        &mut self,
        rule: RuleNumber,
        min: u32,
        max: Option<u32>,
        item: RuleNumber,
        separator: RuleNumber,
    ) -> Result<(), RuleSetError> {
        let multiplicity = self.check_list(rule, min, max, &[item, separator])?;
        let empty = (min == 0).then(|| self.empty_terminal(rule));
        self.set_rhs(
            rule,
            Rhs::SeparatedList(SeparatedList {
                multiplicity,
                item,
                separator,
                empty,
            }),
        )
    }

    /// Generic list entry point. Only plain and separated lists are
    /// supported.
    pub fn list(
        &mut self,
        rule: RuleNumber,
        kind: ListKind,
        min: u32,
        max: Option<u32>,
        item: RuleNumber,
        separator: Option<RuleNumber>,
    ) -> Result<(), RuleSetError> {
        match (kind, separator) {
            (ListKind::Multi, None) => self.multi(rule, min, max, item),
            (ListKind::SeparatedList, Some(separator)) => {
                self.separated_list(rule, min, max, item, separator)
            }
            (ListKind::Multi, Some(..)) | (ListKind::SeparatedList, None) => {
                Err(RuleSetError::InvalidRule {
                    rule: self.tag(rule),
                    msg: format!("{:?} list with mismatched separator", kind),
                })
            }
            (ListKind::Unordered | ListKind::LeftAssociative | ListKind::RightAssociative, _) => {
                Err(RuleSetError::UnsupportedRuleShape {
                    rule: self.tag(rule),
                    shape: format!("{:?}", kind),
                })
            }
        }
    }

    fn tag(&self, rule: RuleNumber) -> String {
        self.rules
            .get(rule.index())
            .map_or_else(|| format!("{:?}", rule), |def| def.tag.clone())
    }

    fn declare_name(&self, name: &str) -> Result<(), RuleSetError> {
        if !verify_ident(name) {
            return Err(RuleSetError::InvalidRule {
                rule: name.into(),
                msg: "incorrect rule name".into(),
            });
        }
        if self.non_terminals.contains_key(name) {
            return Err(RuleSetError::InvalidRule {
                rule: name.into(),
                msg: "the name has already been declared".into(),
            });
        }
        Ok(())
    }

    fn empty_terminal(&mut self, rule: RuleNumber) -> RuleNumber {
        let tag = format!("§empty.{}", self.tag(rule));
        self.push(tag, Some(Rhs::Terminal(Terminal::Empty)))
    }

    fn check_item(&self, item: RuleNumber) -> Result<(), RuleSetError> {
        if item.is_sentinel() || item.index() >= self.rules.len() {
            return Err(RuleSetError::RuleNotFound {
                name: format!("{:?}", item),
            });
        }
        Ok(())
    }

    fn check_items(&self, rule: RuleNumber, items: &[RuleNumber]) -> Result<(), RuleSetError> {
        if items.is_empty() {
            return Err(RuleSetError::InvalidRule {
                rule: self.tag(rule),
                msg: "the right-hand side has no items".into(),
            });
        }
        items.iter().try_for_each(|&item| self.check_item(item))
    }

    fn check_unset(&self, rule: RuleNumber) -> Result<(), RuleSetError> {
        self.check_item(rule)?;
        let def = &self.rules[rule.index()];
        if !self.non_terminals.contains_key(&def.tag) {
            return Err(RuleSetError::InvalidRule {
                rule: def.tag.clone(),
                msg: "only non-terminals take a right-hand side".into(),
            });
        }
        if def.rhs.is_some() {
            return Err(RuleSetError::InvalidRule {
                rule: def.tag.clone(),
                msg: "the right-hand side has already been defined".into(),
            });
        }
        Ok(())
    }

    fn check_list(
        &self,
        rule: RuleNumber,
        min: u32,
        max: Option<u32>,
        items: &[RuleNumber],
    ) -> Result<Multiplicity, RuleSetError> {
        self.check_unset(rule)?;
        self.check_items(rule, items)?;
        let multiplicity = Multiplicity::new(min, max);
        multiplicity
            .validate(items.len() as u32)
            .map_err(|msg| RuleSetError::InvalidRule {
                rule: self.tag(rule),
                msg,
            })?;
        Ok(multiplicity)
    }

    fn set_rhs(&mut self, rule: RuleNumber, rhs: Rhs) -> Result<(), RuleSetError> {
        self.check_item(rule)?;
        self.rules[rule.index()].rhs = Some(rhs);
        Ok(())
    }

    /// Synthesize `§skip = [§skip.choice]{1..}` over the skip rules that
    /// are not referenced by other skip rules.
    fn synthesize_skip_goal(&mut self) -> Option<RuleNumber> {
        let skips: Vec<RuleNumber> = (0..self.rules.len() as u32)
            .map(RuleNumber::new)
            .filter(|rule| self.rules[rule.index()].is_skip)
            .collect();
        if skips.is_empty() {
            return None;
        }
        let mut referenced = Set::default();
        for &rule in &skips {
            if let Some(rhs) = &self.rules[rule.index()].rhs {
                let shape = RuntimeRule {
                    rule_set: self.number,
                    number: rule,
                    tag: String::new(),
                    is_skip: true,
                    rhs: rhs.clone(),
                };
                referenced.extend(shape.rhs_items());
            }
        }
        let mut tops: Vec<_> = skips
            .iter()
            .copied()
            .filter(|rule| !referenced.contains(rule))
            .collect();
        if tops.is_empty() {
            tops = skips;
        }

        let choice = self.push(
            "§skip.choice".into(),
            Some(Rhs::Choice(Choice {
                kind: ChoiceKind::LongestPriority,
                alternatives: tops,
            })),
        );
        let multi = self.push(
            "§skip".into(),
            Some(Rhs::Multi(Multi {
                multiplicity: Multiplicity::new(1, None),
                item: choice,
                empty: None,
            })),
        );
        for rule in [choice, multi] {
            self.rules[rule.index()].is_skip = true;
        }
        Some(multi)
    }

    fn end(mut self) -> Result<RuleSet, RuleSetError> {
        if let Some(def) = self.rules.iter().find(|def| def.rhs.is_none()) {
            return Err(RuleSetError::InvalidRule {
                rule: def.tag.clone(),
                msg: "the right-hand side is not defined".into(),
            });
        }

        let skip_goal = self.synthesize_skip_goal();

        let number = self.number;
        let rules: Vec<RuntimeRule> = self
            .rules
            .into_iter()
            .enumerate()
            .filter_map(|(i, def)| {
                Some(RuntimeRule {
                    rule_set: number,
                    number: RuleNumber::new(i as u32),
                    tag: def.tag,
                    is_skip: def.is_skip,
                    rhs: def.rhs?,
                })
            })
            .collect();

        let nullable = compute_nullable(&rules);
        let first_terminals = compute_first_terminals(&rules, &nullable)?;

        tracing::trace!(
            rule_set = number,
            num_rules = rules.len(),
            "rule set defined"
        );

        Ok(RuleSet {
            number,
            rules,
            non_terminals: self.non_terminals,
            terminals: self.terminals,
            skip_goal,
            nullable,
            first_terminals,
        })
    }
}

fn compute_nullable(rules: &[RuntimeRule]) -> BitSet {
    let mut nullable = BitSet::new();
    loop {
        let mut changed = false;
        for rule in rules {
            if nullable.contains(rule.number.index()) {
                continue;
            }
            let is = |item: &RuleNumber| nullable.contains(item.index());
            let found = match &rule.rhs {
                Rhs::Terminal(Terminal::Empty) | Rhs::Empty { .. } => true,
                Rhs::Terminal(..) | Rhs::Embedded(..) => false,
                Rhs::Concatenation(items) => items.iter().all(is),
                Rhs::Choice(choice) => choice.alternatives.iter().any(is),
                Rhs::Multi(multi) => multi.multiplicity.min == 0 || is(&multi.item),
                Rhs::SeparatedList(list) => {
                    list.multiplicity.min == 0
                        || (is(&list.item) && (list.multiplicity.min == 1 || is(&list.separator)))
                }
            };
            if found {
                nullable.insert(rule.number.index());
                changed = true;
            }
        }
        if !changed {
            return nullable;
        }
    }
}

/// Items that can be consumed first from any start position of `rule`,
/// looking through nullable items.
fn leading_items(rule: &RuntimeRule, nullable: &BitSet) -> Result<Vec<RuleNumber>, RuleSetError> {
    let mut leading = vec![];
    let mut visited = Set::default();
    let mut pending = rule.positions_at_start();
    while let Some(rp) = pending.pop() {
        if rp.is_at_end() || !visited.insert(rp) {
            continue;
        }
        for &item in rp.items(rule)? {
            if !leading.contains(&item) {
                leading.push(item);
            }
            if nullable.contains(item.index()) {
                pending.extend(rp.next(rule)?);
            }
        }
    }
    Ok(leading)
}

fn compute_first_terminals(
    rules: &[RuntimeRule],
    nullable: &BitSet,
) -> Result<Vec<TerminalSet>, RuleSetError> {
    let mut leading: Map<RuleNumber, Vec<RuleNumber>> = Map::default();
    let mut first: Map<RuleNumber, TerminalSet> = Map::default();
    for rule in rules {
        let mut initial = TerminalSet::default();
        if (rule.is_terminal() && !rule.is_empty_terminal()) || rule.is_embedded() {
            initial.insert(rule.number);
        }
        first.insert(rule.number, initial);
        leading.insert(rule.number, leading_items(rule, nullable)?);
    }

    digraph(&mut first, |rule| {
        leading.get(rule).cloned().unwrap_or_default()
    });

    Ok(first.into_values().collect())
}

#[derive(Debug, thiserror::Error)]
pub enum RuleSetError {
    #[error("rule `{}` not found", name)]
    RuleNotFound { name: String },

    #[error("invalid rule `{}`: {}", rule, msg)]
    InvalidRule { rule: String, msg: String },

    #[error("unsupported rule shape {} for `{}`", shape, rule)]
    UnsupportedRuleShape { rule: String, shape: String },

    #[error("internal invariant violated: {}", msg)]
    InternalInvariant { msg: String },
}

fn verify_ident(s: &str) -> bool {
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        // The name must not be empty.
        return false;
    };
    (first == '_' || unicode_ident::is_xid_start(first)) && chars.all(unicode_ident::is_xid_continue)
}
