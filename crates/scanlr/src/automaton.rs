//! Parser automata over rule positions.
//!
//! A [`ParserStateSet`] is built for one goal of one rule set. States are
//! sets of rule positions; transitions out of a state depend on the state
//! that was current before it (the "previous" state), which is what lets a
//! single automaton drive a graph-structured stack. Everything is derived
//! on demand and cached, and [`ParserStateSet::build`] can derive the whole
//! reachable graph ahead of time.

mod build;
mod closure;
mod state;
mod transition;

pub use self::{
    closure::{ClosureItem, ParentRelation},
    state::{ParserState, StateNumber},
    transition::{Action, Transition},
};

use crate::{
    lookahead::{LookaheadError, LookaheadNumber, LookaheadSet, LookaheadTable, TerminalSet},
    rule::{RuleNumber, RuntimeRule},
    rule_position::{Position, RulePosition},
    rule_set::{RuleSet, RuleSetError},
    types::{Map, Set},
    util::{display_fn, write_braced},
};
use std::{
    fmt,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
};

static NEXT_STATE_SET_NUMBER: AtomicU32 = AtomicU32::new(0);

#[derive(Debug)]
pub struct ParserStateSet {
    number: u32,
    rule_set: Arc<RuleSet>,
    user_goal: RuleNumber,
    is_skip: bool,
    goal: RuntimeRule,
    start: StateNumber,
    states: Vec<ParserState>,
    state_index: Map<Vec<RulePosition>, StateNumber>,
    lookaheads: LookaheadTable,
    /// child rule -> positions at which it is referenced
    parent_positions: Map<RuleNumber, Set<RulePosition>>,
    closures: Map<StateNumber, Vec<ClosureItem>>,
    built: bool,
}

impl ParserStateSet {
    /// Create the automaton for `user_goal`. Only the start state exists
    /// until transitions are requested.
    pub fn new(
        rule_set: Arc<RuleSet>,
        user_goal: RuleNumber,
        is_skip: bool,
    ) -> Result<Self, AutomatonError> {
        let user = rule_set.rule(user_goal)?;
        if user_goal.is_sentinel() || user.is_empty_terminal() {
            return Err(RuleSetError::InvalidRule {
                rule: user.tag().into(),
                msg: "cannot be used as a goal".into(),
            }
            .into());
        }
        let goal = RuntimeRule::goal(rule_set.number(), user_goal, user.tag());
        let parent_positions = index_parent_positions(&rule_set, &goal)?;

        let mut set = Self {
            number: NEXT_STATE_SET_NUMBER.fetch_add(1, Ordering::Relaxed),
            rule_set,
            user_goal,
            is_skip,
            goal,
            start: StateNumber::new(0),
            states: vec![],
            state_index: Map::default(),
            lookaheads: LookaheadTable::new(),
            parent_positions,
            closures: Map::default(),
            built: false,
        };
        set.start = set.create_state(vec![RulePosition::new(
            RuleNumber::GOAL,
            RulePosition::OPTION_NONE,
            Position::START_OF_RULE,
        )]);

        tracing::debug!(
            state_set = set.number,
            rule_set = set.rule_set.number(),
            goal = set.goal.tag(),
            is_skip,
            "parser state set created"
        );

        Ok(set)
    }

    /// The automaton recognising the skip rules of `rule_set`, if it has any.
    pub fn for_skip(rule_set: Arc<RuleSet>) -> Result<Option<Self>, AutomatonError> {
        match rule_set.skip_goal() {
            Some(goal) => Self::new(rule_set, goal, true).map(Some),
            None => Ok(None),
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn rule_set(&self) -> &Arc<RuleSet> {
        &self.rule_set
    }

    pub fn user_goal(&self) -> RuleNumber {
        self.user_goal
    }

    pub fn goal_rule(&self) -> &RuntimeRule {
        &self.goal
    }

    pub fn is_skip(&self) -> bool {
        self.is_skip
    }

    /// Whether [`build`](Self::build) has completed since the caches were
    /// last cleared.
    pub fn is_built(&self) -> bool {
        self.built
    }

    /// Resolve a rule number, including the synthetic goal.
    pub fn rule(&self, number: RuleNumber) -> Result<&RuntimeRule, AutomatonError> {
        if number == RuleNumber::GOAL {
            return Ok(&self.goal);
        }
        Ok(self.rule_set.rule(number)?)
    }

    /// The state `{G@START}`.
    pub fn start_state(&self) -> StateNumber {
        self.start
    }

    /// # Panics
    /// Panics if `number` does not belong to this automaton.
    pub fn state(&self, number: StateNumber) -> &ParserState {
        &self.states[number.index()]
    }

    pub fn states(&self) -> impl Iterator<Item = &ParserState> + '_ {
        self.states.iter()
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    fn check_state(&self, number: StateNumber) -> Result<(), AutomatonError> {
        if number.index() >= self.states.len() {
            return Err(AutomatonError::UnknownState(number));
        }
        Ok(())
    }

    /// Look up the state holding exactly `rule_positions`.
    pub fn fetch_state(&self, rule_positions: &[RulePosition]) -> Option<StateNumber> {
        let mut key = rule_positions.to_vec();
        key.sort();
        key.dedup();
        self.state_index.get(&key).copied()
    }

    /// Return the state holding exactly `rule_positions`, creating it if it
    /// does not exist yet.
    pub fn create_state(&mut self, mut rule_positions: Vec<RulePosition>) -> StateNumber {
        rule_positions.sort();
        rule_positions.dedup();
        if let Some(&number) = self.state_index.get(&rule_positions) {
            return number;
        }
        let number = StateNumber::new(self.states.len() as u32);
        tracing::trace!("new state {:?}: {:?}", number, rule_positions);
        self.state_index.insert(rule_positions.clone(), number);
        self.states.push(ParserState {
            number,
            rule_positions,
            transitions: Map::default(),
        });
        number
    }

    /// Intern a lookahead set.
    pub fn create_lookahead_set(&mut self, content: TerminalSet) -> &LookaheadSet {
        let number = self.lookaheads.create(content);
        self.lookaheads.get(number)
    }

    /// # Panics
    /// Panics if `number` was not issued by this automaton.
    pub fn lookahead(&self, number: LookaheadNumber) -> &LookaheadSet {
        self.lookaheads.get(number)
    }

    pub fn union_lookahead(&mut self, a: LookaheadNumber, b: LookaheadNumber) -> LookaheadNumber {
        self.lookaheads.union(a, b)
    }

    pub fn resolve_lookahead(
        &mut self,
        number: LookaheadNumber,
        caller: LookaheadNumber,
    ) -> Result<LookaheadNumber, AutomatonError> {
        Ok(self.lookaheads.resolve(number, caller)?)
    }

    pub fn lookaheads(&self) -> impl Iterator<Item = &LookaheadSet> + '_ {
        self.lookaheads.iter()
    }

    /// Positions at which `rule` is referenced as an item.
    pub fn parent_positions(&self, rule: RuleNumber) -> impl Iterator<Item = &RulePosition> + '_ {
        self.parent_positions.get(&rule).into_iter().flatten()
    }

    /// Transitions out of `from` when `previous` is the state below it.
    ///
    /// Results are cached per `(from, previous)`; a failed derivation is
    /// not cached.
    pub fn transitions(
        &mut self,
        from: StateNumber,
        previous: Option<StateNumber>,
    ) -> Result<&[Transition], AutomatonError> {
        self.check_state(from)?;
        if let Some(previous) = previous {
            self.check_state(previous)?;
        }
        if !self.states[from.index()].transitions.contains_key(&previous) {
            let computed = self.calc_transitions(from, previous)?;
            self.states[from.index()]
                .transitions
                .insert(previous, computed);
        }
        Ok(&self.states[from.index()].transitions[&previous])
    }

    /// Drop every derived cache. States are kept so numbers stay valid,
    /// and the transitions are recomputed identically on demand.
    pub fn clear_caches(&mut self) {
        for state in &mut self.states {
            state.transitions.clear();
        }
        self.closures.clear();
        self.built = false;
    }

    pub fn display_position<'a>(&'a self, rp: &'a RulePosition) -> impl fmt::Display + 'a {
        display_fn(move |f| match self.rule(rp.rule()) {
            Ok(rule) => write!(f, "{}", rp.display(rule)),
            Err(..) => write!(f, "{:?}", rp),
        })
    }

    pub fn display_lookahead(&self, number: LookaheadNumber) -> impl fmt::Display + '_ {
        display_fn(move |f| {
            let content = self.lookaheads.get(number).content();
            write_braced(f, content.iter().map(|rule| self.rule_set.display_rule(rule)))
        })
    }
}

impl fmt::Display for ParserStateSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "## parser state set #{} (goal: {}{})",
            self.number,
            self.goal.tag(),
            if self.is_skip { ", skip" } else { "" }
        )?;
        for state in &self.states {
            writeln!(f, "{}", state.display(self))?;
        }
        Ok(())
    }
}

fn index_parent_positions(
    rule_set: &RuleSet,
    goal: &RuntimeRule,
) -> Result<Map<RuleNumber, Set<RulePosition>>, RuleSetError> {
    let mut index: Map<RuleNumber, Set<RulePosition>> = Map::default();
    for rule in rule_set.rules().iter().chain([goal]) {
        if rule.is_leaf() {
            continue;
        }
        for rp in rule.rule_positions()? {
            for &child in rp.items(rule)? {
                index.entry(child).or_default().insert(rp);
            }
        }
    }
    Ok(index)
}

#[derive(Debug, thiserror::Error)]
pub enum AutomatonError {
    #[error(transparent)]
    RuleSet(#[from] RuleSetError),

    #[error(transparent)]
    Lookahead(#[from] LookaheadError),

    #[error("unknown parser state {:?}", _0)]
    UnknownState(StateNumber),

    #[error("internal invariant violated: {}", msg)]
    InternalInvariant { msg: String },
}

impl AutomatonError {
    pub(crate) fn invariant(msg: impl Into<String>) -> Self {
        Self::InternalInvariant { msg: msg.into() }
    }
}
