//! A graph-structured-stack recognizer driven by parser state sets.
//!
//! The engine only answers whether the text matches the goal; no parse
//! tree is built. Automata are created on first use and, unless the
//! engine is configured to build them eagerly, grow as the input demands.

use crate::scanner::Scanner;
use scanlr::{
    automaton::{Action, AutomatonError, ParserStateSet, StateNumber, Transition},
    lookahead::LookaheadNumber,
    rule::{Embedded, Rhs, RuleNumber},
    rule_set::{RuleSet, RuleSetError},
    types::{Map, Set},
};
use std::{
    cmp,
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

/// How automata are derived.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum AutomatonMode {
    /// Derive states and transitions as the recognizer reaches them.
    #[default]
    Lazy,
    /// Build every automaton completely before using it.
    Eager,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    automaton_mode: AutomatonMode,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn automaton_mode(mut self, mode: AutomatonMode) -> Self {
        self.automaton_mode = mode;
        self
    }

    pub fn get_automaton_mode(&self) -> AutomatonMode {
        self.automaton_mode
    }
}

/// Identity of a parser state set held by the engine.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct AutomatonKey {
    pub rule_set: u32,
    pub goal: RuleNumber,
    pub is_skip: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOutcome {
    pub accepted: bool,
    /// The largest number of distinct heads created by consuming input
    /// that ended at the same position.
    pub max_num_heads: usize,
    /// The furthest position any terminal matched up to.
    pub furthest_position: usize,
    /// Terminals tried and not matched at the furthest position, either
    /// as a leaf or as the lookahead after one.
    pub expected: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error(transparent)]
    Automaton(#[from] AutomatonError),

    #[error("invalid pattern {:?}: {}", pattern, source)]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

impl From<RuleSetError> for ParseError {
    fn from(err: RuleSetError) -> Self {
        Self::Automaton(err.into())
    }
}

fn invariant(msg: String) -> ParseError {
    ParseError::Automaton(AutomatonError::InternalInvariant { msg })
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Acceptance {
    /// The goal must reach the end of the text.
    EndOfText,
    /// Any position is a valid end, used for skip and embedded runs.
    Anywhere,
}

impl Acceptance {
    fn at_end(self, text: &str, pos: usize) -> bool {
        match self {
            Self::EndOfText => pos == text.len(),
            Self::Anywhere => true,
        }
    }
}

type NodeId = usize;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct NodeKey {
    state: StateNumber,
    start: usize,
    end: usize,
    /// runtime lookahead
    lookahead: LookaheadNumber,
}

#[derive(Debug)]
struct Node {
    key: NodeKey,
    previous: Set<Option<NodeId>>,
    /// nodes grafted on top of this one; they share its previous nodes
    grafted: Vec<NodeId>,
}

/// Per-recognition memo of nested runs.
#[derive(Debug, Default)]
struct Memo {
    skip: Map<(u32, usize), usize>,
    embedded: Map<(AutomatonKey, usize), Vec<usize>>,
    active: Set<(AutomatonKey, usize)>,
}

struct Run<'t> {
    key: AutomatonKey,
    rule_set: Arc<RuleSet>,
    text: &'t str,
    acceptance: Acceptance,
    skip: bool,
    nodes: Vec<Node>,
    index: Map<NodeKey, NodeId>,
    agenda: BTreeMap<usize, Vec<(NodeId, Option<NodeId>)>>,
    heads: BTreeMap<usize, Set<NodeId>>,
    accepted: BTreeSet<usize>,
    furthest: usize,
    expected_at: usize,
    expected: Set<RuleNumber>,
}

impl Run<'_> {
    fn node(&mut self, key: NodeKey) -> NodeId {
        if let Some(&id) = self.index.get(&key) {
            return id;
        }
        let id = self.nodes.len();
        self.nodes.push(Node {
            key,
            previous: Set::default(),
            grafted: vec![],
        });
        self.index.insert(key, id);
        id
    }

    /// Add the edge `node -> previous` and schedule it, once per edge.
    fn link(&mut self, node: NodeId, previous: Option<NodeId>) {
        let mut pending = vec![(node, previous)];
        while let Some((node, previous)) = pending.pop() {
            if !self.nodes[node].previous.insert(previous) {
                continue;
            }
            let end = self.nodes[node].key.end;
            self.furthest = cmp::max(self.furthest, end);
            self.agenda.entry(end).or_default().push((node, previous));
            pending.extend(self.nodes[node].grafted.iter().map(|&g| (g, previous)));
        }
    }

    /// `grafted` replaces `parent`: it is linked to every node below
    /// `parent`, now and later.
    fn graft(&mut self, parent: NodeId, grafted: NodeId) {
        if !self.nodes[parent].grafted.contains(&grafted) {
            self.nodes[parent].grafted.push(grafted);
        }
        let below: Vec<_> = self.nodes[parent].previous.iter().copied().collect();
        for previous in below {
            self.link(grafted, previous);
        }
    }

    fn expect(&mut self, pos: usize, terminal: RuleNumber) {
        if pos > self.expected_at {
            self.expected_at = pos;
            self.expected.clear();
        }
        if pos == self.expected_at {
            self.expected.insert(terminal);
        }
    }

    fn max_num_heads(&self) -> usize {
        self.heads.values().map(Set::len).fold(1, cmp::max)
    }
}

/// A recognizer for one goal of a rule set.
#[derive(Debug)]
pub struct ParseEngine {
    rule_set: Arc<RuleSet>,
    goal: RuleNumber,
    config: Config,
    automata: Map<AutomatonKey, ParserStateSet>,
    scanner: Scanner,
}

impl ParseEngine {
    pub fn new(rule_set: Arc<RuleSet>, goal: RuleNumber, config: Config) -> Result<Self, ParseError> {
        let mut engine = Self {
            rule_set: rule_set.clone(),
            goal,
            config,
            automata: Map::default(),
            scanner: Scanner::new(),
        };
        engine.prepare(&rule_set, goal, false)?;
        if let Some(skip_goal) = rule_set.skip_goal() {
            engine.prepare(&rule_set, skip_goal, true)?;
        }
        Ok(engine)
    }

    /// Shorthand for [`new`](Self::new) with the goal given by name.
    pub fn with_goal_name(
        rule_set: Arc<RuleSet>,
        goal: &str,
        config: Config,
    ) -> Result<Self, ParseError> {
        let goal = rule_set.find_runtime_rule(goal)?.number();
        Self::new(rule_set, goal, config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn main_key(&self) -> AutomatonKey {
        AutomatonKey {
            rule_set: self.rule_set.number(),
            goal: self.goal,
            is_skip: false,
        }
    }

    pub fn automaton(&self, key: &AutomatonKey) -> Option<&ParserStateSet> {
        self.automata.get(key)
    }

    pub fn automata(&self) -> impl Iterator<Item = (&AutomatonKey, &ParserStateSet)> + '_ {
        self.automata.iter()
    }

    /// Whether `text` as a whole matches the goal.
    pub fn recognize(&mut self, text: &str) -> Result<ParseOutcome, ParseError> {
        let span = tracing::trace_span!("recognize", len = text.len());
        let _enter = span.enter();

        let key = self.main_key();
        let mut memo = Memo::default();
        let run = self.run(key, text, 0, Acceptance::EndOfText, &mut memo)?;

        let expected = if run.expected_at == run.furthest {
            run.expected
                .iter()
                .map(|&terminal| Ok(run.rule_set.rule(terminal)?.tag().to_owned()))
                .collect::<Result<_, RuleSetError>>()?
        } else {
            vec![]
        };
        let outcome = ParseOutcome {
            accepted: run.accepted.contains(&text.len()),
            max_num_heads: run.max_num_heads(),
            furthest_position: run.furthest,
            expected,
        };
        tracing::debug!(
            accepted = outcome.accepted,
            max_num_heads = outcome.max_num_heads,
            furthest = outcome.furthest_position,
            num_nodes = run.nodes.len(),
            "recognized"
        );
        Ok(outcome)
    }

    fn prepare(
        &mut self,
        rule_set: &Arc<RuleSet>,
        goal: RuleNumber,
        is_skip: bool,
    ) -> Result<AutomatonKey, ParseError> {
        let key = AutomatonKey {
            rule_set: rule_set.number(),
            goal,
            is_skip,
        };
        if !self.automata.contains_key(&key) {
            let mut automaton = ParserStateSet::new(rule_set.clone(), goal, is_skip)?;
            if self.config.automaton_mode == AutomatonMode::Eager {
                automaton.build()?;
            }
            self.automata.insert(key, automaton);
        }
        Ok(key)
    }

    fn state_set(&mut self, key: AutomatonKey) -> Result<&mut ParserStateSet, ParseError> {
        self.automata
            .get_mut(&key)
            .ok_or_else(|| invariant(format!("no automaton for {:?}", key)))
    }

    fn run<'t>(
        &mut self,
        key: AutomatonKey,
        text: &'t str,
        start: usize,
        acceptance: Acceptance,
        memo: &mut Memo,
    ) -> Result<Run<'t>, ParseError> {
        let rule_set = self.state_set(key)?.rule_set().clone();
        let skip = !key.is_skip && rule_set.skip_goal().is_some();
        let start = if skip {
            self.skip(&rule_set, text, start, memo)?
        } else {
            start
        };
        let start_state = self.state_set(key)?.start_state();

        let mut run = Run {
            key,
            rule_set,
            text,
            acceptance,
            skip,
            nodes: vec![],
            index: Map::default(),
            agenda: BTreeMap::new(),
            heads: BTreeMap::new(),
            accepted: BTreeSet::new(),
            furthest: start,
            expected_at: start,
            expected: Set::default(),
        };
        let root = run.node(NodeKey {
            state: start_state,
            start,
            end: start,
            lookahead: LookaheadNumber::EOT,
        });
        run.link(root, None);

        // Positions are processed in order; zero-width results land back
        // in the current round.
        while let Some((pos, mut round)) = run.agenda.pop_first() {
            while let Some((head, previous)) = round.pop() {
                self.step(&mut run, head, previous, memo)?;
                if let Some(more) = run.agenda.remove(&pos) {
                    round.extend(more);
                }
            }
        }
        Ok(run)
    }

    fn step(
        &mut self,
        run: &mut Run<'_>,
        head: NodeId,
        previous: Option<NodeId>,
        memo: &mut Memo,
    ) -> Result<(), ParseError> {
        let head_key = run.nodes[head].key;
        let previous_state = previous.map(|p| run.nodes[p].key.state);
        let transitions = self
            .state_set(run.key)?
            .transitions(head_key.state, previous_state)?
            .to_vec();

        for transition in &transitions {
            match transition.action() {
                Action::Width | Action::Embed => self.consume(run, head, transition, memo)?,
                Action::Height | Action::Graft => {
                    let Some(parent) = previous else {
                        return Err(invariant(format!(
                            "{} out of {:?} without a previous node",
                            transition.action(),
                            head_key.state
                        )));
                    };
                    let parent_key = run.nodes[parent].key;
                    if !self.guard_holds(run, transition.guard(), parent_key.lookahead, head_key.end, memo)? {
                        continue;
                    }
                    let lookahead = self
                        .state_set(run.key)?
                        .resolve_lookahead(transition.up(), parent_key.lookahead)?;
                    if transition.action() == Action::Height {
                        let node = run.node(NodeKey {
                            state: transition.to(),
                            start: head_key.start,
                            end: head_key.end,
                            lookahead,
                        });
                        run.link(node, Some(parent));
                    } else {
                        let node = run.node(NodeKey {
                            state: transition.to(),
                            start: parent_key.start,
                            end: head_key.end,
                            lookahead,
                        });
                        run.graft(parent, node);
                    }
                }
                Action::Goal => {
                    if previous.is_none() && run.acceptance.at_end(run.text, head_key.end) {
                        tracing::trace!("goal reached at {}", head_key.end);
                        run.accepted.insert(head_key.end);
                    }
                }
            }
        }
        Ok(())
    }

    /// WIDTH and EMBED: match the leaf at the head's end, then check the
    /// guard after it.
    fn consume(
        &mut self,
        run: &mut Run<'_>,
        head: NodeId,
        transition: &Transition,
        memo: &mut Memo,
    ) -> Result<(), ParseError> {
        let head_key = run.nodes[head].key;
        let rule_set = run.rule_set.clone();
        let leaf = match self.state_set(run.key)?.state(transition.to()).rule_positions() {
            [rp] => rp.rule(),
            _ => {
                return Err(invariant(format!(
                    "{} target {:?} is not a single leaf",
                    transition.action(),
                    transition.to()
                )))
            }
        };
        let ends: Vec<usize> = match rule_set.rule(leaf)?.rhs() {
            Rhs::Terminal(terminal) => self
                .scanner
                .match_terminal(terminal, run.text, head_key.end)?
                .into_iter()
                .collect(),
            Rhs::Embedded(embedded) => self.run_embedded(embedded, run.text, head_key.end, memo)?,
            _ => return Err(invariant(format!("{:?} is not a leaf rule", leaf))),
        };
        if ends.is_empty() {
            run.expect(head_key.end, leaf);
            return Ok(());
        }
        if let Some(&end) = ends.iter().max() {
            run.furthest = cmp::max(run.furthest, end);
        }

        for end in ends {
            let end = if run.skip {
                self.skip(&rule_set, run.text, end, memo)?
            } else {
                end
            };
            if !self.guard_holds(run, transition.guard(), head_key.lookahead, end, memo)? {
                continue;
            }
            let lookahead = self
                .state_set(run.key)?
                .resolve_lookahead(transition.up(), head_key.lookahead)?;
            let node = run.node(NodeKey {
                state: transition.to(),
                start: head_key.end,
                end,
                lookahead,
            });
            run.heads.entry(end).or_default().insert(node);
            run.link(node, Some(head));
        }
        Ok(())
    }

    /// Whether `guard`, resolved against `caller`, matches at `pos`.
    fn guard_holds(
        &mut self,
        run: &mut Run<'_>,
        guard: LookaheadNumber,
        caller: LookaheadNumber,
        pos: usize,
        memo: &mut Memo,
    ) -> Result<bool, ParseError> {
        let state_set = self.state_set(run.key)?;
        let resolved = state_set.resolve_lookahead(guard, caller)?;
        let content = state_set.lookahead(resolved).content().clone();
        for member in content.iter() {
            let matched = match member {
                RuleNumber::ANY_LOOKAHEAD => true,
                RuleNumber::END_OF_TEXT => run.acceptance.at_end(run.text, pos),
                RuleNumber::USE_PARENT_LOOKAHEAD => {
                    return Err(invariant("unresolved UP lookahead reached the recognizer".into()))
                }
                _ => match run.rule_set.rule(member)?.rhs() {
                    Rhs::Terminal(terminal) => self
                        .scanner
                        .match_terminal(terminal, run.text, pos)?
                        .is_some(),
                    Rhs::Embedded(embedded) => {
                        !self.run_embedded(embedded, run.text, pos, memo)?.is_empty()
                    }
                    _ => false,
                },
            };
            if matched {
                return Ok(true);
            }
        }
        for member in content.iter() {
            run.expect(pos, member);
        }
        Ok(false)
    }

    /// The end of the longest run of skip rules from `pos`, or `pos`.
    fn skip(
        &mut self,
        rule_set: &Arc<RuleSet>,
        text: &str,
        pos: usize,
        memo: &mut Memo,
    ) -> Result<usize, ParseError> {
        let Some(goal) = rule_set.skip_goal() else {
            return Ok(pos);
        };
        if let Some(&end) = memo.skip.get(&(rule_set.number(), pos)) {
            return Ok(end);
        }
        let key = self.prepare(rule_set, goal, true)?;
        let run = self.run(key, text, pos, Acceptance::Anywhere, memo)?;
        let end = run.accepted.last().copied().map_or(pos, |end| cmp::max(end, pos));
        memo.skip.insert((rule_set.number(), pos), end);
        Ok(end)
    }

    /// End positions of the embedded goal matched from `pos`.
    fn run_embedded(
        &mut self,
        embedded: &Embedded,
        text: &str,
        pos: usize,
        memo: &mut Memo,
    ) -> Result<Vec<usize>, ParseError> {
        let key = self.prepare(&embedded.rule_set, embedded.start, false)?;
        if let Some(ends) = memo.embedded.get(&(key, pos)) {
            return Ok(ends.clone());
        }
        if !memo.active.insert((key, pos)) {
            // re-entered at the same position without consuming anything
            return Ok(vec![]);
        }
        let run = self.run(key, text, pos, Acceptance::Anywhere, memo)?;
        memo.active.swap_remove(&(key, pos));
        let ends: Vec<usize> = run.accepted.into_iter().collect();
        memo.embedded.insert((key, pos), ends.clone());
        Ok(ends)
    }
}
