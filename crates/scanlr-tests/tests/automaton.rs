use scanlr::{
    automaton::{Action, ParserStateSet, StateNumber, Transition},
    lookahead::TerminalSet,
    rule::RuleNumber,
    rule_position::{Position, RulePosition},
    rule_set::RuleSet,
};
use scanlr_tests::{grammars, init_tracing, rule_set};
use std::sync::Arc;

fn state_set(rules: &Arc<RuleSet>) -> ParserStateSet {
    let goal = rules.find_runtime_rule("S").unwrap().number();
    ParserStateSet::new(rules.clone(), goal, false).unwrap()
}

fn end_of(rule: RuleNumber) -> RulePosition {
    RulePosition::new(rule, RulePosition::OPTION_NONE, Position::END_OF_RULE)
}

fn at(rule: RuleNumber, position: u32) -> RulePosition {
    RulePosition::new(rule, RulePosition::OPTION_NONE, Position::new(position))
}

fn up() -> TerminalSet {
    [RuleNumber::USE_PARENT_LOOKAHEAD].into_iter().collect()
}

fn single(transitions: &[Transition]) -> Transition {
    assert_eq!(transitions.len(), 1, "{:?}", transitions);
    transitions[0].clone()
}

#[test]
fn single_terminal_transitions() {
    init_tracing();
    let rules = rule_set(grammars::single);
    let s = rules.find_runtime_rule("S").unwrap().number();
    let a = rules.find_terminal_rule("a").unwrap().number();
    let mut set = state_set(&rules);
    let start = set.start_state();

    let width = single(set.transitions(start, None).unwrap());
    assert_eq!(width.action(), Action::Width);
    assert_eq!(set.fetch_state(&[end_of(a)]), Some(width.to()));
    assert_eq!(set.lookahead(width.guard()).content(), &up());
    assert_eq!(width.prev_guard(), None);

    let height = single(set.transitions(width.to(), Some(start)).unwrap());
    assert_eq!(height.action(), Action::Height);
    assert_eq!(set.state(height.to()).rule_positions(), &[end_of(s)]);
    assert_eq!(height.prev_guard(), Some(&[at(s, 0)][..]));

    let graft = single(set.transitions(height.to(), Some(start)).unwrap());
    assert_eq!(graft.action(), Action::Graft);
    assert!(set.state(graft.to()).is_goal());
    assert_eq!(graft.prev_guard(), Some(&[at(RuleNumber::GOAL, 0)][..]));

    let goal = single(set.transitions(graft.to(), None).unwrap());
    assert_eq!(goal.action(), Action::Goal);

    assert_eq!(set.num_states(), 4);
    eprintln!("{}", set);
}

#[test]
fn eager_build_matches_single_terminal() {
    let rules = rule_set(grammars::single);
    let mut set = state_set(&rules);
    set.build().unwrap();
    assert_eq!(set.num_states(), 4);
    let count: usize = set
        .states()
        .flat_map(|state| state.transitions_cache())
        .map(|(_, transitions)| transitions.len())
        .sum();
    assert_eq!(count, 4);
}

#[test]
fn common_prefix_is_merged() {
    init_tracing();
    let rules = rule_set(grammars::abc_abd);
    let abc = rules.find_runtime_rule("ABC").unwrap().number();
    let abd = rules.find_runtime_rule("ABD").unwrap().number();
    let c = rules.find_terminal_rule("c").unwrap().number();
    let d = rules.find_terminal_rule("d").unwrap().number();
    let mut set = state_set(&rules);
    set.build().unwrap();
    eprintln!("{}", set);

    let merged = set
        .fetch_state(&[at(abc, 2), at(abd, 2)])
        .expect("merged state after 'a' 'b'");
    assert!(set.fetch_state(&[at(abc, 1), at(abd, 1)]).is_some());
    assert!(set.fetch_state(&[at(abc, 2)]).is_none());

    let start = set.start_state();
    let transitions = set.transitions(merged, Some(start)).unwrap().to_vec();
    let mut targets: Vec<_> = transitions
        .iter()
        .map(|t| {
            assert_eq!(t.action(), Action::Width);
            set.state(t.to()).rule_positions()[0].rule()
        })
        .collect();
    targets.sort();
    assert_eq!(targets, vec![c, d]);
}

#[test]
fn completion_inside_list_mixes_height_and_graft() {
    init_tracing();
    let rules = rule_set(grammars::ambiguous);
    let s = rules.find_runtime_rule("S").unwrap().number();
    let ss = rules.find_runtime_rule("SS").unwrap().number();
    let mut set = state_set(&rules);
    set.build().unwrap();

    // S/1 is the 'a' alternative
    let s_end = set
        .fetch_state(&[RulePosition::new(s, 1, Position::END_OF_RULE)])
        .expect("S completed by 'a'");
    let second = set.fetch_state(&[at(ss, 1)]).expect("SS waiting for its second S");
    let transitions = set.transitions(s_end, Some(second)).unwrap().to_vec();

    let heights: Vec<_> = transitions.iter().filter(|t| t.action() == Action::Height).collect();
    let grafts: Vec<_> = transitions.iter().filter(|t| t.action() == Action::Graft).collect();
    assert_eq!(heights.len() + grafts.len(), transitions.len());
    assert!(!heights.is_empty());
    for height in heights {
        assert_eq!(set.state(height.to()).rule_positions(), &[at(ss, 1)]);
        assert_eq!(height.prev_guard(), Some(&[at(ss, 0)][..]));
    }
    let graft = single(&grafts.into_iter().cloned().collect::<Vec<_>>());
    assert_eq!(set.state(graft.to()).rule_positions(), &[end_of(ss)]);
    assert_eq!(graft.prev_guard(), Some(&[at(ss, 1)][..]));
}

#[test]
fn completion_without_parents_is_goal() {
    let rules = rule_set(|b| {
        let a = b.literal("a");
        let bb = b.literal("b");
        let s = b.non_terminal("S")?;
        let t = b.non_terminal("T")?;
        b.concatenation(s, [a])?;
        b.concatenation(t, [bb])
    });
    let s = rules.find_runtime_rule("S").unwrap().number();
    let t = rules.find_runtime_rule("T").unwrap().number();
    let mut set = state_set(&rules);
    let start = set.start_state();

    // T is referenced nowhere
    let t_end = set.create_state(vec![end_of(t)]);
    let goal = single(set.transitions(t_end, Some(start)).unwrap());
    assert_eq!(goal.action(), Action::Goal);
    assert_eq!(goal.to(), t_end);
    assert_eq!(goal.prev_guard(), None);

    // nothing below to attach to
    let s_end = set.create_state(vec![end_of(s)]);
    let goal = single(set.transitions(s_end, None).unwrap());
    assert_eq!(goal.action(), Action::Goal);
}

#[test]
fn one_width_per_closure_leaf() {
    let rules = rule_set(grammars::expr);
    let num = rules.find_terminal_rule("[0-9]+").unwrap().number();
    let plus = rules.find_terminal_rule("+").unwrap().number();
    let lparen = rules.find_terminal_rule("(").unwrap().number();
    let mut set = state_set(&rules);
    let start = set.start_state();

    let transitions = set.transitions(start, None).unwrap().to_vec();
    assert_eq!(transitions.len(), 2);
    let mut leaves = vec![];
    for t in &transitions {
        assert_eq!(t.action(), Action::Width);
        assert_eq!(t.guard(), t.up());
        let to = set.state(t.to()).rule_positions();
        assert_eq!(to.len(), 1);
        assert!(to[0].is_at_end());
        leaves.push(to[0].rule());

        let expected: TerminalSet = if to[0].rule() == num {
            [RuleNumber::USE_PARENT_LOOKAHEAD, plus].into_iter().collect()
        } else {
            [num, lparen].into_iter().collect()
        };
        assert_eq!(set.lookahead(t.guard()).content(), &expected);
    }
    leaves.sort();
    let mut expected = vec![num, lparen];
    expected.sort();
    assert_eq!(leaves, expected);
}

#[test]
fn states_are_frames_or_single_completions() {
    for define in [
        grammars::abc_abd,
        grammars::left_recursive,
        grammars::right_recursive,
        grammars::expr,
        grammars::separated,
        grammars::nullable_prefix,
    ] {
        let rules = rule_set(define);
        let mut set = state_set(&rules);
        set.build().unwrap();
        for state in set.states() {
            assert!(
                state.is_frame() || (state.is_completed() && state.rule_positions().len() == 1),
                "{}",
                state.display(&set)
            );
        }
        assert!(set.states().any(|state| state.is_goal()));
    }
}

#[test]
fn closure_of_left_recursion_terminates() {
    let rules = rule_set(grammars::left_recursive);
    let mut set = state_set(&rules);
    let start = set.start_state();
    let closure = set.closure(start).unwrap();
    assert_eq!(closure.len(), 7);
    set.build().unwrap();
    assert!(set.is_built());
}

#[test]
fn transitions_are_stable_across_cache_clears() {
    let rules = rule_set(grammars::expr);
    let mut set = state_set(&rules);
    set.build().unwrap();
    let before: Vec<(StateNumber, Option<StateNumber>, Vec<Transition>)> = set
        .states()
        .flat_map(|state| {
            state
                .transitions_cache()
                .map(move |(previous, ts)| (state.number(), previous, ts.to_vec()))
        })
        .collect();
    let num_states = set.num_states();

    set.clear_caches();
    for (from, previous, transitions) in &before {
        assert_eq!(&set.transitions(*from, *previous).unwrap().to_vec(), transitions);
    }
    assert_eq!(set.num_states(), num_states);
}

#[test]
fn lookahead_resolution_through_state_set() {
    let rules = rule_set(grammars::single);
    let a = rules.find_terminal_rule("a").unwrap().number();
    let mut set = state_set(&rules);

    let with_up: TerminalSet = [a, RuleNumber::USE_PARENT_LOOKAHEAD].into_iter().collect();
    let with_up = set.create_lookahead_set(with_up).number();
    let eot = scanlr::lookahead::LookaheadNumber::EOT;
    let resolved = set.resolve_lookahead(with_up, eot).unwrap();
    let expected: TerminalSet = [RuleNumber::END_OF_TEXT, a].into_iter().collect();
    assert_eq!(set.lookahead(resolved).content(), &expected);

    let up = scanlr::lookahead::LookaheadNumber::UP;
    assert_eq!(set.resolve_lookahead(up, eot).unwrap(), eot);
    assert!(set.resolve_lookahead(with_up, up).is_err());
}

#[test]
fn static_follow_sets() {
    let rules = rule_set(grammars::expr);
    let set = state_set(&rules);
    let t = rules.find_runtime_rule("T").unwrap().number();
    let plus = rules.find_terminal_rule("+").unwrap().number();
    let rparen = rules.find_terminal_rule(")").unwrap().number();
    let follow = set.follow_of(t).unwrap();
    let expected: TerminalSet = [RuleNumber::END_OF_TEXT, plus, rparen].into_iter().collect();
    assert_eq!(follow, expected);
}

#[test]
fn skip_automaton() {
    let rules = rule_set(grammars::expr);
    let mut skip = ParserStateSet::for_skip(rules).unwrap().expect("skip rules");
    assert!(skip.is_skip());
    skip.build().unwrap();
    assert!(skip.states().any(|state| state.is_goal()));
}
