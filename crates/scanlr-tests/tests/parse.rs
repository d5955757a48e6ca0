use scanlr::{
    automaton::{Action, ParserStateSet},
    rule_set::{RuleSet, RuleSetDef, RuleSetError},
};
use scanlr_runtime::{AutomatonMode, Config, ParseEngine};
use scanlr_tests::{grammars, init_tracing, rule_set};
use std::{collections::BTreeSet, sync::Arc};

type Define = fn(&mut RuleSetDef<'_>) -> Result<(), RuleSetError>;

fn engine(rules: &Arc<RuleSet>, mode: AutomatonMode) -> ParseEngine {
    ParseEngine::with_goal_name(rules.clone(), "S", Config::new().automaton_mode(mode)).unwrap()
}

fn check(define: Define, accepted: &[&str], rejected: &[&str]) {
    init_tracing();
    let rules = rule_set(define);
    for mode in [AutomatonMode::Lazy, AutomatonMode::Eager] {
        let mut engine = engine(&rules, mode);
        for text in accepted {
            let outcome = engine.recognize(text).unwrap();
            assert!(outcome.accepted, "{:?} should be accepted ({:?})", text, mode);
        }
        for text in rejected {
            let outcome = engine.recognize(text).unwrap();
            assert!(!outcome.accepted, "{:?} should be rejected ({:?})", text, mode);
        }
    }
}

/// Every derived transition, described by contents rather than numbers.
fn signatures(set: &ParserStateSet) -> BTreeSet<String> {
    let positions = |n| format!("{:?}", set.state(n).rule_positions());
    let mut signatures = BTreeSet::new();
    for state in set.states() {
        for (previous, transitions) in state.transitions_cache() {
            for t in transitions {
                signatures.insert(format!(
                    "{} / {:?} --{}--> {} guard={:?} up={:?} prev={:?}",
                    positions(t.from()),
                    previous.map(positions),
                    t.action(),
                    positions(t.to()),
                    set.lookahead(t.guard()).content(),
                    set.lookahead(t.up()).content(),
                    t.prev_guard()
                ));
            }
        }
    }
    signatures
}

#[test]
fn sequence_of_three() {
    init_tracing();
    let rules = rule_set(grammars::abc);
    let mut engine = engine(&rules, AutomatonMode::Lazy);
    let outcome = engine.recognize("abc").unwrap();
    assert!(outcome.accepted);
    assert_eq!(outcome.max_num_heads, 1);
    assert_eq!(outcome.furthest_position, 3);

    let automaton = engine.automaton(&engine.main_key()).unwrap();
    let mut counts = [0usize; 5];
    for state in automaton.states() {
        for (_, transitions) in state.transitions_cache() {
            for t in transitions {
                counts[t.action() as usize] += 1;
            }
        }
    }
    // WIDTH, HEIGHT, GRAFT, GOAL, EMBED
    assert_eq!(counts, [3, 1, 3, 1, 0]);
    assert!(!automaton.is_built());
}

#[test]
fn rejection_reports_expected_terminals() {
    let rules = rule_set(grammars::abc);
    let mut engine = engine(&rules, AutomatonMode::Lazy);
    let outcome = engine.recognize("abd").unwrap();
    assert!(!outcome.accepted);
    assert_eq!(outcome.furthest_position, 2);
    assert_eq!(outcome.expected, vec!["'c'".to_owned()]);
}

#[test]
fn left_recursion() {
    init_tracing();
    let rules = rule_set(grammars::left_recursive);
    let mut engine = engine(&rules, AutomatonMode::Lazy);
    let outcome = engine.recognize("aaaa").unwrap();
    assert!(outcome.accepted);
    assert_eq!(outcome.max_num_heads, 1);
    assert!(!engine.recognize("").unwrap().accepted);
}

#[test]
fn lazy_is_subset_of_eager() {
    for (define, text) in [
        (grammars::abc_abd as Define, "abd"),
        (grammars::left_recursive, "aaa"),
        (grammars::expr, "1 + (2 + 3)"),
        (grammars::separated, "1,2"),
    ] {
        let rules = rule_set(define);
        let mut lazy = engine(&rules, AutomatonMode::Lazy);
        assert!(lazy.recognize(text).unwrap().accepted, "{:?}", text);
        let eager = engine(&rules, AutomatonMode::Eager);

        let key = lazy.main_key();
        let lazy = signatures(lazy.automaton(&key).unwrap());
        let eager = signatures(eager.automaton(&key).unwrap());
        let missing: Vec<_> = lazy.difference(&eager).collect();
        assert!(missing.is_empty(), "not derived eagerly: {:#?}", missing);
    }
}

#[test]
fn lazy_equals_eager_when_input_covers_grammar() {
    let rules = rule_set(grammars::abc);
    let mut lazy = engine(&rules, AutomatonMode::Lazy);
    assert!(lazy.recognize("abc").unwrap().accepted);
    let eager = engine(&rules, AutomatonMode::Eager);
    let key = lazy.main_key();
    assert_eq!(
        signatures(lazy.automaton(&key).unwrap()),
        signatures(eager.automaton(&key).unwrap())
    );
    assert!(eager.automaton(&key).unwrap().is_built());
}

#[test]
fn common_prefix() {
    check(grammars::abc_abd, &["abc", "abd"], &["ab", "abe", "abcd"]);
}

#[test]
fn right_recursion() {
    check(grammars::right_recursive, &["a", "aaa", "aaaaaa"], &["", "b", "aab"]);
}

#[test]
fn ambiguous_grammar() {
    check(grammars::ambiguous, &["a", "aa", "aaaaa"], &["", "ab"]);

    let rules = rule_set(grammars::ambiguous);
    let mut engine = engine(&rules, AutomatonMode::Lazy);
    let outcome = engine.recognize("aaaa").unwrap();
    assert!(outcome.accepted);
    assert!(outcome.max_num_heads >= 1);
}

#[test]
fn nullable_prefix() {
    check(grammars::nullable_prefix, &["b", "ab"], &["", "a", "aab", "bb"]);
}

#[test]
fn bounded_lists() {
    check(grammars::bounded_multi, &["aa", "aaa"], &["", "a", "aaaa"]);
}

#[test]
fn separated_lists() {
    check(grammars::separated, &["", "1", "1,2", "10,200,3"], &[",", "1,", ",1", "1,,2", "1 2"]);
}

#[test]
fn skip_whitespace() {
    check(
        grammars::expr,
        &["1", "1+2", " 1 + ( 2 + 3 ) ", "(1)\n+\t2"],
        &["", "1 +", "1 + + 2", "(1", "1 2"],
    );
}

#[test]
fn assignments() {
    check(
        grammars::assignments,
        &["a = 1", "a=1;b=22", "x1 = 3 ;\n y = 4 "],
        &["a =", "a = 1;", "= 1", "a = b"],
    );
}

#[test]
fn embedded_rule_set() {
    check(grammars::embedded, &["<x>", "<xxx>"], &["<>", "<xy>", "<x", "x"]);

    let rules = rule_set(grammars::embedded);
    let mut engine = engine(&rules, AutomatonMode::Lazy);
    assert!(engine.recognize("<xx>").unwrap().accepted);
    // the nested rule set got an automaton of its own
    assert_eq!(engine.automata().count(), 2);
    let main = engine.automaton(&engine.main_key()).unwrap();
    assert!(main
        .states()
        .flat_map(|state| state.transitions_cache())
        .any(|(_, ts)| ts.iter().any(|t| t.action() == Action::Embed)));
}
