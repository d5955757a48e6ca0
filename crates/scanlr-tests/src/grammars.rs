//! Grammar definitions for integration tests. The goal of each grammar is
//! the rule named `S`.

use scanlr::{
    rule::ChoiceKind,
    rule_set::{RuleSet, RuleSetDef, RuleSetError},
};
use std::sync::Arc;

/// S = 'a'
pub fn single(b: &mut RuleSetDef<'_>) -> Result<(), RuleSetError> {
    let a = b.literal("a");
    let s = b.non_terminal("S")?;
    b.concatenation(s, [a])
}

/// S = 'a' 'b' 'c'
pub fn abc(b: &mut RuleSetDef<'_>) -> Result<(), RuleSetError> {
    let a = b.literal("a");
    let bb = b.literal("b");
    let c = b.literal("c");
    let s = b.non_terminal("S")?;
    b.concatenation(s, [a, bb, c])
}

/// S = ABC | ABD ; ABC = 'a' 'b' 'c' ; ABD = 'a' 'b' 'd'
pub fn abc_abd(b: &mut RuleSetDef<'_>) -> Result<(), RuleSetError> {
    let a = b.literal("a");
    let bb = b.literal("b");
    let c = b.literal("c");
    let d = b.literal("d");
    let s = b.non_terminal("S")?;
    let abc = b.non_terminal("ABC")?;
    let abd = b.non_terminal("ABD")?;
    b.choice(s, ChoiceKind::LongestPriority, [abc, abd])?;
    b.concatenation(abc, [a, bb, c])?;
    b.concatenation(abd, [a, bb, d])?;
    Ok(())
}

/// S = 'a' | S1 ; S1 = S 'a'
pub fn left_recursive(b: &mut RuleSetDef<'_>) -> Result<(), RuleSetError> {
    let a = b.literal("a");
    let s = b.non_terminal("S")?;
    let s1 = b.non_terminal("S1")?;
    b.choice(s, ChoiceKind::LongestPriority, [a, s1])?;
    b.concatenation(s1, [s, a])?;
    Ok(())
}

/// S = 'a' | S1 ; S1 = 'a' S
pub fn right_recursive(b: &mut RuleSetDef<'_>) -> Result<(), RuleSetError> {
    let a = b.literal("a");
    let s = b.non_terminal("S")?;
    let s1 = b.non_terminal("S1")?;
    b.choice(s, ChoiceKind::LongestPriority, [a, s1])?;
    b.concatenation(s1, [a, s])?;
    Ok(())
}

/// S = SS | 'a' ; SS = S S
pub fn ambiguous(b: &mut RuleSetDef<'_>) -> Result<(), RuleSetError> {
    let a = b.literal("a");
    let s = b.non_terminal("S")?;
    let ss = b.non_terminal("SS")?;
    b.choice(s, ChoiceKind::Ambiguous, [ss, a])?;
    b.concatenation(ss, [s, s])?;
    Ok(())
}

/// S = opt 'b' ; opt = E | 'a' ; E = <empty>
pub fn nullable_prefix(b: &mut RuleSetDef<'_>) -> Result<(), RuleSetError> {
    let a = b.literal("a");
    let bb = b.literal("b");
    let s = b.non_terminal("S")?;
    let opt = b.non_terminal("opt")?;
    let e = b.non_terminal("E")?;
    b.concatenation(s, [opt, bb])?;
    b.choice(opt, ChoiceKind::PriorityLongest, [e, a])?;
    b.empty(e)?;
    Ok(())
}

/// S = ['a']{2..3}
pub fn bounded_multi(b: &mut RuleSetDef<'_>) -> Result<(), RuleSetError> {
    let a = b.literal("a");
    let s = b.non_terminal("S")?;
    b.multi(s, 2, Some(3), a)
}

/// S = [NUM / ',']{0..}
pub fn separated(b: &mut RuleSetDef<'_>) -> Result<(), RuleSetError> {
    let num = b.pattern("[0-9]+");
    let comma = b.literal(",");
    let s = b.non_terminal("S")?;
    b.separated_list(s, 0, None, num, comma)
}

/// S = E ; E = E1 | T ; E1 = E '+' T ; T = NUM | P ; P = '(' E ')'
///
/// Whitespace is skipped between terminals.
pub fn expr(b: &mut RuleSetDef<'_>) -> Result<(), RuleSetError> {
    let ws = b.pattern(r"\s+");
    b.skip(ws)?;
    let num = b.pattern("[0-9]+");
    let plus = b.literal("+");
    let lparen = b.literal("(");
    let rparen = b.literal(")");

    let s = b.non_terminal("S")?;
    let e = b.non_terminal("E")?;
    let e1 = b.non_terminal("E1")?;
    let t = b.non_terminal("T")?;
    let p = b.non_terminal("P")?;
    b.concatenation(s, [e])?;
    b.choice(e, ChoiceKind::LongestPriority, [e1, t])?;
    b.concatenation(e1, [e, plus, t])?;
    b.choice(t, ChoiceKind::LongestPriority, [num, p])?;
    b.concatenation(p, [lparen, e, rparen])?;
    Ok(())
}

/// S = '<' inner '>' where `inner` is `I = ['x']{1..}` from its own rule set.
pub fn embedded(b: &mut RuleSetDef<'_>) -> Result<(), RuleSetError> {
    let inner = RuleSet::define(|b| {
        let x = b.literal("x");
        let i = b.non_terminal("I")?;
        b.multi(i, 1, None, x)
    })?;
    let start = inner.find_runtime_rule("I")?.number();

    let lt = b.literal("<");
    let gt = b.literal(">");
    let nested = b.embedded("inner", Arc::new(inner), start)?;
    let s = b.non_terminal("S")?;
    b.concatenation(s, [lt, nested, gt])
}

/// key = value pairs separated by `;`, e.g. `a = 1; b = 22`.
pub fn assignments(b: &mut RuleSetDef<'_>) -> Result<(), RuleSetError> {
    let ws = b.pattern(r"[ \t\n]+");
    b.skip(ws)?;
    let ident = b.pattern("[a-z][a-z0-9_]*");
    let num = b.pattern("[0-9]+");
    let eq = b.literal("=");
    let semi = b.literal(";");

    let s = b.non_terminal("S")?;
    let pair = b.non_terminal("pair")?;
    b.separated_list(s, 1, None, pair, semi)?;
    b.concatenation(pair, [ident, eq, num])?;
    Ok(())
}
