//! Optimizer tests through the real parser.

use pretty_assertions::assert_eq;

use verdict_expr::{display, evaluate, Context, Expr, ExprArena, ExprId};
use verdict_grammar::{register_fact, set_fact, Grammar};
use verdict_parse::parse_into;

use super::Factorizer;

fn fact_grammar() -> Grammar {
    let mut grammar = Grammar::with_standard_ops();
    register_fact::<i64>(&mut grammar, "x").unwrap();
    register_fact::<i64>(&mut grammar, "y").unwrap();
    grammar
}

fn parse_optimized(
    arena: &mut ExprArena,
    factorizer: &mut Factorizer,
    grammar: &Grammar,
    source: &str,
) -> ExprId {
    parse_into(arena, grammar, Some(factorizer), source).unwrap()
}

#[test]
fn fact_free_subtrees_fold_to_display_preserving_constants() {
    let grammar = Grammar::with_standard_ops();
    let mut arena = ExprArena::new();
    let mut factorizer = Factorizer::new();
    let root = parse_optimized(&mut arena, &mut factorizer, &grammar, "(6 >= 5) AND (4 > 3)");

    assert!(matches!(arena.expr(root), Expr::Const(_)));
    assert_eq!(display(&arena, root), "((6)>=(5))&&((4)>(3))");
    let mut ctx = Context::new();
    assert_eq!(
        evaluate(&arena, root, &mut ctx).unwrap().as_bool(),
        Some(true)
    );
}

#[test]
fn equal_printed_forms_share_identity() {
    let grammar = fact_grammar();
    let mut arena = ExprArena::new();
    let mut factorizer = Factorizer::new();
    let root = parse_optimized(&mut arena, &mut factorizer, &grammar, "$x + $x");

    let Expr::Binary(binary) = arena.expr(root) else {
        panic!("expected the sum at the root");
    };
    assert_eq!(binary.lhs, binary.rhs, "both operands share one node");

    let x = 21i64;
    let mut ctx = Context::new();
    set_fact(&grammar, &mut ctx, "x", &x).unwrap();
    assert_eq!(
        evaluate(&arena, root, &mut ctx).unwrap().as_int(),
        Some(42)
    );
}

#[test]
fn single_fact_subtrees_above_the_threshold_get_memoized() {
    let grammar = fact_grammar();
    let mut arena = ExprArena::new();
    let mut factorizer = Factorizer::new();
    let root = parse_optimized(
        &mut arena,
        &mut factorizer,
        &grammar,
        "$x * $x + $x * $x",
    );

    assert!(
        matches!(arena.expr(root), Expr::Memo(_)),
        "root should be wrapped, got {}",
        display(&arena, root)
    );

    let x = 3i64;
    let mut ctx = Context::new();
    set_fact(&grammar, &mut ctx, "x", &x).unwrap();
    assert_eq!(
        evaluate(&arena, root, &mut ctx).unwrap().as_int(),
        Some(18)
    );

    let y = 5i64;
    let mut ctx2 = Context::new();
    set_fact(&grammar, &mut ctx2, "x", &y).unwrap();
    assert_eq!(
        evaluate(&arena, root, &mut ctx2).unwrap().as_int(),
        Some(50)
    );
}

#[test]
fn two_fact_subtrees_are_not_memoized() {
    let grammar = fact_grammar();
    let mut arena = ExprArena::new();
    let mut factorizer = Factorizer::new();
    let root = parse_optimized(
        &mut arena,
        &mut factorizer,
        &grammar,
        "$x * $x + $y * $y",
    );
    assert!(
        !matches!(arena.expr(root), Expr::Memo(_)),
        "a two-fact node must stay unwrapped"
    );
}

#[test]
fn factorization_is_idempotent() {
    let grammar = fact_grammar();
    let mut arena = ExprArena::new();
    let mut factorizer = Factorizer::new();
    let source = "$x * $x + $x * $x > 10 OR 1 + 1 == 2";
    let first = parse_optimized(&mut arena, &mut factorizer, &grammar, source);
    let printed = display(&arena, first);
    let second = parse_optimized(&mut arena, &mut factorizer, &grammar, source);

    assert_eq!(first, second, "reparsing resolves to the same nodes");
    assert_eq!(display(&arena, second), printed, "printed form is stable");
}

#[test]
fn reset_forgets_recorded_nodes() {
    let grammar = fact_grammar();
    let mut arena = ExprArena::new();
    let mut factorizer = Factorizer::new();
    let first = parse_optimized(&mut arena, &mut factorizer, &grammar, "$x + 1");
    factorizer.reset();
    let second = parse_optimized(&mut arena, &mut factorizer, &grammar, "$x + 1");
    assert_ne!(first, second, "after reset nothing is shared");
}
