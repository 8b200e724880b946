//! Grammar dispatch and standard-operator tests over hand-assembled
//! trees (the parser lives one crate up).

use std::rc::Rc;

use pretty_assertions::assert_eq;

use verdict_expr::{
    display, evaluate, Context, EvalCx, ExprArena, ExprId, FormulaError, OwnedValue, TypeId,
};

use super::*;

fn int(arena: &mut ExprArena, v: i64) -> ExprId {
    arena.const_expr(OwnedValue::Int(v))
}

fn dbl(arena: &mut ExprArena, v: f64) -> ExprId {
    arena.const_expr(OwnedValue::Double(v))
}

fn string(arena: &mut ExprArena, v: &str) -> ExprId {
    arena.const_expr(OwnedValue::Str(Rc::from(v)))
}

fn eval_int(arena: &ExprArena, id: ExprId) -> i64 {
    let mut ctx = Context::new();
    evaluate(arena, id, &mut ctx).unwrap().as_int().unwrap()
}

fn eval_bool(arena: &ExprArena, id: ExprId) -> bool {
    let mut ctx = Context::new();
    evaluate(arena, id, &mut ctx).unwrap().as_bool().unwrap()
}

#[test]
fn standard_int_arithmetic() {
    let grammar = Grammar::with_standard_ops();
    let mut arena = ExprArena::new();
    let a = int(&mut arena, 524);
    let b = int(&mut arena, 87);
    let sum = grammar.instantiate_binary(&mut arena, a, b, "+").unwrap();
    assert_eq!(eval_int(&arena, sum), 611);
    assert_eq!(display(&arena, sum), "(524)+(87)");
}

#[test]
fn division_by_zero_is_a_missing_value() {
    let grammar = Grammar::with_standard_ops();
    let mut arena = ExprArena::new();
    let a = int(&mut arena, 10);
    let b = int(&mut arena, 0);
    let div = grammar.instantiate_binary(&mut arena, a, b, "/").unwrap();
    let mut ctx = Context::new();
    let err = evaluate(&arena, div, &mut ctx).unwrap_err();
    assert!(matches!(err, FormulaError::ValueMissing(_)));
}

#[test]
fn relations_yield_bool() {
    let grammar = Grammar::with_standard_ops();
    let mut arena = ExprArena::new();
    let a = int(&mut arena, 6);
    let b = int(&mut arena, 5);
    let ge = grammar.instantiate_binary(&mut arena, a, b, ">=").unwrap();
    assert!(eval_bool(&arena, ge));
    assert_eq!(arena.out_type(ge), TypeId::BOOL);
}

#[test]
fn unknown_operator_reports_both_type_names() {
    let grammar = Grammar::with_standard_ops();
    let mut arena = ExprArena::new();
    let a = int(&mut arena, 1);
    let b = string(&mut arena, "x");
    let err = grammar
        .instantiate_binary(&mut arena, a, b, "+")
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "operator not found: + on types int and string"
    );
}

#[test]
fn double_to_int_cast_rounds() {
    let grammar = Grammar::with_standard_ops();
    let mut arena = ExprArena::new();
    let v = dbl(&mut arena, 65.89);
    let cast = grammar.instantiate_unary(&mut arena, v, "(int)").unwrap();
    assert_eq!(eval_int(&arena, cast), 66);
    assert_eq!(display(&arena, cast), "(int)(65.89)");
}

#[test]
fn string_casts_parse_signed_prefixes() {
    let grammar = Grammar::with_standard_ops();
    let mut arena = ExprArena::new();
    let v = string(&mut arena, "-23");
    let cast = grammar.instantiate_unary(&mut arena, v, "(int)").unwrap();
    assert_eq!(eval_int(&arena, cast), -23);
}

#[test]
fn string_indexing_yields_bytes_as_ints() {
    let grammar = Grammar::with_standard_ops();
    let mut arena = ExprArena::new();
    let s = string(&mut arena, "Pouet");
    let i = int(&mut arena, 2);
    let at = grammar.instantiate_binary(&mut arena, s, i, "[]").unwrap();
    assert_eq!(eval_int(&arena, at), i64::from(b'u'));
    assert_eq!(display(&arena, at), "('Pouet')[2]");
}

#[test]
fn chained_grammars_fall_through() {
    let parent = Rc::new(Grammar::with_standard_ops());
    let mut child = Grammar::new();
    child.link_parent(parent);
    let mut arena = ExprArena::new();
    let a = int(&mut arena, 1);
    let b = int(&mut arena, 2);
    let sum = child.instantiate_binary(&mut arena, a, b, "+").unwrap();
    assert_eq!(eval_int(&arena, sum), 3);
}

#[derive(Debug, PartialEq)]
struct Service {
    code: String,
}

verdict_expr::fact_object!(Service);

fn service(code: &str) -> Service {
    Service {
        code: code.to_string(),
    }
}

fn customer_grammar() -> Grammar {
    let mut grammar = Grammar::with_standard_ops();
    grammar.register_type::<Service>("Service");
    register_iterable::<Service, Vec<Service>>(&mut grammar, "ServiceList", SizeHint::Counted)
        .unwrap();
    register_random_access::<Service, Vec<Service>>(&mut grammar, "ServiceList").unwrap();
    register_attribute::<Service, String, _>(&mut grammar, "code", |s| &s.code).unwrap();
    register_fact::<Vec<Service>>(&mut grammar, "Services").unwrap();
    grammar
}

#[test]
fn attributes_project_borrowed_fields() {
    let grammar = customer_grammar();
    let mut arena = ExprArena::new();
    let fact = grammar.instantiate_fact(&mut arena, "Services").unwrap();
    let two = int(&mut arena, 2);
    let at = grammar
        .instantiate_binary(&mut arena, fact, two, "[]")
        .unwrap();
    let code = grammar.instantiate_attribute(&mut arena, at, "code").unwrap();
    assert_eq!(display(&arena, code), "($Services)[2].code");

    let services = vec![service("VGML"), service("WIFI"), service("LNGE")];
    let mut ctx = Context::new();
    set_fact(&grammar, &mut ctx, "Services", &services).unwrap();
    let value = evaluate(&arena, code, &mut ctx).unwrap();
    assert_eq!(value.as_str(), Some("LNGE"));
}

#[test]
fn containment_scans_linearly() {
    let grammar = customer_grammar();
    let mut arena = ExprArena::new();
    let fact = grammar.instantiate_fact(&mut arena, "Services").unwrap();
    let petc = string(&mut arena, "PETC");
    let cast = grammar
        .instantiate_unary(&mut arena, petc, "(Service)")
        .unwrap_err();
    // No host cast registered yet: the lookup fails with the key.
    assert!(matches!(cast, FormulaError::OperatorNotFound { .. }));

    let mut grammar = customer_grammar();
    register_string_cast::<Service, _>(&mut grammar, service).unwrap();
    let petc = string(&mut arena, "PETC");
    let cast = grammar
        .instantiate_unary(&mut arena, petc, "(Service)")
        .unwrap();
    let contains = grammar
        .instantiate_binary(&mut arena, cast, fact, "in")
        .unwrap();
    assert_eq!(display(&arena, contains), "((Service)('PETC')) in ($Services)");

    let services = vec![service("VGML"), service("PETC")];
    let mut ctx = Context::new();
    set_fact(&grammar, &mut ctx, "Services", &services).unwrap();
    assert_eq!(
        evaluate(&arena, contains, &mut ctx).unwrap().as_bool(),
        Some(true)
    );
}

#[test]
fn filters_compose_and_stay_lazy() {
    let mut grammar = customer_grammar();
    register_fact::<Vec<Service>>(&mut grammar, "Svcs").unwrap();
    let mut arena = ExprArena::new();

    // ($Svcs -> S ? $S.code == 'WIFI').count
    let container = grammar.instantiate_fact(&mut arena, "Svcs").unwrap();
    let local = grammar
        .local_instantiator(arena.out_type(container))
        .unwrap()
        .unwrap();
    let binding = arena.intern("S");
    let local_fact = local.instantiate(&mut arena, &grammar, &binding).unwrap();
    let code = grammar
        .instantiate_attribute(&mut arena, local_fact, "code")
        .unwrap();
    let wifi = string(&mut arena, "WIFI");
    let eq = grammar
        .instantiate_binary(&mut arena, code, wifi, "==")
        .unwrap();
    let arrow = grammar
        .instantiate_arrow(&mut arena, container, eq, &binding)
        .unwrap();
    let count = grammar
        .instantiate_unary(&mut arena, arrow, "count")
        .unwrap();
    assert_eq!(
        display(&arena, count),
        "(($Svcs) -> S ? (($S.code)==('WIFI'))).count"
    );

    // Filter of filter: a second predicate over the first view. The
    // arrow over a filter resolves through the Filter<Service> keys.
    let filter_ty = arena.out_type(arrow);
    let nested_local = grammar.local_instantiator(filter_ty).unwrap().unwrap();
    let binding2 = arena.intern("S2");
    let local2 = nested_local
        .instantiate(&mut arena, &grammar, &binding2)
        .unwrap();
    let code2 = grammar
        .instantiate_attribute(&mut arena, local2, "code")
        .unwrap();
    let wifi2 = string(&mut arena, "WIFI");
    let eq2 = grammar
        .instantiate_binary(&mut arena, code2, wifi2, "==")
        .unwrap();
    let arrow2 = grammar
        .instantiate_arrow(&mut arena, arrow, eq2, &binding2)
        .unwrap();
    let count2 = grammar
        .instantiate_unary(&mut arena, arrow2, "count")
        .unwrap();

    let services = vec![
        service("VGML"),
        service("WIFI"),
        service("LNGE"),
        service("PETC"),
    ];
    let mut ctx = Context::new();
    set_fact(&grammar, &mut ctx, "Svcs", &services).unwrap();
    let mut cx = EvalCx::new(&arena, &mut ctx);
    assert_eq!(cx.eval(count).unwrap().as_int(), Some(1));
    let mut cx = EvalCx::new(&arena, &mut ctx);
    assert_eq!(cx.eval(count2).unwrap().as_int(), Some(1));
}

#[test]
fn optional_attributes_flag_nan() {
    struct Flight {
        elf: f64,
    }
    verdict_expr::fact_object!(Flight);
    impl PartialEq for Flight {
        fn eq(&self, other: &Self) -> bool {
            self.elf == other.elf
        }
    }

    let mut grammar = Grammar::with_standard_ops();
    grammar.register_type::<Flight>("Flight");
    register_optional_attribute::<Flight, f64, _, _>(
        &mut grammar,
        "ExpectedLoadFactor",
        |f| &f.elf,
        |f| f.elf != -1.0,
    )
    .unwrap();
    register_fact::<Flight>(&mut grammar, "Flight").unwrap();

    let mut arena = ExprArena::new();
    let fact = grammar.instantiate_fact(&mut arena, "Flight").unwrap();
    let elf = grammar
        .instantiate_attribute(&mut arena, fact, "ExpectedLoadFactor")
        .unwrap();
    assert_eq!(display(&arena, elf), "$Flight.ExpectedLoadFactor");

    let missing = Flight { elf: -1.0 };
    let mut ctx = Context::new();
    set_fact(&grammar, &mut ctx, "Flight", &missing).unwrap();
    let value = evaluate(&arena, elf, &mut ctx).unwrap();
    assert_eq!(value.as_double(), Some(0.0));
    assert!(ctx.is_nan());

    let present = Flight { elf: 0.46 };
    let mut ctx = Context::new();
    set_fact(&grammar, &mut ctx, "Flight", &present).unwrap();
    let value = evaluate(&arena, elf, &mut ctx).unwrap();
    assert_eq!(value.as_double(), Some(0.46));
    assert!(!ctx.is_nan());
}
