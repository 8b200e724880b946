//! End-to-end scenarios over a Flight/Customer/Service domain:
//! parsing, evaluation, NaN discipline, filters, casts and
//! printed-form round-trips.

use std::cell::Cell;
use std::rc::Rc;

use pretty_assertions::assert_eq;

use verdict::{
    register_attribute, register_fact, register_iterable, register_optional_attribute,
    register_random_access, register_string_cast, set_fact, Context, Formula, FormulaError,
    Grammar, SizeHint,
};

#[derive(Debug)]
struct Service {
    code: String,
    rfic: String,
}

// Services compare by code; the RFIC is carrier metadata.
impl PartialEq for Service {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}

verdict::fact_object!(Service);

#[derive(Debug, PartialEq)]
struct Flight {
    departure_country: String,
    expected_load_factor: f64,
    cabin: String,
}

impl Flight {
    fn has_expected_load_factor(&self) -> bool {
        self.expected_load_factor != -1.0
    }
}

verdict::fact_object!(Flight);

#[derive(Debug, PartialEq)]
struct Customer {
    name: String,
    value: i64,
    gender: char,
    services: Vec<Service>,
    preference: Service,
}

verdict::fact_object!(Customer);

fn service(code: &str, rfic: &str) -> Service {
    Service {
        code: code.to_string(),
        rfic: rfic.to_string(),
    }
}

fn sample_flight() -> Flight {
    Flight {
        departure_country: "FR".to_string(),
        expected_load_factor: 0.46,
        cabin: "Y".to_string(),
    }
}

fn elf_less_flight() -> Flight {
    Flight {
        departure_country: "FR".to_string(),
        expected_load_factor: -1.0,
        cabin: "Y".to_string(),
    }
}

fn sample_customer() -> Customer {
    Customer {
        name: "Bob".to_string(),
        value: 350,
        gender: 'M',
        services: vec![
            service("VGML", "M"),
            service("WIFI", "T"),
            service("LNGE", "T"),
            service("PETC", "S"),
        ],
        preference: service("VGML", ""),
    }
}

fn domain_grammar() -> Grammar {
    let mut g = Grammar::with_standard_ops();
    g.register_type::<Flight>("Flight");
    g.register_type::<Customer>("Customer");
    g.register_type::<Service>("Service");

    register_iterable::<Service, Vec<Service>>(&mut g, "ServiceList", SizeHint::Counted).unwrap();
    register_random_access::<Service, Vec<Service>>(&mut g, "ServiceList").unwrap();

    register_attribute::<Flight, String, _>(&mut g, "DepartureCountry", |f| {
        &f.departure_country
    })
    .unwrap();
    register_optional_attribute::<Flight, f64, _, _>(
        &mut g,
        "ExpectedLoadFactor",
        |f| &f.expected_load_factor,
        Flight::has_expected_load_factor,
    )
    .unwrap();
    register_attribute::<Flight, String, _>(&mut g, "Cabin", |f| &f.cabin).unwrap();

    register_attribute::<Customer, String, _>(&mut g, "Name", |c| &c.name).unwrap();
    register_attribute::<Customer, char, _>(&mut g, "Gender", |c| &c.gender).unwrap();
    register_attribute::<Customer, i64, _>(&mut g, "Value", |c| &c.value).unwrap();
    register_attribute::<Customer, Vec<Service>, _>(&mut g, "Services", |c| &c.services).unwrap();
    register_attribute::<Customer, Service, _>(&mut g, "Preference", |c| &c.preference).unwrap();

    register_attribute::<Service, String, _>(&mut g, "code", |s| &s.code).unwrap();
    register_attribute::<Service, String, _>(&mut g, "rfic", |s| &s.rfic).unwrap();
    register_string_cast::<Service, _>(&mut g, |code| Service {
        code: code.to_string(),
        rfic: String::new(),
    })
    .unwrap();

    register_fact::<Flight>(&mut g, "Flight").unwrap();
    register_fact::<Customer>(&mut g, "Customer").unwrap();
    g
}

fn customer_ctx<'a>(g: &Grammar, customer: &'a Customer) -> Context<'a> {
    let mut ctx = Context::new();
    set_fact(g, &mut ctx, "Customer", customer).unwrap();
    ctx
}

/// Evaluate a boolean formula and its printed form against fresh
/// contexts over the same facts; both must agree.
fn check_bool_round_trip(g: &Grammar, customer: &Customer, source: &str, expected: bool) {
    let formula = Formula::parse(g, source).unwrap();
    let mut ctx = customer_ctx(g, customer);
    assert_eq!(formula.eval_bool(&mut ctx).unwrap(), expected, "{source}");

    let printed = formula.to_string();
    let reparsed = Formula::parse(g, &printed).unwrap();
    let mut ctx = customer_ctx(g, customer);
    assert_eq!(
        reparsed.eval_bool(&mut ctx).unwrap(),
        expected,
        "round-trip of {source} as {printed}"
    );
}

// Scenario S1
#[test]
fn boolean_combination_of_comparisons() {
    let g = Grammar::with_standard_ops();
    let formula = Formula::parse(&g, "(6 >= 5) AND (4 > 3)").unwrap();
    let mut ctx = Context::new();
    assert!(formula.eval_bool(&mut ctx).unwrap());
}

// Scenario S2
#[test]
fn choice_picks_the_else_branch() {
    let g = Grammar::with_standard_ops();
    let formula = Formula::parse(&g, "-6 > 5 ? 'Wrong' : 'Right'").unwrap();
    let mut ctx = Context::new();
    assert_eq!(formula.eval_str(&mut ctx).unwrap(), "Right");
}

// Scenario S3
#[test]
fn int_cast_rounds_half_away_from_zero() {
    let g = Grammar::with_standard_ops();
    let formula = Formula::parse(&g, "(int)65.89").unwrap();
    let mut ctx = Context::new();
    assert_eq!(formula.eval_int(&mut ctx).unwrap(), 66);
}

// Scenario S4
#[test]
fn indexed_attribute_access() {
    let g = domain_grammar();
    let customer = sample_customer();
    check_bool_round_trip(&g, &customer, "$Customer.Services[2].code == 'LNGE'", true);
}

// Scenario S5
#[test]
fn filter_count_over_services() {
    let g = domain_grammar();
    let customer = sample_customer();
    check_bool_round_trip(
        &g,
        &customer,
        "($Customer.Services -> Svc ? $Svc.code == 'WIFI').count == 1",
        true,
    );
}

// Scenario S6
#[test]
fn or_recovers_a_missing_left_operand() {
    let g = domain_grammar();
    let flight = elf_less_flight();
    let formula =
        Formula::parse(&g, "$Flight.ExpectedLoadFactor <= 0.5 || $Flight.Cabin == \"Y\"").unwrap();
    let mut ctx = Context::new();
    set_fact(&g, &mut ctx, "Flight", &flight).unwrap();
    assert!(formula.eval_bool(&mut ctx).unwrap());
    assert!(!ctx.is_nan());
}

// Scenario S7
#[test]
fn or_with_both_sides_missing_stays_nan() {
    let g = domain_grammar();
    let flight = elf_less_flight();
    let formula = Formula::parse(
        &g,
        "$Flight.ExpectedLoadFactor <= 0.5 || $Flight.ExpectedLoadFactor > 2.0",
    )
    .unwrap();
    let mut ctx = Context::new();
    set_fact(&g, &mut ctx, "Flight", &flight).unwrap();
    formula.eval_bool(&mut ctx).unwrap();
    assert!(ctx.is_nan(), "the surviving NaN marks the value as unusable");
}

// Scenario S8
#[test]
fn string_indexing_compares_bytes() {
    let g = Grammar::with_standard_ops();
    let formula = Formula::parse(&g, "'Pouet'[2] == 'u'[0] && 'Pouet'[1] != 'u'[0]").unwrap();
    let mut ctx = Context::new();
    assert!(formula.eval_bool(&mut ctx).unwrap());
}

#[test]
fn remaining_or_orderings_from_the_nan_battery() {
    let g = domain_grammar();
    let flight = elf_less_flight();

    let swapped =
        Formula::parse(&g, "$Flight.Cabin == \"Y\" || $Flight.ExpectedLoadFactor <= 0.5").unwrap();
    let mut ctx = Context::new();
    set_fact(&g, &mut ctx, "Flight", &flight).unwrap();
    assert!(swapped.eval_bool(&mut ctx).unwrap());
    assert!(!ctx.is_nan());

    let negative =
        Formula::parse(&g, "$Flight.ExpectedLoadFactor <= 0.5 || $Flight.Cabin != \"Y\"").unwrap();
    let mut ctx = Context::new();
    set_fact(&g, &mut ctx, "Flight", &flight).unwrap();
    assert!(!negative.eval_bool(&mut ctx).unwrap());
    assert!(!ctx.is_nan());
}

#[test]
fn and_propagates_the_missing_value() {
    let g = domain_grammar();
    let flight = elf_less_flight();
    let formula = Formula::parse(
        &g,
        "$Flight.ExpectedLoadFactor <= 0.5 && $Flight.Cabin == \"Y\"",
    )
    .unwrap();
    let mut ctx = Context::new();
    set_fact(&g, &mut ctx, "Flight", &flight).unwrap();
    formula.eval_bool(&mut ctx).unwrap();
    assert!(ctx.is_nan());
}

#[test]
fn preference_attribute_chain() {
    let g = domain_grammar();
    let customer = sample_customer();
    let formula = Formula::parse(&g, "$Customer.Preference.code").unwrap();
    let mut ctx = customer_ctx(&g, &customer);
    assert_eq!(formula.eval_str(&mut ctx).unwrap(), "VGML");
}

#[test]
fn containment_with_host_casts() {
    let g = domain_grammar();
    let customer = sample_customer();
    check_bool_round_trip(
        &g,
        &customer,
        "$Customer.Services[2] in $Customer.Services && \
         (Service)'PETC' in $Customer.Services && \
         !((Service)'PETB' in $Customer.Services)",
        true,
    );
}

#[test]
fn filter_empty_and_count_agree() {
    let g = domain_grammar();
    let customer = sample_customer();
    check_bool_round_trip(
        &g,
        &customer,
        "!($Customer.Services -> Svc ? $Svc.code == 'WIFI').empty &&\
         ($Customer.Services -> Svc ? $Svc.code == 'SCHTROUMPF').empty",
        true,
    );
    check_bool_round_trip(
        &g,
        &customer,
        "($Customer.Services -> Svc ? $Svc.code == 'WIFI').count == 1 &&\
         ($Customer.Services -> Svc ? $Svc.code == 'SCHTROUMPF').count == 0",
        true,
    );
}

#[test]
fn nested_filters_with_string_indexing() {
    let g = domain_grammar();
    let customer = sample_customer();
    check_bool_round_trip(
        &g,
        &customer,
        "(($Customer.Services -> Svc ? $Svc.code == 'VGML') -> v2 ? \
         !$v2.rfic.empty && ($v2.rfic[0] == $Customer.Gender)).count == 1",
        true,
    );
}

#[test]
fn primitive_facts_and_context_isolation() {
    let mut g = Grammar::with_standard_ops();
    register_fact::<f64>(&mut g, "Test").unwrap();
    register_fact::<String>(&mut g, "TestString").unwrap();
    register_fact::<bool>(&mut g, "TestBool").unwrap();

    let five = 5.0f64;
    let twenty = 20.0f64;
    let this_is = "ThisIsATest".to_string();
    let haha = "Haha".to_string();
    let no = false;
    let yes = true;

    let mut ctx1 = Context::new();
    set_fact(&g, &mut ctx1, "Test", &five).unwrap();
    set_fact(&g, &mut ctx1, "TestString", &this_is).unwrap();
    set_fact(&g, &mut ctx1, "TestBool", &no).unwrap();

    let mut ctx2 = Context::new();
    set_fact(&g, &mut ctx2, "Test", &twenty).unwrap();
    set_fact(&g, &mut ctx2, "TestString", &haha).unwrap();
    set_fact(&g, &mut ctx2, "TestBool", &yes).unwrap();

    let eq_string = Formula::parse(&g, "$TestString == \"ThisIsATest\"").unwrap();
    assert!(eq_string.eval_bool(&mut ctx1).unwrap());
    assert!(!eq_string.eval_bool(&mut ctx2).unwrap());

    let mixed = Formula::parse(
        &g,
        "(($TestString == \"Haha\") AND ($Test > (double)2)) OR $Test == 5.",
    )
    .unwrap();
    assert!(mixed.eval_bool(&mut ctx1).unwrap());

    let cast_compare = Formula::parse(&g, "(($TestString == \"Haha\") AND ((int)$Test > 2))")
        .unwrap();
    assert!(!cast_compare.eval_bool(&mut ctx1).unwrap());
    assert!(cast_compare.eval_bool(&mut ctx2).unwrap());

    let to_bool = Formula::parse(
        &g,
        "(($TestString == \"Haha\") OR ((int)$Test > 2)) == true",
    )
    .unwrap();
    assert!(to_bool.eval_bool(&mut ctx1).unwrap());

    let against_fact = Formula::parse(&g, "(($TestString == 'Haha') AND ($Test > 2.)) == $TestBool")
        .unwrap();
    assert!(against_fact.eval_bool(&mut ctx1).unwrap());
    assert!(against_fact.eval_bool(&mut ctx2).unwrap());

    let square = Formula::parse(&g, "$Test * $Test").unwrap();
    assert_eq!(square.eval_double(&mut ctx1).unwrap(), 25.0);
    assert_eq!(square.eval_double(&mut ctx2).unwrap(), 400.0);

    let arithmetic = Formula::parse(&g, "((($Test * $Test) + 2. - (double)2) * 2.) / $Test")
        .unwrap();
    assert_eq!(arithmetic.eval_double(&mut ctx1).unwrap(), 10.0);

    let equality = Formula::parse(
        &g,
        "(((($Test * $Test) + 2. - 2.) * 2.) / $Test) == $Test * 2.",
    )
    .unwrap();
    assert!(equality.eval_bool(&mut ctx1).unwrap());

    let dates = Formula::parse(&g, "\"2015-02-10\" >= \"2014-02-10\"").unwrap();
    assert!(dates.eval_bool(&mut ctx1).unwrap());
}

#[test]
fn short_circuits_skip_the_discarded_operand() {
    let mut g = Grammar::with_standard_ops();
    register_fact::<i64>(&mut g, "x").unwrap();

    let zero = 0i64;
    let or = Formula::parse(&g, "$x == 0 || 10 / $x > 1").unwrap();
    let mut ctx = Context::new();
    set_fact(&g, &mut ctx, "x", &zero).unwrap();
    assert!(or.eval_bool(&mut ctx).unwrap(), "the division never runs");

    let and = Formula::parse(&g, "$x != 0 && 10 / $x > 1").unwrap();
    let mut ctx = Context::new();
    set_fact(&g, &mut ctx, "x", &zero).unwrap();
    assert!(!and.eval_bool(&mut ctx).unwrap());
}

#[test]
fn division_by_zero_surfaces_when_actually_evaluated() {
    let g = Grammar::with_standard_ops();
    let formula = Formula::parse_plain(&g, "10 / 0 > 1").unwrap();
    let mut ctx = Context::new();
    let err = formula.eval_bool(&mut ctx).unwrap_err();
    assert!(matches!(err, FormulaError::ValueMissing(_)));
}

#[test]
fn filter_predicates_fire_once_per_element() {
    let mut g = domain_grammar();
    let probe = Rc::new(Cell::new(0u32));
    let counter = probe.clone();
    register_attribute::<Service, String, _>(&mut g, "probed", move |s| {
        counter.set(counter.get() + 1);
        &s.code
    })
    .unwrap();

    let customer = sample_customer();
    let count = Formula::parse(&g, "($Customer.Services -> S ? $S.probed == 'WIFI').count")
        .unwrap();
    let mut ctx = customer_ctx(&g, &customer);
    assert_eq!(count.eval_int(&mut ctx).unwrap(), 1);
    assert_eq!(probe.get(), 4, "one probe per element, nothing materialised");

    probe.set(0);
    let empty = Formula::parse(&g, "($Customer.Services -> S ? $S.probed == 'WIFI').empty")
        .unwrap();
    let mut ctx = customer_ctx(&g, &customer);
    assert!(!empty.eval_bool(&mut ctx).unwrap());
    assert_eq!(
        probe.get(),
        2,
        "emptiness stops at the first passing element"
    );
}

#[test]
fn filters_exclude_nan_elements_without_poisoning_neighbours() {
    let mut g = Grammar::with_standard_ops();

    #[derive(Debug, PartialEq)]
    struct Leg {
        load: f64,
    }
    verdict::fact_object!(Leg);

    g.register_type::<Leg>("Leg");
    register_iterable::<Leg, Vec<Leg>>(&mut g, "LegList", SizeHint::Counted).unwrap();
    register_optional_attribute::<Leg, f64, _, _>(
        &mut g,
        "Load",
        |l| &l.load,
        |l| l.load != -1.0,
    )
    .unwrap();
    register_fact::<Vec<Leg>>(&mut g, "Legs").unwrap();

    let legs = vec![Leg { load: 0.3 }, Leg { load: -1.0 }, Leg { load: 0.9 }];
    let formula = Formula::parse(&g, "($Legs -> L ? $L.Load > 0.2).count").unwrap();
    let mut ctx = Context::new();
    set_fact(&g, &mut ctx, "Legs", &legs).unwrap();
    assert_eq!(
        formula.eval_int(&mut ctx).unwrap(),
        2,
        "the NaN leg is excluded, its neighbours are kept"
    );
    assert!(!ctx.is_nan());
}

#[test]
fn typed_evaluation_rejects_the_wrong_type() {
    let g = Grammar::with_standard_ops();
    let formula = Formula::parse(&g, "1 + 1").unwrap();
    let mut ctx = Context::new();
    let err = formula.eval_bool(&mut ctx).unwrap_err();
    match err {
        FormulaError::TypeMismatch {
            expected, actual, ..
        } => {
            assert_eq!(expected, "bool");
            assert_eq!(actual, "int");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn cleaned_contexts_forget_their_facts() {
    let mut g = Grammar::with_standard_ops();
    register_fact::<i64>(&mut g, "x").unwrap();
    let formula = Formula::parse(&g, "$x + 1").unwrap();

    let one = 1i64;
    let mut ctx = Context::new();
    set_fact(&g, &mut ctx, "x", &one).unwrap();
    assert_eq!(formula.eval_int(&mut ctx).unwrap(), 2);

    let before = ctx.unique_id();
    ctx.clean();
    assert_ne!(ctx.unique_id(), before);
    let err = formula.eval_int(&mut ctx).unwrap_err();
    assert!(matches!(err, FormulaError::MissingFact(_)));
}
