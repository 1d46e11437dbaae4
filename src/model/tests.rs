//! Tests for the model module

use super::*;

#[test]
fn test_expression_values() {
    assert_eq!(Expression::Constant(0.25).value(8760.0), 0.25);
    let exp = Expression::Exponential { rate: 0.0 };
    assert_eq!(exp.value(100.0), 0.0);
    let exp = Expression::Exponential { rate: 1e-3 };
    let p = exp.value(1000.0);
    assert!((p - (1.0 - (-1.0f64).exp())).abs() < 1e-12);
}

#[test]
fn test_basic_event_probability_contract() {
    let event = BasicEvent::new("a", Expression::Constant(0.3));
    assert_eq!(event.probability(1.0).unwrap(), 0.3);

    let bad = BasicEvent::new("b", Expression::Constant(1.5));
    assert!(matches!(
        bad.probability(1.0),
        Err(ValidityError::InvalidProbability { .. })
    ));
}

#[test]
fn test_duplicate_ids_rejected() {
    let mut model = Model::new();
    model
        .add_basic_event(BasicEvent::new("a", Expression::Constant(0.1)))
        .unwrap();
    let result = model.add_basic_event(BasicEvent::new("a", Expression::Constant(0.2)));
    assert!(matches!(result, Err(ValidityError::DuplicateId { .. })));

    let result = model.add_gate("a", Formula::new(Connective::Or).arg("x").arg("y"));
    assert!(matches!(result, Err(ValidityError::DuplicateId { .. })));
}

#[test]
fn test_formula_arity_validation() {
    let xor = Formula::new(Connective::Xor).arg("a");
    assert!(matches!(
        xor.validate("g"),
        Err(ValidityError::InvalidArity { .. })
    ));

    let not = Formula::new(Connective::Not).arg("a").arg("b");
    assert!(not.validate("g").is_err());

    let atleast = Formula::new(Connective::Atleast)
        .min_number(4)
        .arg("a")
        .arg("b")
        .arg("c");
    assert!(matches!(
        atleast.validate("g"),
        Err(ValidityError::InvalidMinNumber { .. })
    ));

    let good = Formula::new(Connective::Atleast)
        .min_number(2)
        .arg("a")
        .arg("b")
        .arg("c");
    assert!(good.validate("g").is_ok());
}

#[test]
fn test_cardinality_validation() {
    let bad = Formula::new(Connective::Cardinality)
        .min_number(2)
        .max_number(1)
        .arg("a")
        .arg("b");
    assert!(bad.validate("g").is_err());

    let good = Formula::new(Connective::Cardinality)
        .min_number(1)
        .max_number(2)
        .arg("a")
        .arg("b")
        .arg("c");
    assert!(good.validate("g").is_ok());
}

#[test]
fn test_parse_simple_model() {
    let model = Model::parse(
        "top := a * b + b * c\n\
         p(a) = 0.1\n\
         p(b) = 0.2\n\
         p(c) = 0.3\n",
    )
    .unwrap();

    assert_eq!(model.first_gate(), Some("top"));
    let formula = model.gate("top").unwrap();
    assert_eq!(formula.connective(), Connective::Or);
    assert_eq!(formula.args().len(), 2);
    assert_eq!(
        model.basic_event("a").unwrap().expression(),
        &Expression::Constant(0.1)
    );
    assert_eq!(
        model.basic_event("c").unwrap().expression(),
        &Expression::Constant(0.3)
    );
}

#[test]
fn test_parse_operators_and_parens() {
    let model = Model::parse("g := ~(a + b) & (c | d)\n").unwrap();
    let formula = model.gate("g").unwrap();
    assert_eq!(formula.connective(), Connective::And);
    assert!(formula.args()[0].complement);
    assert!(!formula.args()[1].complement);
}

#[test]
fn test_parse_atleast() {
    let model = Model::parse("vote := @(2, [a, b, c])\n").unwrap();
    let formula = model.gate("vote").unwrap();
    assert_eq!(formula.connective(), Connective::Atleast);
    assert_eq!(formula.min_number_value(), Some(2));
    assert_eq!(formula.args().len(), 3);
}

#[test]
fn test_parse_xor_chain() {
    let model = Model::parse("g := a ^ b ^ c\n").unwrap();
    let formula = model.gate("g").unwrap();
    assert_eq!(formula.connective(), Connective::Xor);
    assert_eq!(formula.args().len(), 2);
}

#[test]
fn test_parse_complement_literal() {
    let model = Model::parse("g := a * ~b\n").unwrap();
    let formula = model.gate("g").unwrap();
    assert!(!formula.args()[0].complement);
    assert!(formula.args()[1].complement);
}

#[test]
fn test_parse_house_events() {
    let model = Model::parse(
        "g := a + maintenance\n\
         s(maintenance) = false\n\
         p(a) = 0.5\n",
    )
    .unwrap();
    assert_eq!(model.house_event("maintenance"), Some(false));
    assert!(model.basic_event("maintenance").is_none());
}

#[test]
fn test_parse_comments_and_whitespace() {
    let model = Model::parse(
        "// the top event\n\
         top := a + b // inline tail\n\
         p(a) = 1e-3\n\
         p(b) = 0.5\n",
    )
    .unwrap();
    assert!(model.gate("top").is_some());
    assert_eq!(
        model.basic_event("a").unwrap().expression(),
        &Expression::Constant(1e-3)
    );
}

#[test]
fn test_parse_errors() {
    assert!(Model::parse("top := a +\n").is_err());
    assert!(Model::parse("top := (a + b\n").is_err());
    assert!(Model::parse("top ;= a\n").is_err());
    // Probability attached to a gate is rejected.
    assert!(Model::parse("top := a + b\np(top) = 0.5\n").is_err());
}

#[test]
fn test_references_default_to_basic_events() {
    let model = Model::parse("top := a * b\n").unwrap();
    assert_eq!(
        model.basic_event("a").unwrap().expression(),
        &Expression::Constant(0.0)
    );
}

#[test]
fn test_ccf_gate_reference() {
    let event = BasicEvent::new("m1", Expression::Constant(0.1)).with_ccf_gate("ccf-m1");
    assert_eq!(event.ccf_gate(), Some("ccf-m1"));
}

#[test]
fn test_parse_negated_top_reference() {
    let model = Model::parse("g := ~a\n").unwrap();
    let formula = model.gate("g").unwrap();
    assert_eq!(formula.connective(), Connective::Null);
    assert!(formula.args()[0].complement);
}
