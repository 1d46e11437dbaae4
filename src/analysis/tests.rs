//! End-to-end analysis scenarios with literal expected outputs

use super::*;
use crate::model::{BasicEvent, Connective as Mc, Expression, Formula, Model};

const ABC_MODEL: &str = "top := a * b + b * c\n\
                         p(a) = 0.1\n\
                         p(b) = 0.2\n\
                         p(c) = 0.3\n";

fn analyze(text: &str, settings: Settings) -> FaultTreeAnalysis<'static> {
    let model = Box::leak(Box::new(Model::parse(text).unwrap()));
    let top = model.first_gate().expect("Model without gates.").to_string();
    let mut analysis = FaultTreeAnalysis::new(model, &top, settings).unwrap();
    analysis.analyze().unwrap();
    analysis
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-12,
        "expected {}, got {}",
        expected,
        actual
    );
}

fn importance_of<'a>(analysis: &'a FaultTreeAnalysis, id: &str) -> &'a ImportanceFactors {
    &analysis
        .importance()
        .iter()
        .find(|record| record.event_id == id)
        .unwrap_or_else(|| panic!("No importance record for {}", id))
        .factors
}

#[test]
fn test_scenario_two_products() {
    let analysis = analyze(ABC_MODEL, Settings::default());
    assert_eq!(analysis.products(), &[vec![2, 3], vec![3, 4]]);
    assert_eq!(analysis.max_order(), 2);
    assert_close(analysis.total_probability().unwrap(), 0.074);
}

#[test]
fn test_scenario_two_products_rare_event() {
    let mut settings = Settings::default();
    settings
        .approximation(crate::Approximation::RareEvent)
        .unwrap();
    let analysis = analyze(ABC_MODEL, settings);
    assert_close(analysis.total_probability().unwrap(), 0.08);
}

#[test]
fn test_scenario_two_products_mcub() {
    let mut settings = Settings::default();
    settings.approximation(crate::Approximation::Mcub).unwrap();
    let analysis = analyze(ABC_MODEL, settings);
    assert_close(analysis.total_probability().unwrap(), 1.0 - 0.98 * 0.94);
}

#[test]
fn test_scenario_single_events() {
    let text = "top := a + b + c\n\
                p(a) = 0.1\n\
                p(b) = 0.2\n\
                p(c) = 0.3\n";
    let analysis = analyze(text, Settings::default());
    assert_eq!(analysis.products(), &[vec![2], vec![3], vec![4]]);
    assert_close(analysis.total_probability().unwrap(), 0.496);

    let mut settings = Settings::default();
    settings
        .approximation(crate::Approximation::RareEvent)
        .unwrap();
    let analysis = analyze(text, settings);
    assert_close(analysis.total_probability().unwrap(), 0.6);
}

#[test]
fn test_scenario_two_of_three() {
    let text = "top := @(2, [a, b, c])\n\
                p(a) = 0.1\n\
                p(b) = 0.2\n\
                p(c) = 0.3\n";
    let analysis = analyze(text, Settings::default());
    assert_eq!(
        analysis.products(),
        &[vec![2, 3], vec![2, 4], vec![3, 4]]
    );
    assert_close(analysis.total_probability().unwrap(), 0.098);
}

#[test]
fn test_scenario_xor_prime_implicants() {
    let text = "top := a ^ b ^ c\n\
                p(a) = 0.1\n\
                p(b) = 0.2\n\
                p(c) = 0.3\n";
    let mut settings = Settings::default();
    settings.prime_implicants(true).unwrap();
    let analysis = analyze(text, settings);
    assert_eq!(
        analysis.products(),
        &[
            vec![-2, -3, 4],
            vec![-2, 3, -4],
            vec![2, -3, -4],
            vec![2, 3, 4],
        ]
    );
    assert_close(analysis.total_probability().unwrap(), 0.404);
}

#[test]
fn test_scenario_unity() {
    let analysis = analyze("top := a + ~a\np(a) = 0.5\n", Settings::default());
    assert_eq!(analysis.products(), &[Vec::<i32>::new()]);
    assert_close(analysis.total_probability().unwrap(), 1.0);
    assert!(!analysis.warnings().is_empty());
}

#[test]
fn test_scenario_null_set() {
    let analysis = analyze("top := a * ~a\np(a) = 0.5\n", Settings::default());
    assert!(analysis.products().is_empty());
    assert_close(analysis.total_probability().unwrap(), 0.0);
}

#[test]
fn test_importance_factors_exact() {
    let analysis = analyze(ABC_MODEL, Settings::default());
    let p_total = 0.074;

    let a = importance_of(&analysis, "a");
    assert_eq!(a.occurrence, 1);
    assert_close(a.mif, 0.14);
    assert_close(a.cif, 0.1 * 0.14 / p_total);
    assert_close(a.raw, 1.0 + 0.9 * 0.14 / p_total);
    assert_close(a.dif, 0.1 * a.raw);
    assert_close(a.rrw, p_total / (p_total - 0.1 * 0.14));

    let b = importance_of(&analysis, "b");
    assert_eq!(b.occurrence, 2);
    assert_close(b.mif, 0.37);

    let c = importance_of(&analysis, "c");
    assert_eq!(c.occurrence, 1);
    assert_close(c.mif, 0.18);

    // MIF stays within probability bounds.
    for record in analysis.importance() {
        assert!(record.factors.mif >= 0.0 && record.factors.mif <= 1.0);
    }
}

#[test]
fn test_importance_factors_rare_event() {
    let mut settings = Settings::default();
    settings
        .approximation(crate::Approximation::RareEvent)
        .unwrap();
    let analysis = analyze(ABC_MODEL, settings);
    // d/dp(a) of (p(a)p(b) + p(b)p(c)) is p(b).
    let a = importance_of(&analysis, "a");
    assert_close(a.mif, 0.2);
    let b = importance_of(&analysis, "b");
    assert_close(b.mif, 0.1 + 0.3);
}

#[test]
fn test_importance_skips_absent_events() {
    // d never appears in any product.
    let text = "top := a + a * d\n\
                p(a) = 0.1\n\
                p(d) = 0.9\n";
    let analysis = analyze(text, Settings::default());
    assert_eq!(analysis.products(), &[vec![2]]);
    assert!(analysis
        .importance()
        .iter()
        .all(|record| record.event_id != "d"));
}

#[test]
fn test_cut_off_drops_products() {
    let mut settings = Settings::default();
    settings.cut_off(0.05).unwrap();
    let analysis = analyze(ABC_MODEL, settings);
    // P{a,b} = 0.02 falls below the cut-off; P{b,c} = 0.06 stays.
    assert_eq!(analysis.products(), &[vec![3, 4]]);
    // The exact probability is unaffected by reporting cut-offs.
    assert_close(analysis.total_probability().unwrap(), 0.074);
}

#[test]
fn test_backends_agree() {
    for algorithm in [
        crate::Algorithm::Bdd,
        crate::Algorithm::Zbdd,
        crate::Algorithm::Mocus,
    ] {
        let mut settings = Settings::default();
        settings.algorithm(algorithm).unwrap();
        let analysis = analyze(ABC_MODEL, settings);
        assert_eq!(
            analysis.products(),
            &[vec![2, 3], vec![3, 4]],
            "{} backend products",
            algorithm
        );
        assert_close(analysis.total_probability().unwrap(), 0.074);
    }
}

#[test]
fn test_house_events_toggle_branches() {
    let text = "top := a + standby\n\
                s(standby) = false\n\
                p(a) = 0.25\n";
    let analysis = analyze(text, Settings::default());
    assert_eq!(analysis.products(), &[vec![2]]);
    assert_close(analysis.total_probability().unwrap(), 0.25);

    let text = "top := a + standby\n\
                s(standby) = true\n\
                p(a) = 0.25\n";
    let analysis = analyze(text, Settings::default());
    assert_eq!(analysis.products(), &[Vec::<i32>::new()]);
    assert_close(analysis.total_probability().unwrap(), 1.0);
}

#[test]
fn test_mission_time_dependent_probability() {
    let mut model = Model::new();
    model
        .add_basic_event(BasicEvent::new(
            "pump",
            Expression::Exponential { rate: 1e-4 },
        ))
        .unwrap();
    model
        .add_gate("top", Formula::new(Mc::Null).arg("pump"))
        .unwrap();
    let mut settings = Settings::default();
    settings.mission_time(1000.0).unwrap();
    let mut analysis = FaultTreeAnalysis::new(&model, "top", settings).unwrap();
    analysis.analyze().unwrap();
    assert_close(
        analysis.total_probability().unwrap(),
        1.0 - (-0.1f64).exp(),
    );
}

#[test]
fn test_invalid_probability_fails_analysis() {
    let model = Model::parse("top := a * b\np(a) = 0.1\n").unwrap();
    // Force an out-of-range value through the expression API.
    let mut model = model;
    model
        .add_basic_event(BasicEvent::new("x", Expression::Constant(1.5)))
        .unwrap();
    model
        .add_gate("bad", Formula::new(Mc::And).arg("a").arg("x"))
        .unwrap();
    let mut analysis =
        FaultTreeAnalysis::new(&model, "bad", Settings::default()).unwrap();
    let result = analysis.analyze();
    assert!(matches!(
        result,
        Err(AnalysisError::Validity(
            crate::error::ValidityError::InvalidProbability { .. }
        ))
    ));
}

#[test]
fn test_unknown_top_event() {
    let model = Model::parse("top := a * b\n").unwrap();
    let result = FaultTreeAnalysis::new(&model, "ghost", Settings::default());
    assert!(result.is_err());
}

#[test]
fn test_ccf_substitution() {
    // Both motors share a common-cause proxy gate: failure of either
    // independent part or the common cause.
    let mut model = Model::new();
    model
        .add_basic_event(BasicEvent::new("m1-ind", Expression::Constant(0.01)))
        .unwrap();
    model
        .add_basic_event(BasicEvent::new("m2-ind", Expression::Constant(0.01)))
        .unwrap();
    model
        .add_basic_event(BasicEvent::new("common", Expression::Constant(0.001)))
        .unwrap();
    model
        .add_basic_event(
            BasicEvent::new("m1", Expression::Constant(0.011)).with_ccf_gate("ccf-m1"),
        )
        .unwrap();
    model
        .add_basic_event(
            BasicEvent::new("m2", Expression::Constant(0.011)).with_ccf_gate("ccf-m2"),
        )
        .unwrap();
    model
        .add_gate("ccf-m1", Formula::new(Mc::Or).arg("m1-ind").arg("common"))
        .unwrap();
    model
        .add_gate("ccf-m2", Formula::new(Mc::Or).arg("m2-ind").arg("common"))
        .unwrap();
    model
        .add_gate("top", Formula::new(Mc::And).arg("m1").arg("m2"))
        .unwrap();

    // Without CCF analysis the motors are independent variables.
    let mut analysis =
        FaultTreeAnalysis::new(&model, "top", Settings::default()).unwrap();
    analysis.analyze().unwrap();
    assert_eq!(analysis.products().len(), 1);
    assert_eq!(analysis.products()[0].len(), 2);

    // With CCF analysis the common cause becomes a first-order cut set.
    let mut settings = Settings::default();
    settings.ccf_analysis(true);
    let mut analysis = FaultTreeAnalysis::new(&model, "top", settings).unwrap();
    analysis.analyze().unwrap();
    let singletons: Vec<&Vec<i32>> = analysis
        .products()
        .iter()
        .filter(|product| product.len() == 1)
        .collect();
    assert_eq!(singletons.len(), 1, "The common cause must appear alone.");
    assert_eq!(
        analysis.basic_event_id(singletons[0][0]),
        "common"
    );
}

#[test]
fn test_product_ordering_by_size_then_lexicographic() {
    let text = "top := b * c + a\n\
                p(a) = 0.1\n\
                p(b) = 0.2\n\
                p(c) = 0.3\n";
    let analysis = analyze(text, Settings::default());
    // Size first: the singleton precedes the pair.
    assert_eq!(analysis.products()[0].len(), 1);
    assert_eq!(analysis.products()[1].len(), 2);
}
