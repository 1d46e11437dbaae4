//! Tests for the ZBDD engine

use std::rc::Rc;

use super::*;
use crate::bdd::Bdd;
use crate::model::Model;
use crate::pdag::preprocessor::Preprocessor;
use crate::pdag::Pdag;
use crate::settings::Settings;

fn products_via_bdd(text: &str, settings: &Settings) -> Vec<Vec<i32>> {
    let model = Model::parse(text).unwrap();
    let top = model.first_gate().expect("Model without gates.").to_string();
    let graph = Pdag::new(&model, &top, false).unwrap();
    Preprocessor::new(&graph).run(false);
    let mut bdd = Bdd::new(&graph, settings);
    let mut zbdd = Zbdd::from_bdd(&mut bdd, settings);
    zbdd.analyze();
    let mut products: Vec<Vec<i32>> = zbdd.products().collect();
    products.sort();
    products
}

fn products_via_pdag(text: &str, settings: &Settings) -> Vec<Vec<i32>> {
    let model = Model::parse(text).unwrap();
    let top = model.first_gate().expect("Model without gates.").to_string();
    let graph = Pdag::new(&model, &top, false).unwrap();
    Preprocessor::new(&graph).run(true);
    let mut zbdd = Zbdd::from_pdag(&graph, settings);
    zbdd.analyze();
    let mut products: Vec<Vec<i32>> = zbdd.products().collect();
    products.sort();
    products
}

#[test]
fn test_two_products() {
    // a = 2, b = 3, c = 4 in gathering order.
    let products = products_via_bdd("top := a * b + b * c\n", &Settings::default());
    assert_eq!(products, vec![vec![2, 3], vec![3, 4]]);
}

#[test]
fn test_single_events() {
    let products = products_via_bdd("top := a + b + c\n", &Settings::default());
    assert_eq!(products, vec![vec![2], vec![3], vec![4]]);
}

#[test]
fn test_two_of_three() {
    let products = products_via_bdd("top := @(2, [a, b, c])\n", &Settings::default());
    assert_eq!(products, vec![vec![2, 3], vec![2, 4], vec![3, 4]]);
}

#[test]
fn test_subsumption() {
    // a + a*b: the superset product must be subsumed.
    let products = products_via_bdd("top := a + a * b\n", &Settings::default());
    assert_eq!(products, vec![vec![2]]);
}

#[test]
fn test_unity_function() {
    let products = products_via_bdd("top := a + ~a\n", &Settings::default());
    assert_eq!(products, vec![Vec::<i32>::new()]);
}

#[test]
fn test_empty_function() {
    let products = products_via_bdd("top := a * ~a\n", &Settings::default());
    assert!(products.is_empty());
}

#[test]
fn test_order_truncation() {
    let mut settings = Settings::default();
    settings.limit_order(1).unwrap();
    let products = products_via_bdd("top := a + b * c\n", &settings);
    assert_eq!(products, vec![vec![2]]);

    let products = products_via_bdd("top := @(2, [a, b, c])\n", &settings);
    assert!(products.is_empty());
}

#[test]
fn test_complement_elimination_for_cut_sets() {
    // Non-coherent function in MCS mode: complements are approximated away.
    let products = products_via_bdd("top := a * ~b + c\n", &Settings::default());
    assert_eq!(products, vec![vec![2], vec![4]]);
}

#[test]
fn test_prime_implicants_xor() {
    let mut settings = Settings::default();
    settings.prime_implicants(true).unwrap();
    let products = products_via_bdd("top := a ^ b\n", &settings);
    assert_eq!(products, vec![vec![-2, 3], vec![2, -3]]);
}

#[test]
fn test_prime_implicants_triple_xor() {
    let mut settings = Settings::default();
    settings.prime_implicants(true).unwrap();
    let products = products_via_bdd("top := a ^ b ^ c\n", &settings);
    assert_eq!(
        products,
        vec![
            vec![-2, -3, 4],
            vec![-2, 3, -4],
            vec![2, -3, -4],
            vec![2, 3, 4],
        ]
    );
}

#[test]
fn test_module_composition() {
    let products = products_via_bdd(
        "top := m * c\n\
         m := a + b\n",
        &Settings::default(),
    );
    // a = 2, b = 3, c = 4: modules compose into flat products.
    assert_eq!(products, vec![vec![2, 4], vec![3, 4]]);
}

#[test]
fn test_module_truncated_by_order_limit() {
    let mut settings = Settings::default();
    settings.limit_order(1).unwrap();
    let products = products_via_bdd(
        "top := m * c\n\
         m := a + b\n",
        &settings,
    );
    assert!(products.is_empty());
}

#[test]
fn test_pdag_backend_matches_bdd_backend() {
    for text in [
        "top := a * b + b * c\n",
        "top := a + b + c\n",
        "top := @(2, [a, b, c])\n",
        "top := a + a * b\n",
        "top := m * c\nm := a + b\n",
    ] {
        let via_bdd = products_via_bdd(text, &Settings::default());
        let via_pdag = products_via_pdag(text, &Settings::default());
        assert_eq!(via_bdd, via_pdag, "Backends disagree on {:?}", text);
    }
}

#[test]
fn test_minimize_is_idempotent() {
    let model = Model::parse("top := a * b + b * c + a * b * c\n").unwrap();
    let graph = Pdag::new(&model, "top", false).unwrap();
    Preprocessor::new(&graph).run(false);
    let settings = Settings::default();
    let mut bdd = Bdd::new(&graph, &settings);
    let mut zbdd = Zbdd::from_bdd(&mut bdd, &settings);
    let root = zbdd.root().clone();
    let once = zbdd.minimize(&root);
    let twice = zbdd.minimize(&once);
    assert!(Rc::ptr_eq(&once, &twice), "Minimize must be idempotent.");
}

#[test]
fn test_structure_invariants() {
    let model = Model::parse("top := a * b + b * c + a * c + d\n").unwrap();
    let graph = Pdag::new(&model, "top", false).unwrap();
    Preprocessor::new(&graph).run(false);
    let settings = Settings::default();
    let mut bdd = Bdd::new(&graph, &settings);
    let mut zbdd = Zbdd::from_bdd(&mut bdd, &settings);
    zbdd.analyze();
    let root = zbdd.root().clone();
    zbdd.test_structure(&root, true);
    zbdd.clear_marks(&root, true);
}

#[test]
fn test_product_count() {
    let model = Model::parse("top := a + b * c\n").unwrap();
    let graph = Pdag::new(&model, "top", false).unwrap();
    Preprocessor::new(&graph).run(false);
    let settings = Settings::default();
    let mut bdd = Bdd::new(&graph, &settings);
    let mut zbdd = Zbdd::from_bdd(&mut bdd, &settings);
    zbdd.analyze();
    let root = zbdd.root().clone();
    let count = zbdd.count_products(&root, true);
    zbdd.clear_marks(&root, true);
    assert_eq!(count, 2);
    assert_eq!(zbdd.products().len(), 2);
}

#[test]
fn test_terminal_queries() {
    let base: VertexPtr = Rc::new(Vertex::Base);
    let empty: VertexPtr = Rc::new(Vertex::Empty);
    assert_eq!(base.id(), 1);
    assert_eq!(empty.id(), 0);
    assert!(base.base_value());
    assert!(!empty.base_value());
}
