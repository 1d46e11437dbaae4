//! Tests for the BDD engine

use super::*;
use crate::model::Model;
use crate::pdag::preprocessor::Preprocessor;
use crate::pdag::Pdag;
use crate::settings::Settings;

fn build_bdd(text: &str) -> Bdd {
    let model = Model::parse(text).unwrap();
    let top = model.first_gate().expect("Model without gates.").to_string();
    let graph = Pdag::new(&model, &top, false).unwrap();
    Preprocessor::new(&graph).run(false);
    Bdd::new(&graph, &Settings::default())
}

#[test]
fn test_single_variable() {
    let bdd = build_bdd("top := a\n");
    let root = bdd.root();
    assert!(!root.complement);
    assert!(!root.vertex.terminal());
    let ite = root.vertex.as_ite();
    assert_eq!(ite.index(), 2);
    assert!(ite.high().terminal());
    assert!(ite.low().terminal());
    assert!(ite.complement_edge());
    assert_eq!(bdd.index_to_order().len(), 1);
}

#[test]
fn test_unity_graph() {
    let bdd = build_bdd("top := a + ~a\n");
    let root = bdd.root();
    assert!(root.vertex.terminal());
    assert!(!root.complement);
}

#[test]
fn test_null_set_graph() {
    let bdd = build_bdd("top := a * ~a\n");
    let root = bdd.root();
    assert!(root.vertex.terminal());
    assert!(root.complement);
}

#[test]
fn test_conjunction_structure() {
    let bdd = build_bdd("top := a * b\n");
    let root = bdd.root();
    assert!(!root.complement);
    let top = root.vertex.as_ite();
    // The top vertex must carry the smaller order.
    assert!(top.high().terminal() || top.order() < top.high().as_ite().order());
    assert!(top.low().terminal() || top.order() < top.low().as_ite().order());
    // a & b: low branch of the top is FALSE (complement edge to TRUE).
    assert!(top.low().terminal());
    assert!(top.complement_edge());
    let high = top.high().as_ite();
    assert!(high.high().terminal());
    bdd.clear_marks(false);
    let count = bdd.count_ite_nodes(&root.vertex.clone());
    bdd.clear_marks(false);
    assert_eq!(count, 2);
}

#[test]
fn test_negation_shares_vertices() {
    // f | ~f over structurally equal gates must reduce to TRUE.
    let bdd = build_bdd(
        "top := g1 + g2\n\
         g1 := a * b\n\
         g2 := ~(a * b)\n",
    );
    let root = bdd.root();
    assert!(root.vertex.terminal());
    assert!(!root.complement);
}

#[test]
fn test_hash_consing_of_equal_functions() {
    // Two gates with the same semantics collapse to one function graph.
    let bdd = build_bdd(
        "top := g1 + g2\n\
         g1 := a * b\n\
         g2 := b * a\n",
    );
    let root = bdd.root();
    assert!(!root.vertex.terminal());
    bdd.clear_marks(false);
    let count = bdd.count_ite_nodes(&root.vertex.clone());
    bdd.clear_marks(false);
    assert_eq!(count, 2, "Equal sub-functions must share vertices.");
}

#[test]
fn test_disjunction_with_shared_variable() {
    // a*b + b*c keeps the shared variable once per path.
    let bdd = build_bdd("top := a * b + b * c\n");
    let root = bdd.root();
    assert!(!root.vertex.terminal());
    // Ordering must strictly increase along every path.
    fn check_order(vertex: &VertexPtr) {
        if vertex.terminal() {
            return;
        }
        let ite = vertex.as_ite();
        for child in [ite.high(), ite.low()] {
            if !child.terminal() {
                assert!(ite.order() < child.as_ite().order());
            }
            check_order(child);
        }
    }
    check_order(&root.vertex);
}

#[test]
fn test_module_proxy_registration() {
    // The independent OR(a, b) becomes a module with its own function.
    let bdd = build_bdd(
        "top := m * c * d\n\
         m := a + b\n",
    );
    assert!(
        !bdd.modules().is_empty(),
        "Module functions must be registered."
    );
    for function in bdd.modules().values() {
        assert!(!function.vertex.terminal());
    }
}

#[test]
fn test_coherent_flag() {
    let bdd = build_bdd("top := a * b + c\n");
    assert!(bdd.coherent());
    let bdd = build_bdd("top := a * ~b\n");
    assert!(!bdd.coherent());
}

#[test]
fn test_atleast_gate_conversion() {
    // 2-of-3 has the known minimal BDD shape with 4 ITE vertices or fewer
    // vertices when sharing kicks in.
    let bdd = build_bdd("top := @(2, [a, b, c])\n");
    let root = bdd.root();
    assert!(!root.vertex.terminal());
    bdd.clear_marks(false);
    let count = bdd.count_ite_nodes(&root.vertex.clone());
    bdd.clear_marks(false);
    assert!(count >= 3 && count <= 5, "Unexpected 2/3 BDD size: {}", count);
}
