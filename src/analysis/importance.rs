//! Importance factors of basic events
//!
//! Birnbaum marginal importance (MIF) is the partial derivative of the
//! total probability with respect to an event probability. The BDD walk
//! computes it directly from the diagram; the generic fallback toggles
//! the event probability to 1 and 0 under the active calculator. The
//! remaining factors derive algebraically from MIF, the event probability,
//! and the total probability.

use crate::analysis::probability::{
    mcub_probability, rare_event_probability, variable_probability,
};
use crate::bdd::{Bdd, VertexPtr};
use crate::pdag::VARIABLE_START_INDEX;
use crate::settings::Approximation;

/// Collection of importance factors for one basic event.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportanceFactors {
    /// The number of products the event occurs in.
    pub occurrence: i32,
    /// Birnbaum marginal importance factor.
    pub mif: f64,
    /// Critical importance factor.
    pub cif: f64,
    /// Fussel-Vesely diagnosis importance factor.
    pub dif: f64,
    /// Risk achievement worth.
    pub raw: f64,
    /// Risk reduction worth.
    pub rrw: f64,
}

/// An event id with its importance factors.
#[derive(Debug, Clone)]
pub struct ImportanceRecord {
    /// The basic event id.
    pub event_id: String,
    /// The importance factors of the event.
    pub factors: ImportanceFactors,
}

/// Counts occurrences of each variable in the product list.
pub(crate) fn occurrences(products: &[Vec<i32>], num_variables: usize) -> Vec<i32> {
    let mut counts = vec![0; num_variables];
    for product in products {
        for &literal in product {
            counts[(literal.abs() - VARIABLE_START_INDEX) as usize] += 1;
        }
    }
    counts
}

/// Derives the full factor collection from MIF.
pub(crate) fn factors_from_mif(
    occurrence: i32,
    p_var: f64,
    mif: f64,
    p_total: f64,
) -> ImportanceFactors {
    let mut imp = ImportanceFactors {
        occurrence,
        mif,
        cif: 0.0,
        dif: 0.0,
        raw: 0.0,
        rrw: 0.0,
    };
    if p_total != 0.0 {
        imp.cif = p_var * mif / p_total;
        imp.raw = 1.0 + (1.0 - p_var) * mif / p_total;
        imp.dif = p_var * imp.raw;
        if p_total != p_var * mif {
            imp.rrw = p_total / (p_total - p_var * mif);
        }
    }
    imp
}

/// MIF by walking the BDD.
///
/// Requires a preceding probability evaluation so the per-vertex
/// probability slots are populated.
pub(crate) fn calculate_mif_bdd(bdd: &Bdd, index: i32, p_vars: &[f64]) -> f64 {
    let root = bdd.root().clone();
    if root.vertex.terminal() {
        return 0.0;
    }
    let original_mark = root.vertex.as_ite().mark();
    let order = *bdd
        .index_to_order()
        .get(&index)
        .expect("The variable is not in the BDD ordering.");
    let mif = mif_visit(bdd, &root.vertex, order, !original_mark, p_vars);
    bdd.clear_marks(original_mark);
    mif
}

fn mif_visit(bdd: &Bdd, vertex: &VertexPtr, order: i32, mark: bool, p_vars: &[f64]) -> f64 {
    if vertex.terminal() {
        return 0.0;
    }
    let ite = vertex.as_ite();
    if ite.mark() == mark {
        return ite.factor();
    }
    ite.set_mark(mark);
    if ite.order() > order {
        if !ite.module() {
            // The variable does not occur below this vertex.
            ite.set_factor(0.0);
        } else {
            // A module's order is above the orders of its variables, so
            // the target may sit inside: chain through the module's own
            // partial derivative.
            let high = retrieve_probability(ite.high());
            let mut low = retrieve_probability(ite.low());
            if ite.complement_edge() {
                low = 1.0 - low;
            }
            let module = bdd
                .modules()
                .get(&ite.index())
                .expect("Unregistered module in BDD.")
                .clone();
            let mut mif = mif_visit(bdd, &module.vertex, order, mark, p_vars);
            if module.complement {
                mif = -mif;
            }
            ite.set_factor((high - low) * mif);
        }
    } else if ite.order() == order {
        debug_assert!(!ite.module(), "A variable cannot be a module.");
        let high = retrieve_probability(ite.high());
        let mut low = retrieve_probability(ite.low());
        if ite.complement_edge() {
            low = 1.0 - low;
        }
        ite.set_factor(high - low);
    } else {
        let p_var = if ite.module() {
            let module = bdd
                .modules()
                .get(&ite.index())
                .expect("Unregistered module in BDD.")
                .clone();
            let mut p = retrieve_probability(&module.vertex);
            if module.complement {
                p = 1.0 - p;
            }
            p
        } else {
            variable_probability(p_vars, ite.index())
        };
        let high = mif_visit(bdd, ite.high(), order, mark, p_vars);
        let mut low = mif_visit(bdd, ite.low(), order, mark, p_vars);
        if ite.complement_edge() {
            low = -low;
        }
        ite.set_factor(p_var * high + (1.0 - p_var) * low);
    }
    ite.factor()
}

fn retrieve_probability(vertex: &VertexPtr) -> f64 {
    if vertex.terminal() {
        1.0
    } else {
        vertex.as_ite().p()
    }
}

/// MIF by toggling the variable probability under the active calculator.
pub(crate) fn calculate_mif_generic(
    products: &[Vec<i32>],
    p_vars: &mut [f64],
    index: i32,
    approximation: Approximation,
) -> f64 {
    let position = (index - VARIABLE_START_INDEX) as usize;
    let saved = p_vars[position];
    let total = |p_vars: &[f64]| match approximation {
        Approximation::RareEvent => rare_event_probability(products, p_vars),
        Approximation::Mcub => mcub_probability(products, p_vars),
        Approximation::None => unreachable!("Exact analysis walks the BDD."),
    };
    p_vars[position] = 1.0;
    let conditional_high = total(p_vars);
    p_vars[position] = 0.0;
    let conditional_low = total(p_vars);
    p_vars[position] = saved;
    conditional_high - conditional_low
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_occurrences() {
        let products = vec![vec![2, 3], vec![3, 4], vec![-2, 4]];
        let counts = occurrences(&products, 3);
        assert_eq!(counts, vec![2, 2, 2]);
    }

    #[test]
    fn test_factor_algebra() {
        // P = 0.074, event a: p = 0.1, MIF = 0.14.
        let imp = factors_from_mif(1, 0.1, 0.14, 0.074);
        assert!((imp.cif - 0.1 * 0.14 / 0.074).abs() < 1e-12);
        assert!((imp.raw - (1.0 + 0.9 * 0.14 / 0.074)).abs() < 1e-12);
        assert!((imp.dif - 0.1 * imp.raw).abs() < 1e-12);
        assert!((imp.rrw - 0.074 / (0.074 - 0.014)).abs() < 1e-12);
    }

    #[test]
    fn test_factor_algebra_zero_probability() {
        let imp = factors_from_mif(1, 0.1, 0.2, 0.0);
        assert_eq!(imp.cif, 0.0);
        assert_eq!(imp.raw, 0.0);
        assert_eq!(imp.rrw, 0.0);
    }

    #[test]
    fn test_generic_mif_rare_event() {
        // f = a*b + b*c; d/da = p(b) by the rare-event formula.
        let products = vec![vec![2, 3], vec![3, 4]];
        let mut p_vars = vec![0.1, 0.2, 0.3];
        let mif = calculate_mif_generic(&products, &mut p_vars, 2, Approximation::RareEvent);
        assert!((mif - 0.2).abs() < 1e-12);
        // The probabilities are restored.
        assert_eq!(p_vars, vec![0.1, 0.2, 0.3]);
    }
}
