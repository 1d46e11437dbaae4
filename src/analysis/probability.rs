//! Probability evaluation over products and decision diagrams
//!
//! The exact path traverses the BDD bottom-up, memoizing per-vertex
//! probabilities in the vertex scratch slots with a flipping mark, so
//! repeated evaluations (e.g., for importance factors) avoid the O(N)
//! mark clearing. The approximate paths fold the product list directly.

use crate::bdd::{Bdd, VertexPtr};
use crate::pdag::VARIABLE_START_INDEX;

/// The probability of a variable by its graph index.
pub(crate) fn variable_probability(p_vars: &[f64], index: i32) -> f64 {
    p_vars[(index - VARIABLE_START_INDEX) as usize]
}

/// The probability of one product: the product of its literal
/// probabilities, complements contributing `1 - p`.
pub(crate) fn product_probability(product: &[i32], p_vars: &[f64]) -> f64 {
    product
        .iter()
        .map(|&literal| {
            let p = variable_probability(p_vars, literal.abs());
            if literal < 0 {
                1.0 - p
            } else {
                p
            }
        })
        .product()
}

/// The rare-event approximation: the sum of product probabilities.
///
/// The sum is not capped here; the caller decides how to report values
/// above 1.
pub(crate) fn rare_event_probability(products: &[Vec<i32>], p_vars: &[f64]) -> f64 {
    products
        .iter()
        .map(|product| product_probability(product, p_vars))
        .sum()
}

/// The min-cut upper bound approximation:
/// `1 - Π (1 - P(product))`.
pub(crate) fn mcub_probability(products: &[Vec<i32>], p_vars: &[f64]) -> f64 {
    1.0 - products
        .iter()
        .map(|product| 1.0 - product_probability(product, p_vars))
        .product::<f64>()
}

/// Exact probability calculator over a BDD.
///
/// Holds the current traversal mark; every evaluation flips it so vertex
/// probability slots act as a per-pass memo without explicit clearing.
pub(crate) struct BddProbabilityCalculator<'a> {
    bdd: &'a Bdd,
    current_mark: bool,
}

impl<'a> BddProbabilityCalculator<'a> {
    pub fn new(bdd: &'a Bdd) -> Self {
        BddProbabilityCalculator {
            bdd,
            current_mark: false,
        }
    }

    /// Evaluates the total probability of the root function.
    pub fn calculate_total_probability(&mut self, p_vars: &[f64]) -> f64 {
        self.current_mark = !self.current_mark;
        let root = self.bdd.root().clone();
        let mut probability = self.probability(&root.vertex, self.current_mark, p_vars);
        if root.complement {
            probability = 1.0 - probability;
        }
        probability
    }

    /// `P(node) = p * P(high) + (1 - p) * P(low')` with the complement
    /// flag applied to the low branch; modules recurse into their own
    /// function graphs.
    fn probability(&self, vertex: &VertexPtr, mark: bool, p_vars: &[f64]) -> f64 {
        if vertex.terminal() {
            return 1.0;
        }
        let ite = vertex.as_ite();
        if ite.mark() == mark {
            return ite.p();
        }
        ite.set_mark(mark);
        let p_var = if ite.module() {
            let module = self
                .bdd
                .modules()
                .get(&ite.index())
                .expect("Unregistered module in BDD.")
                .clone();
            let mut p = self.probability(&module.vertex, mark, p_vars);
            if module.complement {
                p = 1.0 - p;
            }
            p
        } else {
            variable_probability(p_vars, ite.index())
        };
        let high = self.probability(ite.high(), mark, p_vars);
        let mut low = self.probability(ite.low(), mark, p_vars);
        if ite.complement_edge() {
            low = 1.0 - low;
        }
        let value = p_var * high + (1.0 - p_var) * low;
        ite.set_p(value);
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_probability() {
        let p_vars = vec![0.1, 0.2, 0.3];
        assert!((product_probability(&[2, 3], &p_vars) - 0.02).abs() < 1e-15);
        assert!((product_probability(&[2, -3], &p_vars) - 0.08).abs() < 1e-15);
        // The empty product is certain.
        assert_eq!(product_probability(&[], &p_vars), 1.0);
    }

    #[test]
    fn test_rare_event() {
        let p_vars = vec![0.1, 0.2, 0.3];
        let products = vec![vec![2, 3], vec![3, 4]];
        assert!((rare_event_probability(&products, &p_vars) - 0.08).abs() < 1e-15);
    }

    #[test]
    fn test_mcub() {
        let p_vars = vec![0.1, 0.2, 0.3];
        let products = vec![vec![2, 3], vec![3, 4]];
        let expected = 1.0 - (1.0 - 0.02) * (1.0 - 0.06);
        assert!((mcub_probability(&products, &p_vars) - expected).abs() < 1e-15);
    }
}
