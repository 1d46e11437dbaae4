//! Abstract syntax for the model text format
//!
//! The grammar produces a flat list of statements which
//! [`Model::parse`](crate::model::Model::parse) folds into a model.

/// One statement of a model file.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `name := expr` gate definition.
    Gate(String, Expr),
    /// `p(name) = value` basic-event probability.
    Probability(String, f64),
    /// `s(name) = true|false` house-event state.
    House(String, bool),
}

/// A Boolean expression as written in a model file.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Reference to a gate, basic event, or house event by id.
    Ref(String),
    /// Boolean constant.
    Constant(bool),
    /// Disjunction.
    Or(Box<Expr>, Box<Expr>),
    /// Conjunction.
    And(Box<Expr>, Box<Expr>),
    /// Exclusive disjunction.
    Xor(Box<Expr>, Box<Expr>),
    /// Negation.
    Not(Box<Expr>),
    /// At-least-k-of-n combination.
    Atleast(i32, Vec<Expr>),
}

impl Expr {
    /// Disjunction of two expressions.
    pub fn or(left: Expr, right: Expr) -> Expr {
        Expr::Or(Box::new(left), Box::new(right))
    }

    /// Conjunction of two expressions.
    pub fn and(left: Expr, right: Expr) -> Expr {
        Expr::And(Box::new(left), Box::new(right))
    }

    /// Exclusive disjunction of two expressions.
    pub fn xor(left: Expr, right: Expr) -> Expr {
        Expr::Xor(Box::new(left), Box::new(right))
    }

    /// Negation of an expression.
    pub fn not(inner: Expr) -> Expr {
        Expr::Not(Box::new(inner))
    }

    /// Collects every id referenced by this expression.
    pub fn collect_references(&self, out: &mut Vec<String>) {
        match self {
            Expr::Ref(id) => out.push(id.clone()),
            Expr::Constant(_) => {}
            Expr::Or(l, r) | Expr::And(l, r) | Expr::Xor(l, r) => {
                l.collect_references(out);
                r.collect_references(out);
            }
            Expr::Not(e) => e.collect_references(out),
            Expr::Atleast(_, args) => {
                for arg in args {
                    arg.collect_references(out);
                }
            }
        }
    }
}
