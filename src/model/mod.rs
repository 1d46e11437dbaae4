//! Input model tree for fault tree analysis
//!
//! A [`Model`] is a registry of gates, basic events, and house events keyed
//! by id. Gates carry [`Formula`]s over references to other elements. The
//! model can be built programmatically or parsed from a simple text format:
//!
//! ```text
//! top := pump-a * pump-b + valve
//! p(pump-a) = 0.1
//! p(pump-b) = 0.2
//! p(valve) = 0.05
//! ```
//!
//! The analysis core consumes the model through
//! [`FaultTreeAnalysis`](crate::analysis::FaultTreeAnalysis), which converts
//! it into an indexed propositional DAG.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{ModelParseError, ValidityError};

pub mod ast;
#[cfg(test)]
mod tests;

// Lalrpop-generated parser module
#[allow(clippy::all)]
mod parser {
    use lalrpop_util::lalrpop_mod;
    lalrpop_mod!(pub model_file, "/model/model_file.rs");
}

/// Probability expression of a basic event.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A fixed probability.
    Constant(f64),
    /// Exponential failure law `p(t) = 1 - exp(-rate * t)`
    /// evaluated at the mission time.
    Exponential {
        /// Failure rate per hour.
        rate: f64,
    },
}

impl Expression {
    /// Evaluates the expression at the given mission time.
    pub fn value(&self, mission_time: f64) -> f64 {
        match *self {
            Expression::Constant(p) => p,
            Expression::Exponential { rate } => 1.0 - (-rate * mission_time).exp(),
        }
    }
}

/// A terminal probabilistic input of the model.
#[derive(Debug, Clone)]
pub struct BasicEvent {
    id: String,
    expression: Expression,
    ccf_gate: Option<String>,
}

impl BasicEvent {
    /// Creates a basic event with the given probability expression.
    pub fn new(id: impl Into<String>, expression: Expression) -> Self {
        BasicEvent {
            id: id.into(),
            expression,
            ccf_gate: None,
        }
    }

    /// Attaches a common-cause proxy gate to substitute this event
    /// when CCF analysis is requested.
    pub fn with_ccf_gate(mut self, gate_id: impl Into<String>) -> Self {
        self.ccf_gate = Some(gate_id.into());
        self
    }

    /// The id of this basic event.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The probability expression of this basic event.
    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    /// The id of the CCF proxy gate, if the event belongs to a CCF group.
    pub fn ccf_gate(&self) -> Option<&str> {
        self.ccf_gate.as_deref()
    }

    /// Evaluates the mean probability, checking the [0, 1] contract.
    pub fn probability(&self, mission_time: f64) -> Result<f64, ValidityError> {
        let p = self.expression.value(mission_time);
        if !(0.0..=1.0).contains(&p) || !p.is_finite() {
            return Err(ValidityError::InvalidProbability {
                id: self.id.clone(),
                value: p,
            });
        }
        Ok(p)
    }
}

/// Connectives available in input formulas.
///
/// `Iff`, `Imply`, and `Cardinality` are lowered to the basic connectives
/// during graph construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connective {
    /// Conjunction.
    And,
    /// Disjunction.
    Or,
    /// At-least-k-of-n combination.
    Atleast,
    /// Exclusive disjunction of exactly two arguments.
    Xor,
    /// Negation of a single argument.
    Not,
    /// Negated conjunction.
    Nand,
    /// Negated disjunction.
    Nor,
    /// Single-argument pass-through.
    Null,
    /// Equivalence of exactly two arguments.
    Iff,
    /// Implication of exactly two arguments.
    Imply,
    /// Between-min-and-max-of-n combination.
    Cardinality,
}

impl Connective {
    /// The display name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Connective::And => "AND",
            Connective::Or => "OR",
            Connective::Atleast => "ATLEAST",
            Connective::Xor => "XOR",
            Connective::Not => "NOT",
            Connective::Nand => "NAND",
            Connective::Nor => "NOR",
            Connective::Null => "NULL",
            Connective::Iff => "IFF",
            Connective::Imply => "IMPLY",
            Connective::Cardinality => "CARDINALITY",
        }
    }
}

/// A formula argument: an event reference, a Boolean constant, or a nested
/// formula, with an optional complement.
#[derive(Debug, Clone)]
pub struct Arg {
    /// Interpretation of the argument as its complement.
    pub complement: bool,
    /// The argument payload.
    pub event: ArgEvent,
}

/// Payload of a formula argument.
#[derive(Debug, Clone)]
pub enum ArgEvent {
    /// Reference to a model element (gate, basic event, or house event).
    Ref(String),
    /// An inline Boolean constant (equivalent to a house event).
    Constant(bool),
    /// A nested anonymous formula.
    Formula(Box<Formula>),
}

/// A Boolean formula over model elements.
#[derive(Debug, Clone)]
pub struct Formula {
    connective: Connective,
    args: Vec<Arg>,
    min_number: Option<i32>,
    max_number: Option<i32>,
}

impl Formula {
    /// Creates a formula with the given connective.
    pub fn new(connective: Connective) -> Self {
        Formula {
            connective,
            args: Vec::new(),
            min_number: None,
            max_number: None,
        }
    }

    /// Sets the min number for at-least and cardinality connectives.
    pub fn min_number(mut self, k: i32) -> Self {
        self.min_number = Some(k);
        self
    }

    /// Sets the max number for the cardinality connective.
    pub fn max_number(mut self, k: i32) -> Self {
        self.max_number = Some(k);
        self
    }

    /// Adds a reference argument.
    pub fn arg(mut self, id: impl Into<String>) -> Self {
        self.push_ref(id.into(), false);
        self
    }

    /// Adds a complemented reference argument.
    pub fn complement_arg(mut self, id: impl Into<String>) -> Self {
        self.push_ref(id.into(), true);
        self
    }

    /// Adds an inline Boolean constant argument.
    pub fn constant_arg(mut self, value: bool) -> Self {
        self.args.push(Arg {
            complement: false,
            event: ArgEvent::Constant(value),
        });
        self
    }

    /// Adds a nested formula argument.
    pub fn formula_arg(mut self, formula: Formula) -> Self {
        self.push_formula(formula, false);
        self
    }

    /// Adds a complemented nested formula argument.
    pub fn complement_formula_arg(mut self, formula: Formula) -> Self {
        self.push_formula(formula, true);
        self
    }

    fn push_ref(&mut self, id: String, complement: bool) {
        self.args.push(Arg {
            complement,
            event: ArgEvent::Ref(id),
        });
    }

    fn push_formula(&mut self, formula: Formula, complement: bool) {
        self.args.push(Arg {
            complement,
            event: ArgEvent::Formula(Box::new(formula)),
        });
    }

    /// The connective of this formula.
    pub fn connective(&self) -> Connective {
        self.connective
    }

    /// The arguments of this formula.
    pub fn args(&self) -> &[Arg] {
        &self.args
    }

    /// The min number for at-least/cardinality connectives.
    pub fn min_number_value(&self) -> Option<i32> {
        self.min_number
    }

    /// The max number for the cardinality connective.
    pub fn max_number_value(&self) -> Option<i32> {
        self.max_number
    }

    /// Collects every element id referenced by this formula tree.
    pub fn collect_references(&self, out: &mut Vec<String>) {
        for arg in &self.args {
            match &arg.event {
                ArgEvent::Ref(id) => out.push(id.clone()),
                ArgEvent::Constant(_) => {}
                ArgEvent::Formula(nested) => nested.collect_references(out),
            }
        }
    }

    /// Checks the arity and number contracts of this formula.
    pub fn validate(&self, gate_id: &str) -> Result<(), ValidityError> {
        let arity_error = |connective: &'static str, requirement: &'static str| {
            Err(ValidityError::InvalidArity {
                id: gate_id.to_string(),
                connective,
                requirement,
                actual: self.args.len(),
            })
        };
        match self.connective {
            Connective::Not | Connective::Null => {
                if self.args.len() != 1 {
                    return arity_error(self.connective.name(), "exactly 1");
                }
            }
            Connective::Xor | Connective::Iff | Connective::Imply => {
                if self.args.len() != 2 {
                    return arity_error(self.connective.name(), "exactly 2");
                }
            }
            Connective::And | Connective::Or | Connective::Nand | Connective::Nor => {
                if self.args.is_empty() {
                    return arity_error(self.connective.name(), "at least 1");
                }
            }
            Connective::Atleast => {
                if self.args.len() < 2 {
                    return arity_error("ATLEAST", "at least 2");
                }
                let k = self
                    .min_number
                    .ok_or_else(|| ValidityError::InvalidMinNumber {
                        id: gate_id.to_string(),
                        message: "ATLEAST formula requires a min number".to_string(),
                    })?;
                if k < 1 || (k as usize) > self.args.len() {
                    return Err(ValidityError::InvalidMinNumber {
                        id: gate_id.to_string(),
                        message: format!(
                            "ATLEAST min number {} must be in [1, {}]",
                            k,
                            self.args.len()
                        ),
                    });
                }
            }
            Connective::Cardinality => {
                let min = self.min_number.unwrap_or(0);
                let max = self
                    .max_number
                    .ok_or_else(|| ValidityError::InvalidMinNumber {
                        id: gate_id.to_string(),
                        message: "CARDINALITY formula requires a max number".to_string(),
                    })?;
                if min > max || min < 0 || (max as usize) > self.args.len() {
                    return Err(ValidityError::InvalidMinNumber {
                        id: gate_id.to_string(),
                        message: format!(
                            "CARDINALITY numbers ({}, {}) must satisfy 0 <= min <= max <= {}",
                            min,
                            max,
                            self.args.len()
                        ),
                    });
                }
            }
        }
        let mut seen: Vec<(bool, &str)> = Vec::new();
        for arg in &self.args {
            if let ArgEvent::Ref(id) = &arg.event {
                if seen.contains(&(arg.complement, id.as_str())) {
                    return Err(ValidityError::DuplicateArgument {
                        id: gate_id.to_string(),
                        arg: id.clone(),
                    });
                }
                seen.push((arg.complement, id.as_str()));
            }
        }
        for arg in &self.args {
            if let ArgEvent::Formula(nested) = &arg.event {
                nested.validate(gate_id)?;
            }
        }
        Ok(())
    }
}

/// A registry of model elements keyed by id.
#[derive(Debug, Clone, Default)]
pub struct Model {
    gates: BTreeMap<String, Formula>,
    gate_order: Vec<String>,
    basic_events: BTreeMap<String, BasicEvent>,
    house_events: BTreeMap<String, bool>,
}

impl Model {
    /// Creates an empty model.
    pub fn new() -> Self {
        Model::default()
    }

    /// Registers a gate with its formula.
    pub fn add_gate(
        &mut self,
        id: impl Into<String>,
        formula: Formula,
    ) -> Result<(), ValidityError> {
        let id = id.into();
        if self.contains(&id) {
            return Err(ValidityError::DuplicateId { id });
        }
        formula.validate(&id)?;
        self.gate_order.push(id.clone());
        self.gates.insert(id, formula);
        Ok(())
    }

    /// Registers a basic event.
    pub fn add_basic_event(&mut self, event: BasicEvent) -> Result<(), ValidityError> {
        if self.contains(event.id()) {
            return Err(ValidityError::DuplicateId {
                id: event.id().to_string(),
            });
        }
        self.basic_events.insert(event.id().to_string(), event);
        Ok(())
    }

    /// Registers a house event with its constant state.
    pub fn add_house_event(
        &mut self,
        id: impl Into<String>,
        state: bool,
    ) -> Result<(), ValidityError> {
        let id = id.into();
        if self.contains(&id) {
            return Err(ValidityError::DuplicateId { id });
        }
        self.house_events.insert(id, state);
        Ok(())
    }

    fn contains(&self, id: &str) -> bool {
        self.gates.contains_key(id)
            || self.basic_events.contains_key(id)
            || self.house_events.contains_key(id)
    }

    /// Looks up a gate formula by id.
    pub fn gate(&self, id: &str) -> Option<&Formula> {
        self.gates.get(id)
    }

    /// Looks up a basic event by id.
    pub fn basic_event(&self, id: &str) -> Option<&BasicEvent> {
        self.basic_events.get(id)
    }

    /// Looks up a house event state by id.
    pub fn house_event(&self, id: &str) -> Option<bool> {
        self.house_events.get(id).copied()
    }

    /// The id of the first gate defined in the model, if any.
    ///
    /// The model text format treats it as the default top event.
    pub fn first_gate(&self) -> Option<&str> {
        self.gate_order.first().map(String::as_str)
    }

    /// All gate ids in definition order.
    pub fn gate_ids(&self) -> impl Iterator<Item = &str> {
        self.gate_order.iter().map(String::as_str)
    }

    /// Parses a model from the text format.
    ///
    /// References without a gate definition or house state default to basic
    /// events; their probability is 0 unless a `p(...)` statement sets it.
    pub fn parse(input: &str) -> Result<Model, ModelParseError> {
        let statements = parser::model_file::ModelFileParser::new()
            .parse(input)
            .map_err(|e| convert_parse_error(&e))?;

        let mut model = Model::new();
        let mut probabilities: BTreeMap<String, f64> = BTreeMap::new();
        let mut referenced: Vec<String> = Vec::new();
        for statement in &statements {
            match statement {
                ast::Statement::Gate(id, expr) => {
                    let formula = formula_from_expr(expr);
                    model
                        .add_gate(id.clone(), formula)
                        .map_err(|e| ModelParseError {
                            message: e.to_string(),
                            offset: None,
                        })?;
                    expr.collect_references(&mut referenced);
                }
                ast::Statement::Probability(id, value) => {
                    probabilities.insert(id.clone(), *value);
                }
                ast::Statement::House(id, state) => {
                    model
                        .add_house_event(id.clone(), *state)
                        .map_err(|e| ModelParseError {
                            message: e.to_string(),
                            offset: None,
                        })?;
                }
            }
        }
        for id in referenced {
            if !model.contains(&id) {
                let p = probabilities.get(&id).copied().unwrap_or(0.0);
                model
                    .add_basic_event(BasicEvent::new(id, Expression::Constant(p)))
                    .expect("References are deduplicated by the registry check.");
            }
        }
        for (id, p) in probabilities {
            if model.gates.contains_key(&id) || model.house_events.contains_key(&id) {
                return Err(ModelParseError {
                    message: format!("'{}' is not a basic event but has a probability", id),
                    offset: None,
                });
            }
            if let Some(event) = model.basic_events.get_mut(&id) {
                event.expression = Expression::Constant(p);
            } else {
                model
                    .add_basic_event(BasicEvent::new(id, Expression::Constant(p)))
                    .expect("The registry check above rules out duplicates.");
            }
        }
        Ok(model)
    }
}

/// Converts a parsed expression into a formula tree.
fn formula_from_expr(expr: &ast::Expr) -> Formula {
    match expr {
        ast::Expr::Ref(id) => Formula::new(Connective::Null).arg(id.clone()),
        ast::Expr::Constant(value) => Formula::new(Connective::Null).constant_arg(*value),
        ast::Expr::Not(inner) => {
            // A top-level negation becomes a pass-through of the complement,
            // so the sign ends up on the argument rather than the gate.
            let mut formula = Formula::new(Connective::Null);
            match inner.as_ref() {
                ast::Expr::Ref(id) => formula.push_ref(id.clone(), true),
                ast::Expr::Constant(value) => formula.args.push(Arg {
                    complement: false,
                    event: ArgEvent::Constant(!*value),
                }),
                nested => formula.push_formula(formula_from_expr(nested), true),
            }
            formula
        }
        ast::Expr::Or(l, r) => {
            let mut formula = Formula::new(Connective::Or);
            push_arg(&mut formula, l);
            push_arg(&mut formula, r);
            formula
        }
        ast::Expr::And(l, r) => {
            let mut formula = Formula::new(Connective::And);
            push_arg(&mut formula, l);
            push_arg(&mut formula, r);
            formula
        }
        ast::Expr::Xor(l, r) => {
            let mut formula = Formula::new(Connective::Xor);
            push_arg(&mut formula, l);
            push_arg(&mut formula, r);
            formula
        }
        ast::Expr::Atleast(k, args) => {
            let mut formula = Formula::new(Connective::Atleast).min_number(*k);
            for arg in args {
                push_arg(&mut formula, arg);
            }
            formula
        }
    }
}

/// Appends a parsed expression as an argument, folding complements on
/// direct references into the argument sign.
fn push_arg(formula: &mut Formula, expr: &ast::Expr) {
    match expr {
        ast::Expr::Ref(id) => formula.push_ref(id.clone(), false),
        ast::Expr::Constant(value) => formula.args.push(Arg {
            complement: false,
            event: ArgEvent::Constant(*value),
        }),
        ast::Expr::Not(inner) => match inner.as_ref() {
            ast::Expr::Ref(id) => formula.push_ref(id.clone(), true),
            ast::Expr::Constant(value) => formula.args.push(Arg {
                complement: false,
                event: ArgEvent::Constant(!*value),
            }),
            nested => formula.push_formula(formula_from_expr(nested), true),
        },
        nested => formula.push_formula(formula_from_expr(nested), false),
    }
}

fn convert_parse_error<T: fmt::Display, E: fmt::Display>(
    error: &lalrpop_util::ParseError<usize, T, E>,
) -> ModelParseError {
    use lalrpop_util::ParseError;
    match error {
        ParseError::InvalidToken { location } => ModelParseError {
            message: "invalid token".to_string(),
            offset: Some(*location),
        },
        ParseError::UnrecognizedEof { location, .. } => ModelParseError {
            message: "unexpected end of input".to_string(),
            offset: Some(*location),
        },
        ParseError::UnrecognizedToken {
            token: (start, token, _),
            ..
        } => ModelParseError {
            message: format!("unexpected token '{}'", token),
            offset: Some(*start),
        },
        ParseError::ExtraToken {
            token: (start, token, _),
        } => ModelParseError {
            message: format!("extra token '{}'", token),
            offset: Some(*start),
        },
        ParseError::User { error } => ModelParseError {
            message: error.to_string(),
            offset: None,
        },
    }
}
