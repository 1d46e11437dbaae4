//! # Cutset Logic
//!
//! A quantitative fault tree analysis engine. Given a Boolean failure model
//! over probabilistic basic events, the crate enumerates minimal cut sets or
//! prime implicants, evaluates the top-event probability, and derives
//! importance factors — using reduced ordered binary decision diagrams with
//! complement edges, zero-suppressed decision diagrams for the product
//! families, and a MOCUS-style gate-expansion backend for very large trees.
//!
//! ## Pipeline
//!
//! 1. An input [`Model`] (gates, basic events, house events) is converted
//!    into an indexed propositional DAG ([`pdag::Pdag`]).
//! 2. The preprocessor lowers the graph to AND/OR form, absorbs constants,
//!    detects independent modules, and assigns the variable ordering.
//! 3. The selected backend generates products: BDD → ZBDD conversion
//!    (exact, supports prime implicants), direct ZBDD construction, or
//!    MOCUS gate expansion over a ZBDD cut-set container.
//! 4. The probability evaluator walks the BDD (exact) or folds the product
//!    list (rare-event, MCUB), and the importance evaluator derives
//!    MIF/CIF/DIF/RAW/RRW per basic event.
//!
//! ## Example
//!
//! ```
//! use cutset_logic::{FaultTreeAnalysis, Model, Settings};
//!
//! # fn main() -> Result<(), cutset_logic::AnalysisError> {
//! let model = Model::parse(
//!     "top := pump-a * pump-b + valve\n\
//!      p(pump-a) = 0.1\n\
//!      p(pump-b) = 0.2\n\
//!      p(valve) = 0.05\n",
//! )?;
//!
//! let mut analysis = FaultTreeAnalysis::new(&model, "top", Settings::default())?;
//! analysis.analyze()?;
//!
//! for product in analysis.products() {
//!     let ids: Vec<&str> = product.iter().map(|&e| analysis.basic_event_id(e)).collect();
//!     println!("{{{}}}", ids.join(", "));
//! }
//! println!("P(top) = {}", analysis.total_probability().unwrap());
//! # Ok(())
//! # }
//! ```
//!
//! ## Settings
//!
//! [`Settings`] selects the backend ([`Algorithm`]), the probability
//! formula ([`Approximation`]), prime implicants instead of cut sets, the
//! product order limit, the probability cut-off, and the mission time for
//! time-dependent basic-event expressions. Illegal combinations (e.g.,
//! prime implicants with an approximation) are rejected at assignment.
//!
//! ## Model text format
//!
//! One statement per line: `name := expr` defines a gate (`+`/`|` OR,
//! `*`/`&` AND, `^` XOR, `~`/`!` NOT, `@(k, [..])` at-least, parentheses,
//! `true`/`false`), `p(name) = 0.1` sets a basic-event probability, and
//! `s(name) = true` sets a house-event state. `//` starts a comment.

pub mod analysis;
pub mod bdd;
pub mod error;
pub mod mocus;
pub mod model;
pub mod pdag;
pub mod settings;
mod tables;
pub mod zbdd;

pub use analysis::{FaultTreeAnalysis, ImportanceFactors, ImportanceRecord};
pub use error::{AnalysisError, ModelParseError, SettingsError, ValidityError};
pub use model::{BasicEvent, Expression, Formula, Model};
pub use settings::{Algorithm, Approximation, Settings};
