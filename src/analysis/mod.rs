//! Quantitative fault tree analysis driver
//!
//! [`FaultTreeAnalysis`] runs the full pipeline for one top event:
//! model validation, PDAG construction, preprocessing, product generation
//! through the selected backend, probability evaluation, and importance
//! factors. A failed analysis produces no products; there is no
//! partial-result mode.

use log::debug;

use crate::bdd::Bdd;
use crate::error::AnalysisError;
use crate::mocus::Mocus;
use crate::model::Model;
use crate::pdag::{preprocessor::Preprocessor, Pdag, VARIABLE_START_INDEX};
use crate::settings::{Algorithm, Approximation, Settings};
use crate::zbdd::Zbdd;

pub mod importance;
pub mod probability;
#[cfg(test)]
mod tests;

pub use importance::{ImportanceFactors, ImportanceRecord};

use importance::{calculate_mif_bdd, calculate_mif_generic, factors_from_mif, occurrences};
use probability::{
    mcub_probability, product_probability, rare_event_probability, BddProbabilityCalculator,
};

/// Analysis of one top event of a fault tree model.
///
/// # Examples
///
/// ```
/// use cutset_logic::{FaultTreeAnalysis, Model, Settings};
///
/// # fn main() -> Result<(), cutset_logic::AnalysisError> {
/// let model = Model::parse(
///     "top := a * b + b * c\n\
///      p(a) = 0.1\n\
///      p(b) = 0.2\n\
///      p(c) = 0.3\n",
/// )?;
/// let mut analysis = FaultTreeAnalysis::new(&model, "top", Settings::default())?;
/// analysis.analyze()?;
/// assert_eq!(analysis.products().len(), 2);
/// let p = analysis.total_probability().unwrap();
/// assert!((p - 0.074).abs() < 1e-12);
/// # Ok(())
/// # }
/// ```
pub struct FaultTreeAnalysis<'a> {
    model: &'a Model,
    top: String,
    settings: Settings,
    products: Vec<Vec<i32>>,
    total_probability: Option<f64>,
    importance: Vec<ImportanceRecord>,
    basic_event_ids: Vec<String>,
    warnings: Vec<String>,
    analyzed: bool,
}

impl<'a> FaultTreeAnalysis<'a> {
    /// Prepares an analysis of the given top gate.
    pub fn new(
        model: &'a Model,
        top: &str,
        settings: Settings,
    ) -> Result<Self, AnalysisError> {
        if model.gate(top).is_none() {
            return Err(crate::error::ValidityError::UnknownReference {
                id: top.to_string(),
            }
            .into());
        }
        Ok(FaultTreeAnalysis {
            model,
            top: top.to_string(),
            settings,
            products: Vec::new(),
            total_probability: None,
            importance: Vec::new(),
            basic_event_ids: Vec::new(),
            warnings: Vec::new(),
            analyzed: false,
        })
    }

    /// Runs the complete analysis.
    pub fn analyze(&mut self) -> Result<(), AnalysisError> {
        debug_assert!(!self.analyzed, "Analysis runs once.");
        let graph = Pdag::new(
            self.model,
            &self.top,
            self.settings.ccf_analysis_value(),
        )?;
        let normal_form = self.settings.algorithm_value() != Algorithm::Bdd;
        Preprocessor::new(&graph).run(normal_form);

        self.basic_event_ids = graph
            .basic_events()
            .iter()
            .map(|event| event.id().to_string())
            .collect();
        let mission_time = self.settings.mission_time_value();
        let mut p_vars = Vec::with_capacity(graph.num_variables());
        for event in graph.basic_events() {
            p_vars.push(event.probability(mission_time)?);
        }

        if graph.is_trivial() && graph.root().borrow().constant() {
            if graph.root().borrow().constant_state() {
                self.warnings
                    .push("The top event is Unity; failure is guaranteed.".to_string());
            } else {
                self.warnings
                    .push("The top event is the Null set; failure is impossible.".to_string());
            }
        }

        let mut bdd: Option<Bdd> = None;
        let mut products: Vec<Vec<i32>> = match self.settings.algorithm_value() {
            Algorithm::Bdd => {
                let mut diagram = Bdd::new(&graph, &self.settings);
                let mut product_store = Zbdd::from_bdd(&mut diagram, &self.settings);
                product_store.analyze();
                let products = product_store.products().collect();
                bdd = Some(diagram);
                products
            }
            Algorithm::Zbdd => {
                let mut product_store = Zbdd::from_pdag(&graph, &self.settings);
                product_store.analyze();
                product_store.products().collect()
            }
            Algorithm::Mocus => {
                let mut driver = Mocus::new(&graph, &self.settings);
                driver.analyze();
                driver.products().collect()
            }
        };
        if self.settings.approximation_value() == Approximation::None && bdd.is_none() {
            // Exact probability needs a BDD even when the products come
            // from a ZBDD backend.
            bdd = Some(Bdd::new(&graph, &self.settings));
        }

        let cut_off = self.settings.cut_off_value();
        if cut_off > 0.0 {
            let before = products.len();
            products.retain(|product| product_probability(product, &p_vars) >= cut_off);
            if products.len() < before {
                debug!(
                    "Cut-off {} dropped {} products",
                    cut_off,
                    before - products.len()
                );
            }
        }
        products.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
        debug!("Generated {} products", products.len());
        if products.is_empty() && self.warnings.is_empty() {
            self.warnings.push(format!(
                "No products within the limit order {}.",
                self.settings.limit_order_value()
            ));
        }

        let p_total = match self.settings.approximation_value() {
            Approximation::None => {
                let mut calculator =
                    BddProbabilityCalculator::new(bdd.as_ref().expect("Constructed above."));
                calculator.calculate_total_probability(&p_vars)
            }
            Approximation::RareEvent => {
                let sum = rare_event_probability(&products, &p_vars);
                if sum > 1.0 {
                    self.warnings.push(
                        "The rare-event approximation may be inaccurate for this model."
                            .to_string(),
                    );
                    1.0
                } else {
                    sum
                }
            }
            Approximation::Mcub => mcub_probability(&products, &p_vars),
        };

        let counts = occurrences(&products, p_vars.len());
        let exact = self.settings.approximation_value() == Approximation::None;
        for (position, &occurrence) in counts.iter().enumerate() {
            if occurrence == 0 {
                continue;
            }
            let index = VARIABLE_START_INDEX + position as i32;
            let p_var = p_vars[position];
            let mif = if exact {
                calculate_mif_bdd(bdd.as_ref().expect("Constructed above."), index, &p_vars)
            } else {
                calculate_mif_generic(
                    &products,
                    &mut p_vars.clone(),
                    index,
                    self.settings.approximation_value(),
                )
            };
            self.importance.push(ImportanceRecord {
                event_id: self.basic_event_ids[position].clone(),
                factors: factors_from_mif(occurrence, p_var, mif, p_total),
            });
        }

        self.products = products;
        self.total_probability = Some(p_total);
        self.analyzed = true;
        Ok(())
    }

    /// The generated products as sorted sequences of signed variable
    /// indices, ordered by size then lexicographically.
    pub fn products(&self) -> &[Vec<i32>] {
        &self.products
    }

    /// The size of the largest generated product.
    pub fn max_order(&self) -> usize {
        self.products
            .iter()
            .map(Vec::len)
            .max()
            .unwrap_or(0)
    }

    /// The total probability of the top event, if the analysis has run.
    pub fn total_probability(&self) -> Option<f64> {
        self.total_probability
    }

    /// The importance factors of the basic events occurring in products.
    pub fn importance(&self) -> &[ImportanceRecord] {
        &self.importance
    }

    /// Warnings generated during the analysis.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// The basic event id behind a signed variable index.
    pub fn basic_event_id(&self, literal: i32) -> &str {
        &self.basic_event_ids[(literal.abs() - VARIABLE_START_INDEX) as usize]
    }

    /// The analysis settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}
