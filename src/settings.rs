//! Builder for analysis settings
//!
//! Settings are validated on assignment, so an `Settings` value that exists
//! is always internally consistent. Setters are chainable through `?`.

use std::fmt;
use std::str::FromStr;

use crate::error::SettingsError;

/// Backend for product (cut set / prime implicant) generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// Binary decision diagram pipeline.
    Bdd,
    /// Zero-suppressed decision diagram directly from the graph.
    Zbdd,
    /// MOCUS-style gate expansion over a ZBDD cut-set container.
    Mocus,
}

impl FromStr for Algorithm {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bdd" => Ok(Algorithm::Bdd),
            "zbdd" => Ok(Algorithm::Zbdd),
            "mocus" => Ok(Algorithm::Mocus),
            _ => Err(SettingsError::OutOfRange {
                option: "algorithm",
                value: s.to_string(),
                requirement: "must be one of 'bdd', 'zbdd', 'mocus'",
            }),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::Bdd => write!(f, "bdd"),
            Algorithm::Zbdd => write!(f, "zbdd"),
            Algorithm::Mocus => write!(f, "mocus"),
        }
    }
}

/// Probability formula applied over the generated products.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Approximation {
    /// Exact probability by BDD traversal.
    None,
    /// The rare-event approximation (sum of product probabilities).
    RareEvent,
    /// The min-cut upper bound approximation.
    Mcub,
}

impl FromStr for Approximation {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" | "no" => Ok(Approximation::None),
            "rare-event" => Ok(Approximation::RareEvent),
            "mcub" => Ok(Approximation::Mcub),
            _ => Err(SettingsError::OutOfRange {
                option: "approximation",
                value: s.to_string(),
                requirement: "must be one of 'none', 'rare-event', 'mcub'",
            }),
        }
    }
}

impl fmt::Display for Approximation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Approximation::None => write!(f, "none"),
            Approximation::RareEvent => write!(f, "rare-event"),
            Approximation::Mcub => write!(f, "mcub"),
        }
    }
}

/// Analysis settings with validated builder-style setters.
///
/// # Examples
///
/// ```
/// use cutset_logic::Settings;
///
/// # fn main() -> Result<(), cutset_logic::SettingsError> {
/// let mut settings = Settings::default();
/// settings.limit_order(5)?.cut_off(1e-10)?.mission_time(8760.0)?;
/// assert_eq!(settings.limit_order_value(), 5);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Settings {
    algorithm: Algorithm,
    approximation: Approximation,
    prime_implicants: bool,
    ccf_analysis: bool,
    safety_integrity_levels: bool,
    limit_order: i32,
    cut_off: f64,
    mission_time: f64,
    time_step: f64,
    num_trials: i32,
    num_quantiles: i32,
    num_bins: i32,
    seed: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            algorithm: Algorithm::Bdd,
            approximation: Approximation::None,
            prime_implicants: false,
            ccf_analysis: false,
            safety_integrity_levels: false,
            limit_order: 20,
            cut_off: 0.0,
            mission_time: 8760.0,
            time_step: 0.0,
            num_trials: 1000,
            num_quantiles: 20,
            num_bins: 20,
            seed: None,
        }
    }
}

impl Settings {
    /// Sets the product-generation backend.
    ///
    /// Moving away from the BDD backend is rejected
    /// while prime implicants are requested.
    pub fn algorithm(&mut self, value: Algorithm) -> Result<&mut Self, SettingsError> {
        if self.prime_implicants && value != Algorithm::Bdd {
            return Err(SettingsError::IncompatibleSettings {
                message: "Prime implicants require the BDD algorithm.".to_string(),
            });
        }
        self.algorithm = value;
        Ok(self)
    }

    /// Sets the probability approximation.
    ///
    /// Approximations are rejected while prime implicants are requested.
    pub fn approximation(&mut self, value: Approximation) -> Result<&mut Self, SettingsError> {
        if self.prime_implicants && value != Approximation::None {
            return Err(SettingsError::IncompatibleSettings {
                message: "Prime implicants cannot be combined with probability approximations."
                    .to_string(),
            });
        }
        self.approximation = value;
        Ok(self)
    }

    /// Requests prime implicants instead of minimal cut sets.
    ///
    /// Requires the BDD algorithm and forces the exact probability formula.
    pub fn prime_implicants(&mut self, flag: bool) -> Result<&mut Self, SettingsError> {
        if flag && self.algorithm != Algorithm::Bdd {
            return Err(SettingsError::IncompatibleSettings {
                message: "Prime implicants require the BDD algorithm.".to_string(),
            });
        }
        self.prime_implicants = flag;
        if flag {
            self.approximation = Approximation::None;
        }
        Ok(self)
    }

    /// Enables substitution of basic events with their CCF proxy gates.
    pub fn ccf_analysis(&mut self, flag: bool) -> &mut Self {
        self.ccf_analysis = flag;
        self
    }

    /// Requests safety-integrity-level metrics; requires a positive time step.
    pub fn safety_integrity_levels(&mut self, flag: bool) -> Result<&mut Self, SettingsError> {
        if flag && self.time_step <= 0.0 {
            return Err(SettingsError::IncompatibleSettings {
                message: "Safety integrity levels require a positive time step.".to_string(),
            });
        }
        self.safety_integrity_levels = flag;
        Ok(self)
    }

    /// Sets the limit on the size of the largest product.
    pub fn limit_order(&mut self, order: i32) -> Result<&mut Self, SettingsError> {
        if order < 1 {
            return Err(SettingsError::OutOfRange {
                option: "limit_order",
                value: order.to_string(),
                requirement: "the limit on the product order must be at least 1",
            });
        }
        self.limit_order = order;
        Ok(self)
    }

    /// Sets the probability cut-off below which products are dropped.
    pub fn cut_off(&mut self, prob: f64) -> Result<&mut Self, SettingsError> {
        if !(0.0..=1.0).contains(&prob) {
            return Err(SettingsError::OutOfRange {
                option: "cut_off",
                value: prob.to_string(),
                requirement: "the cut-off probability must be in [0, 1]",
            });
        }
        self.cut_off = prob;
        Ok(self)
    }

    /// Sets the system mission time in hours.
    pub fn mission_time(&mut self, time: f64) -> Result<&mut Self, SettingsError> {
        if time < 0.0 || !time.is_finite() {
            return Err(SettingsError::OutOfRange {
                option: "mission_time",
                value: time.to_string(),
                requirement: "the mission time cannot be negative",
            });
        }
        self.mission_time = time;
        Ok(self)
    }

    /// Sets the time step for periodic evaluation.
    pub fn time_step(&mut self, step: f64) -> Result<&mut Self, SettingsError> {
        if step < 0.0 || !step.is_finite() {
            return Err(SettingsError::OutOfRange {
                option: "time_step",
                value: step.to_string(),
                requirement: "the time step cannot be negative",
            });
        }
        if step == 0.0 && self.safety_integrity_levels {
            return Err(SettingsError::IncompatibleSettings {
                message: "Safety integrity levels require a positive time step.".to_string(),
            });
        }
        self.time_step = step;
        Ok(self)
    }

    /// Sets the number of trials for the uncertainty layer.
    pub fn num_trials(&mut self, n: i32) -> Result<&mut Self, SettingsError> {
        if n < 1 {
            return Err(SettingsError::OutOfRange {
                option: "num_trials",
                value: n.to_string(),
                requirement: "the number of trials must be at least 1",
            });
        }
        self.num_trials = n;
        Ok(self)
    }

    /// Sets the number of quantiles for the uncertainty layer.
    pub fn num_quantiles(&mut self, n: i32) -> Result<&mut Self, SettingsError> {
        if n < 1 {
            return Err(SettingsError::OutOfRange {
                option: "num_quantiles",
                value: n.to_string(),
                requirement: "the number of quantiles must be at least 1",
            });
        }
        self.num_quantiles = n;
        Ok(self)
    }

    /// Sets the number of histogram bins for the uncertainty layer.
    pub fn num_bins(&mut self, n: i32) -> Result<&mut Self, SettingsError> {
        if n < 1 {
            return Err(SettingsError::OutOfRange {
                option: "num_bins",
                value: n.to_string(),
                requirement: "the number of bins must be at least 1",
            });
        }
        self.num_bins = n;
        Ok(self)
    }

    /// Sets the PRNG seed forwarded to the uncertainty layer.
    pub fn seed(&mut self, seed: u64) -> &mut Self {
        self.seed = Some(seed);
        self
    }

    /// Reduces the limit order without validation.
    ///
    /// Module analyses receive tightened cut-offs that may legally be 0.
    pub(crate) fn adjust_limit_order(&self, limit: i32) -> Settings {
        debug_assert!(limit >= 0, "Order cut-off is not strict.");
        let mut adjusted = self.clone();
        adjusted.limit_order = limit;
        adjusted
    }

    /// The selected product-generation backend.
    pub fn algorithm_value(&self) -> Algorithm {
        self.algorithm
    }

    /// The selected probability approximation.
    pub fn approximation_value(&self) -> Approximation {
        self.approximation
    }

    /// Whether prime implicants are requested instead of cut sets.
    pub fn prime_implicants_value(&self) -> bool {
        self.prime_implicants
    }

    /// Whether CCF proxy substitution is enabled.
    pub fn ccf_analysis_value(&self) -> bool {
        self.ccf_analysis
    }

    /// Whether safety-integrity-level metrics are requested.
    pub fn safety_integrity_levels_value(&self) -> bool {
        self.safety_integrity_levels
    }

    /// The limit on product size.
    pub fn limit_order_value(&self) -> i32 {
        self.limit_order
    }

    /// The product probability cut-off.
    pub fn cut_off_value(&self) -> f64 {
        self.cut_off
    }

    /// The system mission time.
    pub fn mission_time_value(&self) -> f64 {
        self.mission_time
    }

    /// The time step for periodic evaluation.
    pub fn time_step_value(&self) -> f64 {
        self.time_step
    }

    /// The number of trials for the uncertainty layer.
    pub fn num_trials_value(&self) -> i32 {
        self.num_trials
    }

    /// The number of quantiles for the uncertainty layer.
    pub fn num_quantiles_value(&self) -> i32 {
        self.num_quantiles
    }

    /// The number of histogram bins for the uncertainty layer.
    pub fn num_bins_value(&self) -> i32 {
        self.num_bins
    }

    /// The PRNG seed, if one was set.
    pub fn seed_value(&self) -> Option<u64> {
        self.seed
    }
}
