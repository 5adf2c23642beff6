//! Model-free uplift diagnostics: treated vs. control outcome means.
//!
//! # Algorithm
//!
//! 1. Coerce the treatment and outcome columns to numbers and drop rows
//!    where either fails (pairwise deletion).
//! 2. Partition on `treatment >= threshold` (treated) vs. below (control).
//! 3. Report both means, their difference, the relative uplift against the
//!    control mean, and a Welch-style standard error
//!    `sqrt(var_t / n_t + var_c / n_c)` using sample variances (n − 1).
//! 4. When the standard error is positive, attach the large-sample Wald
//!    interval `uplift ± z · se`.
//!
//! The summary is *absent* rather than an error when a column is missing,
//! no row survives coercion, or either partition is empty.
//!
//! # Example
//!
//! ```
//! use u_attribution::csv_parser::CsvParser;
//! use u_attribution::uplift::compute_uplift_summary;
//!
//! let df = CsvParser::new()
//!     .parse_str("T,Y\n1,10\n1,20\n0,5\n0,7\n")
//!     .unwrap();
//! let s = compute_uplift_summary(&df, "T", "Y").unwrap();
//! assert_eq!(s.treatment_mean, Some(15.0));
//! assert_eq!(s.control_mean, Some(6.0));
//! assert_eq!(s.absolute_uplift, Some(9.0));
//! assert_eq!(s.relative_uplift_pct, Some(150.0));
//! assert!(compute_uplift_summary(&df, "T", "missing").is_none());
//! ```

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::dataframe::DataFrame;
use crate::sanitize::finite;

/// A two-sided interval `[lower, upper]`; a bound is `None` when it is not
/// a finite number.
pub type Interval = [Option<f64>; 2];

/// Uplift computation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpliftConfig {
    /// Rows with coerced treatment at or above this value are treated.
    pub treatment_threshold: f64,
    /// Normal critical value for the approximate interval.
    pub z_critical: f64,
}

impl Default for UpliftConfig {
    fn default() -> Self {
        Self {
            treatment_threshold: 0.5,
            z_critical: 1.96,
        }
    }
}

/// Treated-vs-control summary. Every float field is finite or `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpliftSummary {
    pub treatment_mean: Option<f64>,
    pub control_mean: Option<f64>,
    pub absolute_uplift: Option<f64>,
    pub relative_uplift_pct: Option<f64>,
    pub treatment_count: usize,
    pub control_count: usize,
    pub standard_error: Option<f64>,
    pub approximate_confidence_interval: Option<Interval>,
}

/// Computes the uplift summary with the default threshold (0.5) and
/// critical value (1.96).
pub fn compute_uplift_summary(
    df: &DataFrame,
    treatment: &str,
    outcome: &str,
) -> Option<UpliftSummary> {
    compute_uplift_summary_with(df, treatment, outcome, &UpliftConfig::default())
}

/// Computes the uplift summary with explicit parameters.
pub fn compute_uplift_summary_with(
    df: &DataFrame,
    treatment: &str,
    outcome: &str,
    config: &UpliftConfig,
) -> Option<UpliftSummary> {
    let treatments = df.coerce_numeric(treatment)?;
    let outcomes = df.coerce_numeric(outcome)?;

    let mut treated: Vec<f64> = Vec::new();
    let mut control: Vec<f64> = Vec::new();
    for (t, y) in treatments.iter().zip(&outcomes) {
        if let (Some(t), Some(y)) = (t, y) {
            if *t >= config.treatment_threshold {
                treated.push(*y);
            } else {
                control.push(*y);
            }
        }
    }
    if treated.is_empty() || control.is_empty() {
        return None;
    }

    let n_t = treated.len();
    let n_c = control.len();
    let treatment_mean = treated.iter().mean();
    let control_mean = control.iter().mean();
    let absolute_uplift = treatment_mean - control_mean;

    let standard_error = if n_t > 1 && n_c > 1 {
        let var_t = treated.iter().variance();
        let var_c = control.iter().variance();
        // NaN must be caught before clamping: f64::max(NaN, 0.0) is 0.0.
        let pooled = var_t / n_t as f64 + var_c / n_c as f64;
        (var_t.is_finite() && var_c.is_finite() && !pooled.is_nan())
            .then(|| pooled.max(0.0).sqrt())
            .and_then(finite)
    } else {
        None
    };

    let approximate_confidence_interval = standard_error
        .filter(|&se| se > 0.0)
        .map(|se| {
            let half_width = config.z_critical * se;
            [
                finite(absolute_uplift - half_width),
                finite(absolute_uplift + half_width),
            ]
        });

    let relative_uplift_pct =
        (control_mean != 0.0).then(|| absolute_uplift / control_mean * 100.0);

    Some(UpliftSummary {
        treatment_mean: finite(treatment_mean),
        control_mean: finite(control_mean),
        absolute_uplift: finite(absolute_uplift),
        relative_uplift_pct: relative_uplift_pct.and_then(finite),
        treatment_count: n_t,
        control_count: n_c,
        standard_error,
        approximate_confidence_interval,
    })
}
