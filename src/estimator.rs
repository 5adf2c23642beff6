//! Causal model boundary and the built-in linear backdoor model.
//!
//! A [`CausalModel`] runs the identify → estimate → refute sequence. The
//! orchestration in [`pipeline`](crate::pipeline) depends only on the trait,
//! so alternative estimators can be plugged in without touching it.
//!
//! # LinearBackdoorModel
//!
//! | Step | Behavior |
//! |------|----------|
//! | identify | backdoor adjustment over the caller's confounders |
//! | estimate | OLS of outcome on `[1, treatment, confounders...]` |
//! | refute | placebo treatment: permute the treatment, refit, average |
//!
//! Numeric and boolean confounders enter the design as-is. Categorical and
//! text confounders are one-hot encoded over their sorted levels with the
//! first level dropped. Rows with any missing value are excluded.
//!
//! # Example
//!
//! ```
//! use u_attribution::dataframe::{Column, DataFrame};
//! use u_attribution::estimator::{CausalModel, ColumnSelection, LinearBackdoorModel};
//!
//! let t: Vec<f64> = (0..40).map(|i| (i % 2) as f64).collect();
//! let x: Vec<f64> = (0..40).map(|i| (i % 7) as f64).collect();
//! let y: Vec<f64> = (0..40)
//!     .map(|i| 1.0 + 4.0 * t[i] + 2.0 * x[i] + ((i * 5) % 3) as f64 * 0.1)
//!     .collect();
//! let df = DataFrame::from_columns([
//!     ("T".to_string(), Column::from_f64(t)),
//!     ("X".to_string(), Column::from_f64(x)),
//!     ("Y".to_string(), Column::from_f64(y)),
//! ])
//! .unwrap();
//!
//! let model = LinearBackdoorModel::default();
//! let selection = ColumnSelection::new("T", "Y", ["X"]);
//! let estimand = model.identify(&df, &selection).unwrap();
//! let estimate = model.estimate(&df, &estimand).unwrap();
//! assert!((estimate.value - 4.0).abs() < 0.1);
//! ```

use std::collections::BTreeSet;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::dataframe::{DataFrame, DataType};
use crate::error::AttributionError;

// ── Column selection ──────────────────────────────────────────────────

/// Treatment, outcome, and confounder columns chosen by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSelection {
    pub treatment: String,
    pub outcome: String,
    #[serde(default)]
    pub confounders: Vec<String>,
}

impl ColumnSelection {
    /// Creates a sanitized selection (see [`sanitized`](Self::sanitized)).
    pub fn new<I, S>(treatment: &str, outcome: &str, confounders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            treatment: treatment.to_string(),
            outcome: outcome.to_string(),
            confounders: confounders.into_iter().map(Into::into).collect(),
        }
        .sanitized()
    }

    /// Removes the treatment and outcome from the confounders and drops
    /// duplicates, keeping first occurrences in order.
    pub fn sanitized(mut self) -> Self {
        let mut seen = BTreeSet::new();
        let (treatment, outcome) = (&self.treatment, &self.outcome);
        self.confounders
            .retain(|c| c != treatment && c != outcome && seen.insert(c.clone()));
        self
    }
}

// ── Model boundary ────────────────────────────────────────────────────

/// The adjustment strategy chosen during identification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentifiedEstimand {
    pub treatment: String,
    pub outcome: String,
    /// Variables adjusted for under the backdoor criterion.
    pub backdoor_variables: Vec<String>,
}

/// A point estimate of the treatment effect with its uncertainty.
///
/// Values are raw model output; sanitization happens in the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectEstimate {
    pub value: f64,
    pub standard_error: Option<f64>,
    pub confidence_interval: Option<[f64; 2]>,
    pub p_value: Option<f64>,
    /// Complete rows used in the fit.
    pub observations: usize,
}

/// Result of a robustness check against an estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct Refutation {
    pub estimated_effect: f64,
    /// Effect measured under the refutation's perturbation.
    pub new_effect: Option<f64>,
    pub simulations: usize,
}

/// Identify → estimate → refute.
pub trait CausalModel {
    /// Validates the selection against the dataset and fixes the
    /// adjustment set.
    fn identify(
        &self,
        df: &DataFrame,
        selection: &ColumnSelection,
    ) -> Result<IdentifiedEstimand, AttributionError>;

    /// Estimates the effect of the treatment on the outcome.
    fn estimate(
        &self,
        df: &DataFrame,
        estimand: &IdentifiedEstimand,
    ) -> Result<EffectEstimate, AttributionError>;

    /// Re-estimates under a perturbation that should remove the effect.
    fn refute(
        &self,
        df: &DataFrame,
        estimand: &IdentifiedEstimand,
        estimate: &EffectEstimate,
    ) -> Result<Refutation, AttributionError>;
}

// ── Configuration ─────────────────────────────────────────────────────

/// Estimation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Coverage of the reported confidence interval, in (0, 1).
    pub confidence_level: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            confidence_level: 0.95,
        }
    }
}

/// Placebo refuter parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefuterConfig {
    pub placebo_simulations: usize,
    pub seed: u64,
}

impl Default for RefuterConfig {
    fn default() -> Self {
        Self {
            placebo_simulations: 100,
            seed: 42,
        }
    }
}

// ── LinearBackdoorModel ───────────────────────────────────────────────

/// Backdoor adjustment estimated by ordinary least squares.
#[derive(Debug, Clone, Default)]
pub struct LinearBackdoorModel {
    pub estimator: EstimatorConfig,
    pub refuter: RefuterConfig,
}

impl LinearBackdoorModel {
    /// Creates a model with explicit parameters.
    pub fn new(estimator: EstimatorConfig, refuter: RefuterConfig) -> Self {
        Self { estimator, refuter }
    }
}

impl CausalModel for LinearBackdoorModel {
    fn identify(
        &self,
        df: &DataFrame,
        selection: &ColumnSelection,
    ) -> Result<IdentifiedEstimand, AttributionError> {
        let selection = selection.clone().sanitized();
        df.require_column(&selection.treatment)?;
        df.require_column(&selection.outcome)?;
        for c in &selection.confounders {
            df.require_column(c)?;
        }
        Ok(IdentifiedEstimand {
            treatment: selection.treatment,
            outcome: selection.outcome,
            backdoor_variables: selection.confounders,
        })
    }

    fn estimate(
        &self,
        df: &DataFrame,
        estimand: &IdentifiedEstimand,
    ) -> Result<EffectEstimate, AttributionError> {
        let design = Design::build(df, estimand)?;
        let fit = fit_ols(&design)?;
        let value = fit.coefficients[TREATMENT];

        let dof = design.rows - design.width;
        let sigma2 = fit.rss / dof as f64;
        let se = (sigma2 * fit.inverse[TREATMENT][TREATMENT]).sqrt();

        let (p_value, confidence_interval) = match StudentsT::new(0.0, 1.0, dof as f64) {
            Ok(t_dist) if se.is_finite() && se > 0.0 => {
                let t_stat = value / se;
                let p = 2.0 * (1.0 - t_dist.cdf(t_stat.abs()));
                let alpha = 1.0 - self.estimator.confidence_level;
                let t_crit = t_dist.inverse_cdf(1.0 - alpha / 2.0);
                (Some(p), Some([value - t_crit * se, value + t_crit * se]))
            }
            _ => (None, None),
        };

        tracing::debug!(
            treatment = %estimand.treatment,
            outcome = %estimand.outcome,
            rows = design.rows,
            regressors = design.width,
            effect = value,
            "linear backdoor fit"
        );

        Ok(EffectEstimate {
            value,
            standard_error: Some(se),
            confidence_interval,
            p_value,
            observations: design.rows,
        })
    }

    fn refute(
        &self,
        df: &DataFrame,
        estimand: &IdentifiedEstimand,
        estimate: &EffectEstimate,
    ) -> Result<Refutation, AttributionError> {
        let mut design = Design::build(df, estimand)?;
        let mut placebo = design.treatment();
        let mut rng = ChaCha8Rng::seed_from_u64(self.refuter.seed);

        let mut effects = Vec::with_capacity(self.refuter.placebo_simulations);
        for _ in 0..self.refuter.placebo_simulations {
            placebo.shuffle(&mut rng);
            design.set_treatment(&placebo);
            // A permutation can leave the design singular; skip that draw.
            if let Ok(fit) = fit_ols(&design) {
                effects.push(fit.coefficients[TREATMENT]);
            }
        }

        let new_effect = (!effects.is_empty())
            .then(|| effects.iter().sum::<f64>() / effects.len() as f64);

        tracing::debug!(
            estimated_effect = estimate.value,
            new_effect = ?new_effect,
            simulations = effects.len(),
            "placebo refutation"
        );

        Ok(Refutation {
            estimated_effect: estimate.value,
            new_effect,
            simulations: effects.len(),
        })
    }
}

// ── Design matrix ─────────────────────────────────────────────────────

const INTERCEPT: usize = 0;
const TREATMENT: usize = 1;

/// Row-major regression design over complete rows.
#[derive(Debug, Clone)]
struct Design {
    rows: usize,
    width: usize,
    x: Vec<f64>,
    y: Vec<f64>,
}

impl Design {
    fn build(df: &DataFrame, estimand: &IdentifiedEstimand) -> Result<Self, AttributionError> {
        let y = df.require_column(&estimand.outcome)?.coerce_numeric();
        let mut features = vec![df.require_column(&estimand.treatment)?.coerce_numeric()];
        for name in &estimand.backdoor_variables {
            let column = df.require_column(name)?;
            match column.data_type() {
                DataType::Numeric | DataType::Boolean => features.push(column.coerce_numeric()),
                DataType::Categorical | DataType::Text => {
                    features.extend(one_hot(column.len(), |i| column.display_at(i)))
                }
            }
        }

        let width = features.len() + 1;
        let mut x = Vec::with_capacity(df.row_count() * width);
        let mut ys = Vec::with_capacity(df.row_count());
        for (row, outcome) in y.iter().enumerate() {
            let Some(outcome) = outcome else { continue };
            let values: Option<Vec<f64>> = features.iter().map(|f| f[row]).collect();
            let Some(values) = values else { continue };
            x.push(1.0);
            x.extend(values);
            ys.push(*outcome);
        }

        let rows = ys.len();
        if rows <= width {
            return Err(AttributionError::InsufficientData {
                min_required: width + 1,
                actual: rows,
            });
        }
        Ok(Self {
            rows,
            width,
            x,
            y: ys,
        })
    }

    fn at(&self, row: usize, col: usize) -> f64 {
        self.x[row * self.width + col]
    }

    fn treatment(&self) -> Vec<f64> {
        (0..self.rows).map(|r| self.at(r, TREATMENT)).collect()
    }

    fn set_treatment(&mut self, values: &[f64]) {
        for (r, v) in values.iter().enumerate() {
            self.x[r * self.width + TREATMENT] = *v;
        }
    }
}

/// Dummy columns for each level after the first, in sorted level order.
fn one_hot(len: usize, label: impl Fn(usize) -> Option<String>) -> Vec<Vec<Option<f64>>> {
    let labels: Vec<Option<String>> = (0..len).map(label).collect();
    let levels: BTreeSet<&str> = labels.iter().flatten().map(String::as_str).collect();
    levels
        .into_iter()
        .skip(1)
        .map(|level| {
            labels
                .iter()
                .map(|l| l.as_deref().map(|l| if l == level { 1.0 } else { 0.0 }))
                .collect()
        })
        .collect()
}

// ── OLS ───────────────────────────────────────────────────────────────

struct OlsFit {
    coefficients: Vec<f64>,
    /// `(XᵀX)⁻¹`
    inverse: Vec<Vec<f64>>,
    rss: f64,
}

fn fit_ols(design: &Design) -> Result<OlsFit, AttributionError> {
    let p = design.width;
    let mut xtx = vec![vec![0.0; p]; p];
    let mut xty = vec![0.0; p];
    for r in 0..design.rows {
        let row = &design.x[r * p..(r + 1) * p];
        for i in 0..p {
            xty[i] += row[i] * design.y[r];
            for j in i..p {
                xtx[i][j] += row[i] * row[j];
            }
        }
    }
    for i in 0..p {
        for j in 0..i {
            xtx[i][j] = xtx[j][i];
        }
    }

    let inverse = invert(xtx)?;
    let coefficients: Vec<f64> = inverse
        .iter()
        .map(|row| row.iter().zip(&xty).map(|(a, b)| a * b).sum())
        .collect();

    let rss = (0..design.rows)
        .map(|r| {
            let fitted: f64 = (0..p).map(|c| design.at(r, c) * coefficients[c]).sum();
            let resid = design.y[r] - fitted;
            resid * resid
        })
        .sum();

    Ok(OlsFit {
        coefficients,
        inverse,
        rss,
    })
}

/// Gauss–Jordan inversion with partial pivoting.
///
/// A pivot below `1e-10` of its column's original scale is treated as zero.
fn invert(mut a: Vec<Vec<f64>>) -> Result<Vec<Vec<f64>>, AttributionError> {
    let n = a.len();
    let scale: Vec<f64> = (0..n)
        .map(|c| a.iter().map(|row| row[c].abs()).fold(0.0, f64::max))
        .collect();
    let mut inv: Vec<Vec<f64>> = (0..n)
        .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect();

    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        let pivot = a[pivot_row][col];
        if !pivot.is_finite() || pivot.abs() <= 1e-10 * scale[col] || scale[col] == 0.0 {
            return Err(AttributionError::SingularDesign {
                reason: if col == INTERCEPT {
                    "intercept column is degenerate".to_string()
                } else if col == TREATMENT {
                    "treatment is constant or collinear with confounders".to_string()
                } else {
                    format!("regressor {col} is collinear with earlier regressors")
                },
            });
        }
        a.swap(col, pivot_row);
        inv.swap(col, pivot_row);

        for j in 0..n {
            a[col][j] /= pivot;
            inv[col][j] /= pivot;
        }
        for i in 0..n {
            if i == col {
                continue;
            }
            let factor = a[i][col];
            if factor == 0.0 {
                continue;
            }
            for j in 0..n {
                a[i][j] -= factor * a[col][j];
                inv[i][j] -= factor * inv[col][j];
            }
        }
    }
    Ok(inv)
}
