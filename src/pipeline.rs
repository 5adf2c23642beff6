//! End-to-end effect estimation: model → estimate → refute, plus uplift
//! diagnostics and the confidence-interval fallback.
//!
//! Everything returned from here is JSON-safe: non-finite numbers have been
//! replaced by `None`.
//!
//! ```
//! use u_attribution::config::AttributionConfig;
//! use u_attribution::estimator::ColumnSelection;
//! use u_attribution::pipeline::analyze;
//! use u_attribution::simulate::simulate_dataset;
//!
//! let config = AttributionConfig::default();
//! let df = simulate_dataset(400, 42).unwrap();
//! let selection = ColumnSelection::new("Treatment", "Outcome", ["Age", "Income", "LoyaltyScore"]);
//!
//! let response = analyze(&df, &selection, &config.model(), &config).unwrap();
//! let effect = response.result.estimate_value.unwrap();
//! assert!((effect - 20.0).abs() < 5.0);
//! assert!(response.graph_dot.starts_with("digraph"));
//! ```

use serde::Serialize;

use crate::config::AttributionConfig;
use crate::dataframe::DataFrame;
use crate::error::AttributionError;
use crate::estimator::{CausalModel, ColumnSelection};
use crate::graph::CausalGraph;
use crate::sanitize::finite;
use crate::uplift::{compute_uplift_summary_with, Interval, UpliftSummary};

/// Where the reported confidence interval came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalSource {
    Estimator,
    /// The model's interval was unusable; the uplift Wald interval was
    /// substituted.
    UpliftFallback,
}

/// Result of one causal analysis request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CausalEffect {
    pub estimate_value: Option<f64>,
    pub confidence_intervals: Option<Interval>,
    pub confidence_interval_source: Option<IntervalSource>,
    pub p_value: Option<f64>,
    pub refutation_result: Option<f64>,
    pub uplift_summary: Option<UpliftSummary>,
    /// Adjustment set actually used, after sanitization.
    pub confounders: Vec<String>,
}

/// Effect estimate together with its causal diagram.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResponse {
    pub result: CausalEffect,
    /// Graphviz DOT source of the diagram.
    pub graph_dot: String,
}

/// Runs identification, estimation, and refutation through `model` and
/// attaches the uplift summary.
pub fn estimate_causal_effect(
    df: &DataFrame,
    selection: &ColumnSelection,
    model: &dyn CausalModel,
    config: &AttributionConfig,
) -> Result<CausalEffect, AttributionError> {
    let selection = selection.clone().sanitized();
    let uplift_summary =
        compute_uplift_summary_with(df, &selection.treatment, &selection.outcome, &config.uplift);

    let estimand = model.identify(df, &selection)?;
    let estimate = model.estimate(df, &estimand)?;
    let refutation = model.refute(df, &estimand, &estimate)?;

    let estimator_ci: Option<Interval> = estimate
        .confidence_interval
        .map(|[lo, hi]| [finite(lo), finite(hi)]);
    let fallback_ci = uplift_summary
        .as_ref()
        .and_then(|s| s.approximate_confidence_interval);

    let (confidence_intervals, confidence_interval_source) = match estimator_ci {
        Some([Some(lo), Some(hi)]) => (Some([Some(lo), Some(hi)]), Some(IntervalSource::Estimator)),
        _ => match fallback_ci {
            Some([Some(lo), Some(hi)]) => {
                tracing::info!(
                    treatment = %selection.treatment,
                    outcome = %selection.outcome,
                    "estimator interval unusable, using uplift interval"
                );
                (Some([Some(lo), Some(hi)]), Some(IntervalSource::UpliftFallback))
            }
            _ => (None, None),
        },
    };

    Ok(CausalEffect {
        estimate_value: finite(estimate.value),
        confidence_intervals,
        confidence_interval_source,
        p_value: estimate.p_value.and_then(finite),
        refutation_result: refutation.new_effect.and_then(finite),
        uplift_summary,
        confounders: estimand.backdoor_variables,
    })
}

/// [`estimate_causal_effect`] plus the rendered causal diagram.
pub fn analyze(
    df: &DataFrame,
    selection: &ColumnSelection,
    model: &dyn CausalModel,
    config: &AttributionConfig,
) -> Result<AnalysisResponse, AttributionError> {
    let result = estimate_causal_effect(df, selection, model, config)?;
    let graph_dot = CausalGraph::from_selection(selection).to_dot();
    tracing::info!(
        treatment = %selection.treatment,
        outcome = %selection.outcome,
        confounders = result.confounders.len(),
        effect = ?result.estimate_value,
        "analysis complete"
    );
    Ok(AnalysisResponse { result, graph_dot })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataframe::Column;
    use crate::estimator::{EffectEstimate, IdentifiedEstimand, Refutation};
    use crate::simulate::simulate_dataset;

    /// Returns a fixed estimate so the fallback logic can be exercised.
    struct FixedModel {
        value: f64,
        interval: Option<[f64; 2]>,
    }

    impl CausalModel for FixedModel {
        fn identify(
            &self,
            _: &DataFrame,
            selection: &ColumnSelection,
        ) -> Result<IdentifiedEstimand, AttributionError> {
            Ok(IdentifiedEstimand {
                treatment: selection.treatment.clone(),
                outcome: selection.outcome.clone(),
                backdoor_variables: selection.confounders.clone(),
            })
        }

        fn estimate(
            &self,
            _: &DataFrame,
            _: &IdentifiedEstimand,
        ) -> Result<EffectEstimate, AttributionError> {
            Ok(EffectEstimate {
                value: self.value,
                standard_error: None,
                confidence_interval: self.interval,
                p_value: Some(f64::NAN),
                observations: 4,
            })
        }

        fn refute(
            &self,
            _: &DataFrame,
            _: &IdentifiedEstimand,
            estimate: &EffectEstimate,
        ) -> Result<Refutation, AttributionError> {
            Ok(Refutation {
                estimated_effect: estimate.value,
                new_effect: Some(f64::INFINITY),
                simulations: 1,
            })
        }
    }

    fn scenario() -> DataFrame {
        DataFrame::from_columns([
            ("T".to_string(), Column::from_f64(vec![1.0, 1.0, 0.0, 0.0])),
            ("Y".to_string(), Column::from_f64(vec![10.0, 20.0, 5.0, 7.0])),
        ])
        .unwrap()
    }

    #[test]
    fn simulated_effect_is_recovered() {
        let config = AttributionConfig::default();
        let df = simulate_dataset(1000, 42).unwrap();
        let selection =
            ColumnSelection::new("Treatment", "Outcome", ["Age", "Income", "LoyaltyScore", "Treatment"]);
        let effect = estimate_causal_effect(&df, &selection, &config.model(), &config).unwrap();

        let value = effect.estimate_value.unwrap();
        assert!((value - 20.0).abs() < 3.0, "effect {value}");
        assert_eq!(effect.confounders, vec!["Age", "Income", "LoyaltyScore"]);
        assert_eq!(effect.confidence_interval_source, Some(IntervalSource::Estimator));
        let [lo, hi] = effect.confidence_intervals.unwrap();
        assert!(lo.unwrap() < value && value < hi.unwrap());
        assert!(effect.p_value.unwrap() < 0.01);
        assert!(effect.refutation_result.unwrap().abs() < 5.0);
        assert!(effect.uplift_summary.is_some());
    }

    #[test]
    fn missing_interval_falls_back_to_uplift() {
        let model = FixedModel {
            value: 9.0,
            interval: None,
        };
        let config = AttributionConfig::default();
        let effect =
            estimate_causal_effect(&scenario(), &ColumnSelection::new("T", "Y", Vec::<String>::new()), &model, &config)
                .unwrap();
        assert_eq!(effect.confidence_interval_source, Some(IntervalSource::UpliftFallback));
        assert_eq!(
            effect.confidence_intervals,
            effect.uplift_summary.as_ref().unwrap().approximate_confidence_interval
        );
        assert_eq!(effect.p_value, None);
        assert_eq!(effect.refutation_result, None);
    }

    #[test]
    fn half_finite_interval_falls_back_to_uplift() {
        let model = FixedModel {
            value: 9.0,
            interval: Some([f64::NEG_INFINITY, 12.0]),
        };
        let config = AttributionConfig::default();
        let effect =
            estimate_causal_effect(&scenario(), &ColumnSelection::new("T", "Y", Vec::<String>::new()), &model, &config)
                .unwrap();
        assert_eq!(effect.confidence_interval_source, Some(IntervalSource::UpliftFallback));
    }

    #[test]
    fn no_usable_interval_is_null() {
        // every row is treated, so there is no uplift interval either
        let df = DataFrame::from_columns([
            ("T".to_string(), Column::from_f64(vec![1.0, 1.0, 1.0])),
            ("Y".to_string(), Column::from_f64(vec![1.0, 2.0, 3.0])),
        ])
        .unwrap();
        let model = FixedModel {
            value: f64::NAN,
            interval: Some([f64::NAN, 1.0]),
        };
        let effect = estimate_causal_effect(
            &df,
            &ColumnSelection::new("T", "Y", Vec::<String>::new()),
            &model,
            &AttributionConfig::default(),
        )
        .unwrap();
        assert_eq!(effect.estimate_value, None);
        assert_eq!(effect.confidence_intervals, None);
        assert_eq!(effect.confidence_interval_source, None);
        assert_eq!(effect.uplift_summary, None);

        let json = serde_json::to_value(&effect).unwrap();
        assert!(json["confidence_intervals"].is_null());
        assert!(json["uplift_summary"].is_null());
    }

    #[test]
    fn unbounded_uplift_interval_is_not_substituted() {
        // the half-width overflows, so both uplift bounds are null
        let mut config = AttributionConfig::default();
        config.uplift.z_critical = f64::MAX;
        let model = FixedModel {
            value: 9.0,
            interval: None,
        };
        let effect = estimate_causal_effect(
            &scenario(),
            &ColumnSelection::new("T", "Y", Vec::<String>::new()),
            &model,
            &config,
        )
        .unwrap();
        let uplift = effect.uplift_summary.as_ref().unwrap();
        assert!(uplift.standard_error.unwrap() > 0.0);
        assert_eq!(uplift.approximate_confidence_interval, Some([None, None]));
        assert_eq!(effect.confidence_intervals, None);
        assert_eq!(effect.confidence_interval_source, None);
    }

    #[test]
    fn non_finite_outcomes_leave_interval_null() {
        let df = DataFrame::from_columns([
            ("T".to_string(), Column::from_f64(vec![1.0, 1.0, 0.0, 0.0])),
            ("Y".to_string(), Column::from_f64(vec![f64::INFINITY, 1.0, 2.0, 3.0])),
        ])
        .unwrap();
        let model = FixedModel {
            value: 9.0,
            interval: None,
        };
        let effect = estimate_causal_effect(
            &df,
            &ColumnSelection::new("T", "Y", Vec::<String>::new()),
            &model,
            &AttributionConfig::default(),
        )
        .unwrap();
        assert_eq!(effect.uplift_summary.as_ref().unwrap().approximate_confidence_interval, None);
        assert_eq!(effect.confidence_intervals, None);
        assert_eq!(effect.confidence_interval_source, None);
    }

    #[test]
    fn finite_estimator_interval_is_kept() {
        let model = FixedModel {
            value: 9.0,
            interval: Some([1.0, 17.0]),
        };
        let effect = estimate_causal_effect(
            &scenario(),
            &ColumnSelection::new("T", "Y", Vec::<String>::new()),
            &model,
            &AttributionConfig::default(),
        )
        .unwrap();
        assert_eq!(effect.confidence_intervals, Some([Some(1.0), Some(17.0)]));
        assert_eq!(effect.confidence_interval_source, Some(IntervalSource::Estimator));
    }

    #[test]
    fn model_errors_propagate() {
        let config = AttributionConfig::default();
        let err = estimate_causal_effect(
            &scenario(),
            &ColumnSelection::new("T", "Revenue", Vec::<String>::new()),
            &config.model(),
            &config,
        )
        .unwrap_err();
        assert_eq!(
            err,
            AttributionError::ColumnNotFound {
                name: "Revenue".into()
            }
        );
    }

    #[test]
    fn analyze_serializes_result_and_graph() {
        let config = AttributionConfig::default();
        let df = simulate_dataset(200, 3).unwrap();
        let selection = ColumnSelection::new("Treatment", "Outcome", ["Age"]);
        let response = analyze(&df, &selection, &config.model(), &config).unwrap();

        let json = serde_json::to_value(&response).unwrap();
        assert!(json["result"]["estimate_value"].is_number());
        assert_eq!(json["result"]["confidence_interval_source"], "estimator");
        assert!(json["graph_dot"].as_str().unwrap().contains("fillcolor=lightgrey"));
        let text = serde_json::to_string(&response).unwrap();
        assert!(!text.contains("NaN") && !text.contains("Infinity"));
    }
}
