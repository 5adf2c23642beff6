//! # u-attribution
//!
//! Marketing attribution engine with C FFI bindings.
//!
//! Given a table of customers, a treatment column (who got the campaign), an
//! outcome column (what they spent), and a set of confounders, it estimates
//! the campaign's causal effect and reports:
//!
//! - **Effect** — backdoor-adjusted linear estimate, interval, p-value, and
//!   a placebo-treatment refutation
//! - **Uplift** — model-free treated vs. control diagnostics
//! - **Diagram** — the assumed causal graph as Graphviz DOT
//!
//! Every number handed to a consumer is finite or `null`.
//!
//! ## Modules
//!
//! - [`dataframe`] — Column-major tabular data model (DataFrame, Column, DataType)
//! - [`csv_parser`] — CSV parsing with type inference, upload dispatch, CSV writer
//! - [`sanitize`] — JSON-safe numeric coercion (`safe_float`)
//! - [`uplift`] — Difference-in-means uplift summary with Wald interval
//! - [`estimator`] — `CausalModel` boundary and the OLS backdoor model
//! - [`pipeline`] — Identify → estimate → refute orchestration, interval fallback
//! - [`graph`] — Causal diagram (petgraph) rendered to DOT
//! - [`simulate`] — Synthetic shoppers and Online-Retail RFM preprocessing
//! - [`session`] — Current-dataset repository and content-addressed snapshots
//! - [`config`] — Layered TOML + environment configuration
//! - [`telemetry`] — Tracing subscriber setup
//! - [`ffi`] — C FFI bindings (opaque session handle, JSON results, cbindgen header)
//! - [`error`] — Error types
//!
//! ## Quick Start
//!
//! ```
//! use u_attribution::csv_parser::CsvParser;
//! use u_attribution::sanitize::{safe_float, SafeValue};
//! use u_attribution::uplift::compute_uplift_summary;
//!
//! let csv = "Treatment,Outcome\n1,10\n1,20\n0,5\n0,7\n";
//! let df = CsvParser::new().parse_str(csv).unwrap();
//!
//! let summary = compute_uplift_summary(&df, "Treatment", "Outcome").unwrap();
//! assert_eq!(summary.absolute_uplift, Some(9.0));
//! assert_eq!(summary.relative_uplift_pct, Some(150.0));
//! assert_eq!((summary.treatment_count, summary.control_count), (2, 2));
//!
//! assert_eq!(safe_float(&f64::NAN.into()), SafeValue::Null);
//! ```

pub mod config;
pub mod csv_parser;
pub mod dataframe;
pub mod error;
pub mod estimator;
pub mod ffi;
pub mod graph;
pub mod pipeline;
pub mod sanitize;
pub mod session;
pub mod simulate;
pub mod telemetry;
pub mod uplift;
