//! Result Interpreter
//!
//! Best-effort post-processing of an execution result: a chart recommendation
//! and a plain-language summary. Neither step can fail the request; each has
//! a local fallback.

pub mod chart;
pub mod narrative;

pub use chart::{ChartAdvisor, ChartConfig, ChartType, ColumnKind, ColumnProfile};
pub use narrative::{fallback_summary, NarrativeWriter};
