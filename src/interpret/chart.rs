//! Chart decision: shape heuristics decide whether a chart is worth asking
//! for, the language model picks the chart type and axes.

use crate::llm::{extract_json, LanguageModel};
use crate::schema::Record;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Rows inspected per column when classifying.
pub const CLASSIFY_SAMPLE_ROWS: usize = 10;
/// Rows shown to the model.
pub const PROMPT_SAMPLE_ROWS: usize = 3;

const VISUALIZATION_KEYWORDS: [&str; 13] = [
    "chart", "graph", "plot", "visual", "trend", "distribution", "breakdown", "compare",
    "comparison", "pie", "bar", "line chart", "over time",
];

const MONTHS: [&str; 24] = [
    "jan", "january", "feb", "february", "mar", "march", "apr", "april", "may", "jun", "june",
    "jul", "july", "aug", "august", "sep", "sept", "september", "oct", "october", "nov",
    "november", "dec", "december",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Bar,
    Line,
    Pie,
    Area,
    Scatter,
}

impl FromStr for ChartType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bar" => Ok(ChartType::Bar),
            "line" => Ok(ChartType::Line),
            "pie" => Ok(ChartType::Pie),
            "area" => Ok(ChartType::Area),
            "scatter" => Ok(ChartType::Scatter),
            other => Err(format!("Unsupported chart type: {}", other)),
        }
    }
}

impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChartType::Bar => "bar",
            ChartType::Line => "line",
            ChartType::Pie => "pie",
            ChartType::Area => "area",
            ChartType::Scatter => "scatter",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartConfig {
    pub should_visualize: bool,
    pub chart_type: Option<ChartType>,
    pub x_axis: Option<String>,
    pub y_axis: Option<String>,
    pub explanation: Option<String>,
}

impl ChartConfig {
    pub fn none() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Numeric,
    DateLike,
    Categorical,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnProfile {
    pub numeric: Vec<String>,
    pub date_like: Vec<String>,
    pub categorical: Vec<String>,
}

impl ColumnProfile {
    pub fn from_data(data: &[Record], columns: &[String]) -> Self {
        let sample = &data[..data.len().min(CLASSIFY_SAMPLE_ROWS)];
        let mut profile = Self::default();
        for column in columns {
            let values = sample.iter().filter_map(|row| row.get(column));
            match classify_values(values) {
                ColumnKind::Numeric => profile.numeric.push(column.clone()),
                ColumnKind::DateLike => profile.date_like.push(column.clone()),
                ColumnKind::Categorical => profile.categorical.push(column.clone()),
            }
        }
        profile
    }
}

fn is_numeric(value: &Value) -> bool {
    match value {
        Value::Number(_) => true,
        Value::String(s) => s.trim().parse::<f64>().is_ok(),
        _ => false,
    }
}

fn is_date_like(value: &Value) -> bool {
    let Value::String(s) = value else {
        return false;
    };
    let has_digit = s.chars().any(|c| c.is_ascii_digit());
    if has_digit && (s.contains('-') || s.contains('/')) {
        return true;
    }
    s.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|word| MONTHS.contains(&word))
}

/// Numeric if every non-null value parses as a float, date-like if every
/// non-null value looks like a date, categorical otherwise.
pub fn classify_values<'a>(values: impl Iterator<Item = &'a Value>) -> ColumnKind {
    let present: Vec<&Value> = values.filter(|v| !v.is_null()).collect();
    if present.is_empty() {
        return ColumnKind::Categorical;
    }
    if present.iter().all(|v| is_numeric(v)) {
        ColumnKind::Numeric
    } else if present.iter().all(|v| is_date_like(v)) {
        ColumnKind::DateLike
    } else {
        ColumnKind::Categorical
    }
}

pub fn mentions_visualization(question: &str) -> bool {
    let question = question.to_lowercase();
    VISUALIZATION_KEYWORDS.iter().any(|kw| question.contains(kw))
}

/// Whether the result shape alone suggests a chart.
pub fn shape_suggests_chart(profile: &ColumnProfile, row_count: usize) -> bool {
    let numeric = !profile.numeric.is_empty();
    (numeric && !profile.categorical.is_empty() && row_count >= 2)
        || (!profile.date_like.is_empty() && row_count >= 3)
        || (numeric && row_count >= 5)
}

#[derive(Debug, Deserialize)]
struct ChartReply {
    #[serde(default = "default_true")]
    should_visualize: bool,
    chart_type: Option<String>,
    x_axis: Option<String>,
    y_axis: Option<String>,
    explanation: Option<String>,
}

fn default_true() -> bool {
    true
}

pub struct ChartAdvisor {
    llm: Arc<dyn LanguageModel>,
}

impl ChartAdvisor {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    pub async fn classify(&self, question: &str, data: &[Record], columns: &[String]) -> ChartConfig {
        // A single row has nothing to compare against.
        if data.len() < 2 || columns.is_empty() {
            return ChartConfig::none();
        }

        let profile = ColumnProfile::from_data(data, columns);
        let asked = mentions_visualization(question);
        if !asked && !shape_suggests_chart(&profile, data.len()) {
            debug!("Result shape does not call for a chart");
            return ChartConfig::none();
        }

        let prompt = match self.prompt(question, data, columns, &profile) {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!("Could not render chart prompt: {}", e);
                return ChartConfig::none();
            }
        };

        match self.llm.generate(&prompt).await {
            Ok(reply) => {
                let config = parse_reply(&reply, columns);
                if config.should_visualize {
                    info!(
                        "Recommending {} chart",
                        config.chart_type.map(|t| t.to_string()).unwrap_or_default()
                    );
                }
                config
            }
            Err(e) => {
                warn!("Chart classification failed: {}", e);
                ChartConfig::none()
            }
        }
    }

    fn prompt(
        &self,
        question: &str,
        data: &[Record],
        columns: &[String],
        profile: &ColumnProfile,
    ) -> serde_json::Result<String> {
        let sample = serde_json::to_string_pretty(&data[..data.len().min(PROMPT_SAMPLE_ROWS)])?;
        Ok(format!(
            r#"You choose how to visualize the result of a database query.

User question: "{question}"
Columns: {columns}
Numeric columns: {numeric}
Date-like columns: {dates}
Categorical columns: {categorical}
Total rows: {rows}
Sample rows:
{sample}

Pick one chart type from: bar, line, pie, area, scatter.
Use a date-like column on the x axis for trends, a categorical column for comparisons,
and a numeric column on the y axis.

Return JSON in this exact format:
{{
  "should_visualize": true,
  "chart_type": "bar",
  "x_axis": "column_name",
  "y_axis": "column_name",
  "explanation": "One sentence on why this chart fits"
}}

Only return the JSON, no other text."#,
            columns = columns.join(", "),
            numeric = profile.numeric.join(", "),
            dates = profile.date_like.join(", "),
            categorical = profile.categorical.join(", "),
            rows = data.len(),
        ))
    }
}

/// Accept the model's choice only if it names a supported chart and columns
/// that exist in the result.
fn parse_reply(reply: &str, columns: &[String]) -> ChartConfig {
    let parsed: ChartReply = match serde_json::from_str(extract_json(reply)) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("Unparseable chart reply: {}", e);
            return ChartConfig::none();
        }
    };

    if !parsed.should_visualize {
        return ChartConfig::none();
    }

    let chart_type = match parsed.chart_type.as_deref().map(ChartType::from_str) {
        Some(Ok(chart_type)) => chart_type,
        Some(Err(e)) => {
            warn!("{}", e);
            return ChartConfig::none();
        }
        None => return ChartConfig::none(),
    };

    let known = |axis: &Option<String>| axis.as_ref().map_or(true, |a| columns.contains(a));
    if parsed.x_axis.is_none() || !known(&parsed.x_axis) || !known(&parsed.y_axis) {
        warn!("Chart reply names axes outside the result columns");
        return ChartConfig::none();
    }

    ChartConfig {
        should_visualize: true,
        chart_type: Some(chart_type),
        x_axis: parsed.x_axis,
        y_axis: parsed.y_axis,
        explanation: parsed.explanation,
    }
}
