use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use chrono::DateTime;
use chrono::SecondsFormat;
use chrono::Utc;
use tracing::warn;

use crate::constants::EMPTY_LABELS;
use crate::constants::METRIC_NAME_LABEL;

/// Label name to label value. One reserved key carries the metric name.
pub type Labels = HashMap<String, String>;

/// One decoded data point. Samples of the same series share their labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub metric: Arc<Labels>,
    pub value: f64,
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: i64,
}

impl Sample {
    pub fn new(
        metric: Arc<Labels>,
        value: f64,
        timestamp_ms: i64,
    ) -> Self {
        Self {
            metric,
            value,
            timestamp_ms,
        }
    }

    pub fn label_set(&self) -> LabelSet {
        LabelSet::from_labels(&self.metric)
    }
}

/// Deduplication key of a series: metric name plus the canonical JSON text of
/// every other label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelSet {
    pub metric_name: String,
    pub labels: String,
}

impl LabelSet {
    /// Canonical form: keys sorted, each pair rendered as `"key": "value"`
    /// with JSON string escaping, pairs joined by `,`, wrapped in braces.
    /// Identical mappings give identical text whatever their insertion order.
    pub fn from_labels(metric: &Labels) -> Self {
        let metric_name = metric.get(METRIC_NAME_LABEL).cloned().unwrap_or_default();

        let mut pairs: Vec<(&String, &String)> = metric
            .iter()
            .filter(|(name, _)| name.as_str() != METRIC_NAME_LABEL)
            .collect();
        pairs.sort_unstable_by(|a, b| a.0.cmp(b.0));

        let mut rendered = Vec::with_capacity(pairs.len());
        for (name, value) in pairs {
            let escaped_name = match serde_json::to_string(name) {
                Ok(v) => v,
                Err(e) => {
                    warn!("Could not format label '{}', skipping: {}", name, e);
                    continue;
                }
            };
            let escaped_value = match serde_json::to_string(value) {
                Ok(v) => v,
                Err(e) => {
                    warn!("Could not format value '{}', skipping: {}", value, e);
                    continue;
                }
            };
            rendered.push(format!("{escaped_name}: {escaped_value}"));
        }

        let labels = if rendered.is_empty() {
            EMPTY_LABELS.to_string()
        } else {
            format!("{{{}}}", rendered.join(","))
        };

        Self { metric_name, labels }
    }
}

/// One row of the staging table
#[derive(Debug, Clone, PartialEq)]
pub struct StagedRow {
    pub time: DateTime<Utc>,
    pub value: f64,
    pub label_set: LabelSet,
}

impl StagedRow {
    /// `None` when the timestamp cannot be represented as a calendar time.
    pub fn from_sample(sample: &Sample) -> Option<Self> {
        let time = DateTime::<Utc>::from_timestamp_millis(sample.timestamp_ms)?;
        Some(Self {
            time,
            value: sample.value,
            label_set: sample.label_set(),
        })
    }

    /// `time<TAB>value<TAB>metric_name<TAB>labels`, as used by the verbose
    /// sample dump.
    pub fn display_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}",
            self.time.to_rfc3339_opts(SecondsFormat::Secs, true),
            format_float(self.value),
            self.label_set.metric_name,
            self.label_set.labels
        )
    }

    /// Appends the row in PostgreSQL `COPY ... FROM STDIN` text format.
    pub fn write_copy_line(
        &self,
        out: &mut String,
    ) {
        let _ = write!(
            out,
            "{}\t{}\t",
            self.time.to_rfc3339_opts(SecondsFormat::Millis, true),
            format_float(self.value)
        );
        escape_copy_text(&self.label_set.metric_name, out);
        out.push('\t');
        escape_copy_text(&self.label_set.labels, out);
        out.push('\n');
    }
}

/// Float text accepted by PostgreSQL's `double precision` input
pub(crate) fn format_float(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "Infinity".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else {
        value.to_string()
    }
}

/// Escapes the characters that are special in COPY text format.
pub(crate) fn escape_copy_text(
    value: &str,
    out: &mut String,
) {
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
}
