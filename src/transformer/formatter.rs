//! Prometheus Exposition Format output
//!
//! This module renders the metric families of one scrape cycle into the
//! text exposition format (version 0.0.4).
//!
//! # Format Specification
//!
//! ```text
//! # HELP <metric_name> <help_text>
//! # TYPE <metric_name> <type>
//! <metric_name>{<label1>="<value1>",<label2>="<value2>"} <value>
//! ```

use super::aggregate::{MetricFamily, MetricSample};

/// Prometheus exposition format formatter
///
/// # Example
///
/// ```ignore
/// use rsolr_exporter::transformer::{MetricTable, PrometheusFormatter};
///
/// let families = MetricTable::new().finish(elapsed);
/// let output = PrometheusFormatter::new().format(&families);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusFormatter;

impl PrometheusFormatter {
    /// Create a new formatter
    pub fn new() -> Self {
        Self
    }

    /// Format families into Prometheus exposition format
    ///
    /// - HELP (when not empty) and TYPE lines are emitted once per family
    /// - Families keep their order; samples keep insertion order
    /// - Labels follow the family schema order
    pub fn format(&self, families: &[MetricFamily]) -> String {
        let capacity = families.iter().map(|f| 64 + f.len() * 96).sum();
        let mut output = String::with_capacity(capacity);

        for family in families {
            if family.is_empty() {
                continue;
            }

            if !family.help.is_empty() {
                output.push_str(&format!(
                    "# HELP {} {}\n",
                    family.name,
                    Self::escape_help(&family.help)
                ));
            }
            output.push_str(&format!(
                "# TYPE {} {}\n",
                family.name,
                family.metric_type.as_str()
            ));

            for sample in family.samples() {
                Self::write_sample(&mut output, sample);
            }
        }

        output
    }

    fn write_sample(output: &mut String, sample: &MetricSample) {
        output.push_str(&sample.name);

        if !sample.label_names.is_empty() {
            output.push('{');
            for (i, (name, value)) in sample.labels().enumerate() {
                if i > 0 {
                    output.push(',');
                }
                output.push_str(&format!("{}=\"{}\"", name, Self::escape_label_value(value)));
            }
            output.push('}');
        }

        output.push(' ');
        output.push_str(&Self::format_value(sample.value));
        output.push('\n');
    }

    /// Format a numeric value for Prometheus
    ///
    /// - NaN → "NaN"
    /// - +Inf → "+Inf"
    /// - -Inf → "-Inf"
    /// - Integers are formatted without decimal point
    /// - Large/small floats use scientific notation
    fn format_value(value: f64) -> String {
        if value.is_nan() {
            "NaN".to_string()
        } else if value.is_infinite() {
            if value.is_sign_positive() {
                "+Inf".to_string()
            } else {
                "-Inf".to_string()
            }
        } else if value.fract() == 0.0 && value.abs() < 1e15 {
            format!("{}", value as i64)
        } else if value.abs() >= 1e6 || (value.abs() < 1e-3 && value != 0.0) {
            format!("{:e}", value)
        } else {
            format!("{}", value)
        }
    }

    /// Escape help text
    ///
    /// Escapes backslash and newline characters.
    fn escape_help(help: &str) -> String {
        help.replace('\\', "\\\\").replace('\n', "\\n")
    }

    /// Escape label value
    ///
    /// Escapes backslash, double-quote, and newline characters.
    fn escape_label_value(value: &str) -> String {
        let mut escaped = String::with_capacity(value.len());
        for c in value.chars() {
            match c {
                '\\' => escaped.push_str("\\\\"),
                '"' => escaped.push_str("\\\""),
                '\n' => escaped.push_str("\\n"),
                _ => escaped.push(c),
            }
        }
        escaped
    }
}
