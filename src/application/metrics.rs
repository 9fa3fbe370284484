// Metric extraction - Scalar chart summaries from a canonical payload
use crate::domain::payload::{CanonicalPayload, parse_leading_num};
use crate::domain::telemetry::MetricSummary;

/// Derive the five chart metrics from one canonical payload.
///
/// Pure: no side effects, identical input yields identical output. A
/// metric whose inputs are missing or entirely unparsable comes back as
/// `None`, never zero.
pub fn extract_metrics(payload: &CanonicalPayload) -> MetricSummary {
    let cells = payload.cell_voltages().unwrap_or(&[]);
    let temps = payload.temperatures().unwrap_or(&[]);

    MetricSummary {
        pack: payload
            .dashboard_field("PackVoltage")
            .and_then(parse_leading_num),
        avg_cell: mean(cells.iter().filter_map(parse_leading_num)),
        avg_temp: mean(
            temps
                .iter()
                .filter_map(|t| t.get("value").and_then(parse_leading_num)),
        ),
        soc: payload.dashboard_field("SOC").and_then(parse_leading_num),
        current: payload
            .dashboard_field("CurrentAmps")
            .and_then(parse_leading_num),
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0usize;
    for value in values {
        sum += value;
        count += 1;
    }
    (count > 0).then(|| sum / count as f64)
}
