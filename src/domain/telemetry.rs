// Telemetry sample domain models
use serde::Serialize;

/// Scalar summaries derived from one canonical payload.
///
/// A `None` component means the payload did not carry enough data to
/// compute it that cycle; it is recorded as a gap, never as zero.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MetricSummary {
    pub pack: Option<f64>,
    pub avg_cell: Option<f64>,
    pub avg_temp: Option<f64>,
    pub soc: Option<f64>,
    pub current: Option<f64>,
}

/// One charted point: the metric summary paired with its canonical
/// timestamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistorySample {
    pub time: i64,
    pub pack: Option<f64>,
    pub avg_cell: Option<f64>,
    pub avg_temp: Option<f64>,
    pub soc: Option<f64>,
    pub current: Option<f64>,
}

impl HistorySample {
    pub fn new(time: i64, metrics: MetricSummary) -> Self {
        Self {
            time,
            pack: metrics.pack,
            avg_cell: metrics.avg_cell,
            avg_temp: metrics.avg_temp,
            soc: metrics.soc,
            current: metrics.current,
        }
    }
}

/// One reconstructed temperature channel reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TemperatureReading {
    pub time: i64,
    pub value: f64,
}

impl TemperatureReading {
    pub fn new(time: i64, value: f64) -> Self {
        Self { time, value }
    }
}
