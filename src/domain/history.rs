// Rolling history domain model
use std::collections::VecDeque;

use serde::Serialize;

use super::telemetry::HistorySample;

/// Number of samples retained for charting.
pub const MAX_HISTORY: usize = 90;

/// Fixed-capacity, FIFO-evicting accumulator of metric samples.
///
/// Six parallel sequences (timestamps plus five value series) that grow
/// and shrink together: every append extends all six, and eviction drops
/// the oldest element from all six, so their lengths are equal at every
/// observable instant. Samples stay in arrival order; the buffer never
/// re-sorts by timestamp, so out-of-order delivery shows up as
/// non-monotonic time values in the view.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    capacity: usize,
    times: VecDeque<i64>,
    pack: VecDeque<Option<f64>>,
    avg_cell: VecDeque<Option<f64>>,
    avg_temp: VecDeque<Option<f64>>,
    soc: VecDeque<Option<f64>>,
    current: VecDeque<Option<f64>>,
}

impl HistoryBuffer {
    pub fn new() -> Self {
        Self::with_capacity(MAX_HISTORY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            times: VecDeque::with_capacity(capacity),
            pack: VecDeque::with_capacity(capacity),
            avg_cell: VecDeque::with_capacity(capacity),
            avg_temp: VecDeque::with_capacity(capacity),
            soc: VecDeque::with_capacity(capacity),
            current: VecDeque::with_capacity(capacity),
        }
    }

    pub fn append(&mut self, sample: HistorySample) {
        self.times.push_back(sample.time);
        self.pack.push_back(sample.pack);
        self.avg_cell.push_back(sample.avg_cell);
        self.avg_temp.push_back(sample.avg_temp);
        self.soc.push_back(sample.soc);
        self.current.push_back(sample.current);

        while self.times.len() > self.capacity {
            self.times.pop_front();
            self.pack.pop_front();
            self.avg_cell.pop_front();
            self.avg_temp.pop_front();
            self.soc.pop_front();
            self.current.pop_front();
        }
    }

    /// Owned snapshot of all six sequences for charting.
    pub fn view(&self) -> HistoryView {
        HistoryView {
            timestamps: self.times.iter().copied().collect(),
            pack: self.pack.iter().copied().collect(),
            avg_cell: self.avg_cell.iter().copied().collect(),
            avg_temp: self.avg_temp.iter().copied().collect(),
            soc: self.soc.iter().copied().collect(),
            current: self.current.iter().copied().collect(),
        }
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only view of the buffer in wire shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryView {
    pub timestamps: Vec<i64>,
    pub pack: Vec<Option<f64>>,
    pub avg_cell: Vec<Option<f64>>,
    pub avg_temp: Vec<Option<f64>>,
    pub soc: Vec<Option<f64>>,
    pub current: Vec<Option<f64>>,
}
