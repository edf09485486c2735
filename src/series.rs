/// Rolling per-signal series for live charts
use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock};

use crate::models::{SeriesPoint, Signal, TimedSample};
use crate::utils::now_seconds;

pub const DEFAULT_HISTORY_CAPACITY: usize = 50;
/// Points visible at once on a sliding chart
pub const DEFAULT_PLOT_WINDOW: u64 = 30;

/// Both series kept for one signal
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalSeries {
    /// Most recent samples by wall-clock time, oldest first
    pub history: VecDeque<TimedSample>,
    /// Every sample since the last reset, keyed by a synthetic index
    pub plot: Vec<SeriesPoint>,
}

impl SignalSeries {
    fn next_index(&self) -> u64 {
        self.plot.last().map(|p| p.index + 1).unwrap_or(0)
    }

    fn push_history(&mut self, sample: TimedSample, capacity: usize) {
        while self.history.len() >= capacity {
            self.history.pop_front();
        }
        self.history.push_back(sample);
    }

    fn push_plot(&mut self, value: f64) -> u64 {
        let index = self.next_index();
        self.plot.push(SeriesPoint { index, value });
        index
    }

    /// X-axis range for a chart showing `width` points
    pub fn plot_window(&self, width: u64) -> (u64, u64) {
        let last = self.plot.last().map(|p| p.index).unwrap_or(0);
        if last > width {
            (last - width, last)
        } else {
            (0, width)
        }
    }
}

/// Thread-safe store of all signal series
///
/// Writers hold the lock for a single append, so a snapshot never sees a
/// half-updated series. Different signals may be updated at slightly
/// different times for the same record.
#[derive(Debug)]
pub struct RollingSeriesStore {
    capacity: usize,
    series: RwLock<HashMap<Signal, SignalSeries>>,
}

impl Default for RollingSeriesStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl RollingSeriesStore {
    /// `capacity` is the steady-state length of each timestamped history
    pub fn new(capacity: usize) -> Self {
        let series = Signal::ALL
            .iter()
            .map(|signal| (*signal, SignalSeries::default()))
            .collect();
        RollingSeriesStore {
            capacity: capacity.max(1),
            series: RwLock::new(series),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn append_timestamped(&self, signal: Signal, value: f64) {
        self.append_timestamped_at(signal, value, now_seconds());
    }

    /// Append to the history, evicting the oldest samples so it never holds
    /// more than `capacity` entries
    pub fn append_timestamped_at(&self, signal: Signal, value: f64, seconds: f64) {
        let mut guard = self.series.write().unwrap_or_else(PoisonError::into_inner);
        guard
            .entry(signal)
            .or_default()
            .push_history(TimedSample { seconds, value }, self.capacity);
    }

    /// Append to the plotting series and return the index assigned
    pub fn append_indexed(&self, signal: Signal, value: f64) -> u64 {
        let mut guard = self.series.write().unwrap_or_else(PoisonError::into_inner);
        guard.entry(signal).or_default().push_plot(value)
    }

    /// Record one value in both series of a signal
    pub fn record(&self, signal: Signal, value: f64) {
        let seconds = now_seconds();
        let mut guard = self.series.write().unwrap_or_else(PoisonError::into_inner);
        let series = guard.entry(signal).or_default();
        series.push_history(TimedSample { seconds, value }, self.capacity);
        series.push_plot(value);
    }

    /// Clear every series of every signal
    pub fn reset(&self) {
        let mut guard = self.series.write().unwrap_or_else(PoisonError::into_inner);
        for series in guard.values_mut() {
            series.history.clear();
            series.plot.clear();
        }
    }

    /// Clear only the plotting series; histories are kept
    pub fn reset_plots(&self) {
        let mut guard = self.series.write().unwrap_or_else(PoisonError::into_inner);
        for series in guard.values_mut() {
            series.plot.clear();
        }
    }

    pub fn snapshot(&self, signal: Signal) -> SignalSeries {
        let guard = self.series.read().unwrap_or_else(PoisonError::into_inner);
        guard.get(&signal).cloned().unwrap_or_default()
    }

    pub fn snapshot_all(&self) -> HashMap<Signal, SignalSeries> {
        self.series
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn plot_window(&self, signal: Signal, width: u64) -> (u64, u64) {
        let guard = self.series.read().unwrap_or_else(PoisonError::into_inner);
        guard
            .get(&signal)
            .map(|s| s.plot_window(width))
            .unwrap_or((0, width))
    }

    pub fn is_empty(&self) -> bool {
        let guard = self.series.read().unwrap_or_else(PoisonError::into_inner);
        guard
            .values()
            .all(|s| s.history.is_empty() && s.plot.is_empty())
    }
}
