//! Display window over the most recent samples.

use crate::measurement::Series;

/// Default number of samples shown.
pub const DEFAULT_RECORD_LENGTH: usize = 250;

/// Fixed-length tail view of a [`Series`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSeriesWindow {
    length: usize,
}

impl Default for TimeSeriesWindow {
    fn default() -> Self {
        Self::new(DEFAULT_RECORD_LENGTH)
    }
}

impl TimeSeriesWindow {
    /// Window over the last `length` samples (at least one).
    pub fn new(length: usize) -> Self {
        Self {
            length: length.max(1),
        }
    }

    /// Window length.
    pub fn length(&self) -> usize {
        self.length
    }

    /// The last `length` samples, or all of them if the series is shorter.
    pub fn view<'a>(&self, series: &'a Series) -> WindowView<'a> {
        let (t, f) = series.tail(self.length);
        WindowView { t, f }
    }
}

/// Borrowed `(t, f)` columns of a window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowView<'a> {
    /// Timestamps in seconds.
    pub t: &'a [f64],
    /// Frequencies in Hz.
    pub f: &'a [f64],
}

impl WindowView<'_> {
    /// Samples in view.
    pub fn len(&self) -> usize {
        self.t.len()
    }

    /// True when the series is empty.
    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    /// Newest sample.
    pub fn latest(&self) -> Option<(f64, f64)> {
        Some((*self.t.last()?, *self.f.last()?))
    }

    /// Mean frequency over the view.
    pub fn mean(&self) -> Option<f64> {
        if self.f.is_empty() {
            return None;
        }
        Some(self.f.iter().sum::<f64>() / self.f.len() as f64)
    }
}
