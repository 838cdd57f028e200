//! Flat per-action rate storage with a running cumulative sum.
//!
//! Object `i` owns the contiguous segment `ends[i-1]..ends[i]` of `rates`, one entry per action
//! in its action set. `cumulative[k]` is the sum of `rates[..=k]`. Structural edits leave the
//! cumulative array stale from the edited object onward; callers restore it with
//! [`RateTable::recompute_suffix_from`] once all edits of a mutation are in place.

use std::ops::Range;

/// An `(object, action)` pair selected for execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub object: usize,
    /// Position in the object's action set.
    pub action: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Selection {
    Event { event: Event, delta_time: f64 },
    /// No transition has a positive rate.
    Exhausted,
}

impl Selection {
    pub fn delta_time(&self) -> f64 {
        match self {
            Selection::Event { delta_time, .. } => *delta_time,
            Selection::Exhausted => f64::INFINITY,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateTable {
    rates: Vec<f64>,
    cumulative: Vec<f64>,
    ends: Vec<usize>,
}

impl RateTable {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn object_count(&self) -> usize {
        self.ends.len()
    }

    /// Total number of action entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    #[inline]
    fn begin(&self, object: usize) -> usize {
        if object == 0 { 0 } else { self.ends[object - 1] }
    }

    pub fn segment(&self, object: usize) -> Range<usize> {
        self.begin(object)..self.ends[object]
    }

    pub fn rates_of(&self, object: usize) -> &[f64] {
        &self.rates[self.segment(object)]
    }

    pub fn rates(&self) -> &[f64] {
        &self.rates
    }

    pub fn cumulative(&self) -> &[f64] {
        &self.cumulative
    }

    pub fn clear(&mut self) {
        self.rates.clear();
        self.cumulative.clear();
        self.ends.clear();
    }

    /// Appends a segment for a new last object.
    pub fn push_segment(&mut self, rates: &[f64]) {
        self.rates.extend_from_slice(rates);
        self.cumulative.resize(self.rates.len(), 0.0);
        self.ends.push(self.rates.len());
    }

    /// Replaces the segment of `object`, shifting every later segment when the length changes.
    pub fn set_rates_for(&mut self, object: usize, rates: &[f64]) {
        let range = self.segment(object);
        let old_len = range.len();
        self.rates.splice(range, rates.iter().copied());
        self.cumulative.resize(self.rates.len(), 0.0);

        if rates.len() != old_len {
            for end in &mut self.ends[object..] {
                *end = *end + rates.len() - old_len;
            }
        }
    }

    /// Drops the segment of `object`; later objects move down by one.
    pub fn remove_segment(&mut self, object: usize) {
        let range = self.segment(object);
        let removed = range.len();
        self.rates.drain(range);
        self.cumulative.truncate(self.rates.len());
        self.ends.remove(object);
        for end in &mut self.ends[object..] {
            *end -= removed;
        }
    }

    /// Rebuilds the cumulative sum from the first entry of `object` onward. Any `object` at or
    /// past the end is a no-op.
    pub fn recompute_suffix_from(&mut self, object: usize) {
        if object >= self.ends.len() {
            return;
        }
        let start = self.begin(object);
        let mut running = if start == 0 { 0.0 } else { self.cumulative[start - 1] };
        for (sum, rate) in self.cumulative[start..].iter_mut().zip(&self.rates[start..]) {
            running += rate;
            *sum = running;
        }
    }

    pub fn recompute_all(&mut self) {
        self.recompute_suffix_from(0);
    }

    #[inline]
    pub fn total_rate(&self) -> f64 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    /// Maps a flat entry to its `(object, action)` pair.
    pub fn locate(&self, flat: usize) -> Event {
        let object = self.ends.partition_point(|&end| end <= flat);
        Event {
            object,
            action: flat - self.begin(object),
        }
    }

    /// The event whose cumulative interval contains `uniform * total_rate`, for `uniform` in
    /// `[0, 1)`. Returns `None` when no entry has a positive rate.
    pub fn sample(&self, uniform: f64) -> Option<Event> {
        let total = self.total_rate();
        if !(total > 0.0) {
            return None;
        }
        let target = uniform * total;
        let mut flat = self.cumulative.partition_point(|&c| c <= target);
        if flat >= self.cumulative.len() {
            // Rounding pushed the target onto the total; take the last entry that can fire.
            flat = self.rates.iter().rposition(|&r| r > 0.0)?;
        }
        Some(self.locate(flat))
    }

    /// Residence-time selection from two uniforms: `u1` in `[0, 1)` picks the event and
    /// `u2` in `(0, 1]` sets the waiting time `-ln(u2) / total_rate`.
    pub fn select(&self, u1: f64, u2: f64) -> Selection {
        match self.sample(u1) {
            Some(event) => Selection::Event {
                event,
                delta_time: -u2.ln() / self.total_rate(),
            },
            None => Selection::Exhausted,
        }
    }

    /// Whether the cumulative sum is non-decreasing and ends at the sum of all rates within
    /// a relative `tolerance`.
    pub fn is_consistent(&self, tolerance: f64) -> bool {
        if self.cumulative.len() != self.rates.len()
            || self.ends.last().copied().unwrap_or(0) != self.rates.len()
        {
            return false;
        }
        if self.cumulative.windows(2).any(|w| w[1] < w[0]) {
            return false;
        }
        let sum: f64 = self.rates.iter().sum();
        (self.total_rate() - sum).abs() <= tolerance * sum.abs().max(f64::MIN_POSITIVE)
    }
}
