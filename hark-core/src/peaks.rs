//! # Peak Picking Module
//!
//! Selects spectral peaks from a magnitude spectrum: either the single
//! loudest bin, or up to K local maxima above a threshold.
//!
//! The top-K search keeps candidates in a bounded min-heap. When a new
//! candidate pushes the heap past capacity the smallest entry is evicted, so
//! memory and time stay bounded however many bins cross the threshold. This
//! is a deliberate approximation of an exhaustive search: at most K peaks
//! survive, and everything else is forgotten as soon as it is displaced.

use serde::{Deserialize, Serialize};

use crate::fft::Spectrum;

/// A spectral peak: bin index and squared magnitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub bin: usize,
    pub magnitude: f64,
}

/// Peaks drained from a [`BoundedTopKHeap`], smallest magnitude first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeakSet {
    peaks: Vec<Peak>,
}

impl PeakSet {
    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    /// Peaks in ascending magnitude order.
    pub fn ascending(&self) -> &[Peak] {
        &self.peaks
    }

    /// Peaks in descending magnitude order, loudest first.
    pub fn into_descending(mut self) -> Vec<Peak> {
        self.peaks.reverse();
        self.peaks
    }
}

/// Binary min-heap on magnitude with a fixed capacity.
///
/// Stored 1-indexed: slot 0 is unused, the root lives at 1, and the children
/// of `n` are `2n` and `2n + 1`.
#[derive(Debug, Clone)]
pub struct BoundedTopKHeap {
    items: Vec<Peak>,
    capacity: usize,
}

const UNUSED: Peak = Peak {
    bin: 0,
    magnitude: 0.0,
};

impl BoundedTopKHeap {
    /// Creates an empty heap that retains at most `capacity` peaks.
    pub fn new(capacity: usize) -> Self {
        // Root placeholder plus one slot of headroom for insert-then-evict.
        let mut items = Vec::with_capacity(capacity + 2);
        items.push(UNUSED);
        Self { items, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Smallest retained peak.
    pub fn peek_min(&self) -> Option<&Peak> {
        self.items.get(1)
    }

    /// Inserts `peak`, then evicts the minimum if the heap grew past its
    /// capacity. A smaller newcomer is therefore evicted straight away, while
    /// a larger one displaces the previous minimum.
    pub fn insert(&mut self, peak: Peak) {
        self.items.push(peak);
        let last = self.items.len() - 1;
        self.up_heap(last);

        if self.len() > self.capacity {
            self.remove_min();
        }
    }

    /// Removes and returns the smallest peak.
    pub fn remove_min(&mut self) -> Option<Peak> {
        if self.is_empty() {
            return None;
        }
        let min = self.items.swap_remove(1);
        if !self.is_empty() {
            self.down_heap(1);
        }
        Some(min)
    }

    /// Drains every retained peak in ascending magnitude order.
    pub fn drain(mut self) -> PeakSet {
        let mut peaks = Vec::with_capacity(self.len());
        while let Some(peak) = self.remove_min() {
            peaks.push(peak);
        }
        PeakSet { peaks }
    }

    fn up_heap(&mut self, mut n: usize) {
        while n > 1 {
            let parent = n / 2;
            if self.items[n].magnitude < self.items[parent].magnitude {
                self.items.swap(n, parent);
                n = parent;
            } else {
                break;
            }
        }
    }

    fn down_heap(&mut self, mut n: usize) {
        let end = self.items.len();
        loop {
            let left = 2 * n;
            let right = left + 1;
            let mut smallest = n;
            if left < end && self.items[left].magnitude < self.items[smallest].magnitude {
                smallest = left;
            }
            if right < end && self.items[right].magnitude < self.items[smallest].magnitude {
                smallest = right;
            }
            if smallest == n {
                break;
            }
            self.items.swap(n, smallest);
            n = smallest;
        }
    }
}

/// Finds the loudest bin in `1..=N/2`.
///
/// `magnitudes` holds every bin of the spectrum, DC at index 0, which is
/// skipped. Ties go to the lowest bin. Returns `None` when no bin is above
/// zero, i.e. the spectrum is degenerate.
pub fn global_peak(magnitudes: &[f64]) -> Option<Peak> {
    let mut best: Option<Peak> = None;
    for (bin, &magnitude) in magnitudes.iter().enumerate().skip(1) {
        let high = best.map_or(0.0, |p| p.magnitude);
        if magnitude > high {
            best = Some(Peak { bin, magnitude });
        }
    }
    best
}

/// Collects up to `k` local maxima louder than `threshold`.
///
/// A bin in `1..=N/2` is a candidate when it exceeds the threshold and both
/// neighbors. A missing neighbor counts as zero; bin 1 does not look at the
/// DC bin.
pub fn local_maxima(magnitudes: &[f64], threshold: f64, k: usize) -> PeakSet {
    let mut heap = BoundedTopKHeap::new(k);
    if k == 0 {
        return heap.drain();
    }

    let last = magnitudes.len().saturating_sub(1);
    for bin in 1..=last {
        let magnitude = magnitudes[bin];
        let left = if bin > 1 { magnitudes[bin - 1] } else { 0.0 };
        let right = if bin < last { magnitudes[bin + 1] } else { 0.0 };
        if magnitude > threshold && magnitude > left && magnitude > right {
            heap.insert(Peak { bin, magnitude });
        }
    }
    heap.drain()
}

/// Peak selection strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PeakPicker {
    /// The loudest bin only.
    #[default]
    Single,
    /// Up to `k` local maxima above `threshold`.
    TopK { threshold: f64, k: usize },
}

impl PeakPicker {
    /// Selects peaks from `spectrum`, loudest first. Empty means no peak.
    pub fn select(&self, spectrum: &Spectrum) -> Vec<Peak> {
        let magnitudes = spectrum.magnitudes();
        match *self {
            PeakPicker::Single => global_peak(&magnitudes).into_iter().collect(),
            PeakPicker::TopK { threshold, k } => {
                local_maxima(&magnitudes, threshold, k).into_descending()
            }
        }
    }
}
