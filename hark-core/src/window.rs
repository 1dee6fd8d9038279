//! # Sliding Window Module
//!
//! Owns the analysis window on the capture thread. Incoming batches are
//! scaled by the input gain and appended; each time the window fills it is
//! handed to a [`WindowSink`] and then shifted left by one hop.
//!
//! Everything here runs inside the real-time capture callback: the backing
//! storage is allocated once in [`WindowBuffer::new`] and `push` neither
//! allocates nor blocks.

/// What the capture source should do after a batch has been consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureFlow {
    /// Keep delivering batches.
    Continue,
    /// Downstream has shut down; stop once buffered input is delivered.
    DrainAndStop,
    /// The write position ran past the window. `push` never lets that
    /// happen, so this guards the position invariant rather than detecting
    /// real input overruns; stop immediately.
    Abort,
}

/// Result of handing a completed window downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkStatus {
    /// The window was accepted (or dropped under the latest-wins policy).
    Open,
    /// Nobody will consume windows any more.
    Closed,
}

/// Receives completed windows from a [`WindowBuffer`].
///
/// Implementations are called on the capture thread and must return in
/// bounded time without allocating.
pub trait WindowSink {
    fn publish(&mut self, window: &[f32]) -> SinkStatus;
}

impl<F> WindowSink for F
where
    F: FnMut(&[f32]) -> SinkStatus,
{
    fn publish(&mut self, window: &[f32]) -> SinkStatus {
        self(window)
    }
}

/// Fixed-size sliding window advancing by `hop` samples.
#[derive(Debug)]
pub struct WindowBuffer {
    samples: Vec<f32>,
    hop: usize,
    pos: usize,
}

impl WindowBuffer {
    /// Allocates a zero-filled window of `size` samples that advances by
    /// `hop`. Sizes are expected to be validated by the pipeline config;
    /// `hop` is clamped into `1..=size` so the shift always makes progress.
    pub fn new(size: usize, hop: usize) -> Self {
        let size = size.max(1);
        Self {
            samples: vec![0.0; size],
            hop: hop.clamp(1, size),
            pos: 0,
        }
    }

    /// Starts filling at `fill` instead of zero, treating the zeroed prefix as
    /// already captured. A window is then emitted after `size - fill`
    /// samples rather than after a full window's worth.
    pub fn prime(&mut self, fill: usize) {
        self.pos = fill.min(self.samples.len());
    }

    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    pub fn hop(&self) -> usize {
        self.hop
    }

    /// Current fill position. Always within `0..=capacity`.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Current window contents, including the not yet refilled tail.
    pub fn contents(&self) -> &[f32] {
        &self.samples
    }

    /// Appends a batch of samples scaled by `gain`.
    ///
    /// Every time the window fills it is published to `sink` and shifted by
    /// one hop, so a single batch may complete several windows.
    ///
    /// # Returns
    /// * `CaptureFlow::Continue` - batch consumed, keep going
    /// * `CaptureFlow::DrainAndStop` - the sink reported it is closed
    /// * `CaptureFlow::Abort` - fill position was found past the window end
    pub fn push<S>(&mut self, batch: &[f32], gain: f32, sink: &mut S) -> CaptureFlow
    where
        S: WindowSink + ?Sized,
    {
        let len = self.samples.len();
        let mut remaining = batch;

        loop {
            if self.pos > len {
                return CaptureFlow::Abort;
            }

            let take = remaining.len().min(len - self.pos);
            let (head, tail) = remaining.split_at(take);
            for (dst, &src) in self.samples[self.pos..self.pos + take].iter_mut().zip(head) {
                *dst = src * gain;
            }
            self.pos += take;
            remaining = tail;

            if self.pos == len {
                let status = sink.publish(&self.samples);
                self.samples.copy_within(self.hop.., 0);
                self.pos = len - self.hop;
                if status == SinkStatus::Closed {
                    return CaptureFlow::DrainAndStop;
                }
            }

            if remaining.is_empty() {
                return CaptureFlow::Continue;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Collects every emitted window.
    #[derive(Default)]
    struct Collect(Vec<Vec<f32>>);

    impl WindowSink for Collect {
        fn publish(&mut self, window: &[f32]) -> SinkStatus {
            self.0.push(window.to_vec());
            SinkStatus::Open
        }
    }

    fn ramp(start: usize, count: usize) -> Vec<f32> {
        (start..start + count).map(|i| i as f32 + 1.0).collect()
    }

    /// Feeds `total` ramp samples in batches of `batch` and checks that every
    /// window holds exactly the expected contiguous run of samples.
    fn check_windows(size: usize, hop: usize, batch: usize, total: usize) {
        let mut buffer = WindowBuffer::new(size, hop);
        let mut sink = Collect::default();
        let mut fed = 0;
        while fed < total {
            let n = batch.min(total - fed);
            let flow = buffer.push(&ramp(fed, n), 1.0, &mut sink);
            assert_eq!(flow, CaptureFlow::Continue);
            assert!(buffer.position() <= size);
            fed += n;
        }

        let expected_windows = if total < size { 0 } else { 1 + (total - size) / hop };
        assert_eq!(sink.0.len(), expected_windows, "batch size {batch}");

        for (i, window) in sink.0.iter().enumerate() {
            let expected = ramp(i * hop, size);
            assert_eq!(window, &expected, "window {i} with batch size {batch}");
        }
    }

    #[test]
    fn batches_smaller_than_hop() {
        check_windows(16, 4, 3, 100);
        check_windows(16, 4, 1, 37);
    }

    #[test]
    fn batches_equal_to_hop() {
        check_windows(16, 4, 4, 64);
    }

    #[test]
    fn batches_larger_than_window() {
        check_windows(16, 4, 40, 160);
        check_windows(16, 4, 53, 200);
    }

    #[test]
    fn hop_equal_to_window_gives_disjoint_windows() {
        check_windows(8, 8, 5, 40);
    }

    #[test]
    fn shift_leaves_overlap_as_prefix() {
        let mut buffer = WindowBuffer::new(8, 2);
        let mut sink = Collect::default();
        buffer.push(&ramp(0, 8), 1.0, &mut sink);

        assert_eq!(sink.0.len(), 1);
        assert_eq!(buffer.position(), 6);
        assert_eq!(&buffer.contents()[..6], &ramp(2, 6)[..]);
    }

    #[test]
    fn gain_scales_samples() {
        let mut buffer = WindowBuffer::new(4, 4);
        let mut sink = Collect::default();
        buffer.push(&[1.0, -2.0, 0.5, 0.0], 2.0, &mut sink);
        assert_eq!(sink.0, vec![vec![2.0, -4.0, 1.0, 0.0]]);
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let mut buffer = WindowBuffer::new(4, 2);
        let mut sink = Collect::default();
        assert_eq!(buffer.push(&[], 1.0, &mut sink), CaptureFlow::Continue);
        assert_eq!(buffer.position(), 0);
        assert!(sink.0.is_empty());
    }

    #[test]
    fn primed_window_emits_after_one_hop() {
        let mut buffer = WindowBuffer::new(8, 2);
        buffer.prime(6);
        let mut sink = Collect::default();
        buffer.push(&[1.0, 2.0], 1.0, &mut sink);
        assert_eq!(sink.0, vec![vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 2.0]]);
    }

    #[test]
    fn closed_sink_requests_drain() {
        let mut buffer = WindowBuffer::new(4, 2);
        let mut closed = |_: &[f32]| SinkStatus::Closed;
        let flow = buffer.push(&ramp(0, 10), 1.0, &mut closed);
        assert_eq!(flow, CaptureFlow::DrainAndStop);
        assert_eq!(buffer.position(), 2);
    }

    #[test]
    fn ordinary_batches_never_abort() {
        let mut buffer = WindowBuffer::new(8, 3);
        let mut sink = Collect::default();
        for batch in [1, 2, 5, 7, 8, 9, 16, 23] {
            let flow = buffer.push(&ramp(0, batch), 1.0, &mut sink);
            assert_eq!(flow, CaptureFlow::Continue, "batch of {batch}");
            assert!(buffer.position() < buffer.capacity());
        }
    }

    #[test]
    fn corrupted_position_aborts() {
        let mut buffer = WindowBuffer::new(4, 2);
        buffer.pos = 5;
        let mut sink = Collect::default();
        assert_eq!(buffer.push(&[1.0], 1.0, &mut sink), CaptureFlow::Abort);
        assert!(sink.0.is_empty());
    }
}
