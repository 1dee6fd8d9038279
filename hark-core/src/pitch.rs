//! # Pitch Mapping Module
//!
//! Quantizes a detected frequency to the nearest equal temperament semitone
//! and labels it with a note name, octave and deviation.
//!
//! ## Features
//! - Three-candidate nearest-semitone search with a fixed tie-break order
//! - Note name and octave labeling from the shared harmonic table
//! - Deviation in Hz and cents against the chosen table entry
//! - Optional low-frequency floor applied before mapping

use serde::Serialize;
use std::sync::Arc;

use crate::error::PitchError;
use crate::harmonics::{
    self, HarmonicTable, MAX_HARMONIC, MIN_HARMONIC, REFERENCE_FREQUENCY, REFERENCE_HARMONIC,
};

/// The semitone a frequency was quantized to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HarmonicResult {
    /// Harmonic index (semitones from C4).
    pub harmonic: i32,
    /// Table frequency of `harmonic` in Hz.
    pub reference_hz: f64,
}

/// Note information attached to a reported peak.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoteReading {
    pub harmonic_index: i32,
    pub note_name: &'static str,
    pub octave: i32,
    /// Table frequency the measurement was compared against.
    pub reference_hz: f64,
    /// Measured minus reference, in Hz. Positive means sharp.
    pub deviation_hz: f64,
    /// Deviation in cents. Positive means sharp.
    pub cents: f64,
}

/// Maps frequencies onto the harmonic table.
#[derive(Debug, Clone)]
pub struct PitchMapper {
    table: Arc<HarmonicTable>,
    frequency_floor: f64,
}

impl PitchMapper {
    /// Creates a mapper over a shared table with no frequency floor.
    pub fn new(table: Arc<HarmonicTable>) -> Self {
        Self {
            table,
            frequency_floor: 0.0,
        }
    }

    /// Clamps positive frequencies below `floor` up to `floor` before mapping.
    /// A floor of zero disables clamping.
    pub fn with_frequency_floor(mut self, floor: f64) -> Self {
        self.frequency_floor = floor.max(0.0);
        self
    }

    pub fn table(&self) -> &HarmonicTable {
        &self.table
    }

    /// Finds the harmonic index closest to `freq`.
    ///
    /// The continuous offset `12 * log2(f / 440) + 9` is rounded to `x`, then
    /// the table entries at `x - 1`, `x` and `x + 1` are compared against
    /// `freq`. The first candidate, in that order, whose difference is
    /// strictly smaller than both others wins. Without a strict winner the
    /// result is `x`. Indices missing from the table never win, so a
    /// frequency rounding one step past either edge lands on the edge note.
    ///
    /// # Returns
    /// * `Ok(result)` - chosen harmonic and its table frequency
    /// * `Err(PitchError::OutOfRangeHarmonic)` - `freq` is not a positive
    ///   finite number, or no table entry is within one step of it
    pub fn frequency_to_harmonic(&self, freq: f64) -> Result<HarmonicResult, PitchError> {
        if !freq.is_finite() || freq <= 0.0 {
            return Err(PitchError::OutOfRangeHarmonic(freq));
        }

        let continuous = 12.0 * (freq / REFERENCE_FREQUENCY).log2() + REFERENCE_HARMONIC as f64;
        let x = continuous.round();
        // Past one step beyond either edge no neighbour is in the table.
        if !x.is_finite() || x < (MIN_HARMONIC - 1) as f64 || x > (MAX_HARMONIC + 1) as f64 {
            return Err(PitchError::OutOfRangeHarmonic(freq));
        }
        let x = x as i32;

        let candidates = [x - 1, x, x + 1];
        let diffs = candidates.map(|h| {
            self.table
                .frequency_of(h)
                .map_or(f64::INFINITY, |table_freq| (table_freq - freq).abs())
        });

        for (i, &h) in candidates.iter().enumerate() {
            let strict = diffs
                .iter()
                .enumerate()
                .all(|(j, &other)| i == j || diffs[i] < other);
            if strict {
                return Ok(self.result_for(h));
            }
        }

        if !harmonics::contains(x) {
            return Err(PitchError::OutOfRangeHarmonic(freq));
        }
        Ok(self.result_for(x))
    }

    /// Maps a frequency to a full note reading, or `None` when no confident
    /// pitch can be named.
    pub fn map(&self, freq: f64) -> Option<NoteReading> {
        let freq = self.apply_floor(freq);
        let result = self.frequency_to_harmonic(freq).ok()?;
        let (note_name, octave) = harmonics::harmonic_to_note(result.harmonic)?;

        Some(NoteReading {
            harmonic_index: result.harmonic,
            note_name,
            octave,
            reference_hz: result.reference_hz,
            deviation_hz: freq - result.reference_hz,
            cents: calculate_cents_deviation(freq, result.reference_hz),
        })
    }

    fn apply_floor(&self, freq: f64) -> f64 {
        if freq > 0.0 && freq < self.frequency_floor {
            self.frequency_floor
        } else {
            freq
        }
    }

    fn result_for(&self, h: i32) -> HarmonicResult {
        // Only a finite difference can win, and the fallback `x` is checked
        // with `contains`, so `h` is always in the table here.
        let reference_hz = self.table.frequency_of(h).unwrap_or(0.0);
        HarmonicResult {
            harmonic: h,
            reference_hz,
        }
    }
}

/// Calculates the deviation from a target frequency in cents.
///
/// 100 cents make a semitone. Positive values are sharp, negative flat.
pub fn calculate_cents_deviation(freq: f64, target_freq: f64) -> f64 {
    1200.0 * (freq / target_freq).log2()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper() -> PitchMapper {
        PitchMapper::new(Arc::new(HarmonicTable::new()))
    }

    #[test]
    fn table_points_round_trip() {
        let mapper = mapper();
        for h in MIN_HARMONIC..=MAX_HARMONIC {
            let freq = mapper.table().frequency_of(h).unwrap();
            let result = mapper.frequency_to_harmonic(freq).unwrap();
            assert_eq!(result.harmonic, h, "round trip failed at {freq} Hz");
        }
    }

    #[test]
    fn mapping_is_monotonic_over_the_range() {
        let mapper = mapper();
        let low = mapper.table().frequency_of(MIN_HARMONIC).unwrap();
        let high = mapper.table().frequency_of(MAX_HARMONIC).unwrap();

        let mut previous = MIN_HARMONIC;
        let mut freq = low;
        while freq <= high {
            let h = mapper.frequency_to_harmonic(freq).unwrap().harmonic;
            assert!(h >= previous, "{freq} Hz mapped to {h} after {previous}");
            previous = h;
            freq *= 1.0007;
        }
    }

    #[test]
    fn concert_a_and_middle_c() {
        let mapper = mapper();

        let a4 = mapper.map(440.0).unwrap();
        assert_eq!(a4.harmonic_index, 9);
        assert_eq!(a4.note_name, "A");
        assert_eq!(a4.octave, 4);
        assert!(a4.deviation_hz.abs() < 1e-9);

        let c4 = mapper.map(261.63).unwrap();
        assert_eq!(c4.harmonic_index, 0);
        assert_eq!(c4.note_name, "C");
        assert_eq!(c4.octave, 4);
        assert!(c4.cents.abs() < 1.0);
    }

    #[test]
    fn slightly_sharp_note_keeps_its_name() {
        let reading = mapper().map(445.0).unwrap();
        assert_eq!(reading.harmonic_index, 9);
        assert!(reading.deviation_hz > 4.9 && reading.deviation_hz < 5.1);
        assert!(reading.cents > 19.0 && reading.cents < 20.0);
    }

    #[test]
    fn non_positive_and_non_finite_frequencies_are_out_of_range() {
        let mapper = mapper();
        for freq in [0.0, -1.0, -440.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                mapper.frequency_to_harmonic(freq),
                Err(PitchError::OutOfRangeHarmonic(_))
            ));
            assert!(mapper.map(freq).is_none());
        }
    }

    #[test]
    fn frequencies_beyond_the_table_are_out_of_range() {
        let mapper = mapper();
        assert!(mapper.frequency_to_harmonic(5.0).is_err());
        assert!(mapper.frequency_to_harmonic(100_000.0).is_err());
    }

    #[test]
    fn table_edges_never_pick_missing_neighbors() {
        let mapper = mapper();
        let bottom = mapper.table().frequency_of(MIN_HARMONIC).unwrap();
        let top = mapper.table().frequency_of(MAX_HARMONIC).unwrap();
        assert_eq!(
            mapper.frequency_to_harmonic(bottom * 0.99).unwrap().harmonic,
            MIN_HARMONIC
        );
        assert_eq!(
            mapper.frequency_to_harmonic(top * 1.01).unwrap().harmonic,
            MAX_HARMONIC
        );
    }

    #[test]
    fn one_step_past_the_edges_lands_on_the_edge_note() {
        let mapper = mapper();
        // 15.6 Hz and 15.5 Hz round to -49, just below C0.
        for freq in [15.6, 15.5] {
            let result = mapper.frequency_to_harmonic(freq).unwrap();
            assert_eq!(result.harmonic, MIN_HARMONIC, "{freq} Hz");
        }
        // 33 kHz rounds to 84, just above B10.
        let result = mapper.frequency_to_harmonic(33_000.0).unwrap();
        assert_eq!(result.harmonic, MAX_HARMONIC);
        assert_eq!(result.reference_hz, mapper.table().frequency_of(MAX_HARMONIC).unwrap());

        for freq in [5.0, 40_000.0] {
            assert!(matches!(
                mapper.frequency_to_harmonic(freq),
                Err(PitchError::OutOfRangeHarmonic(_))
            ));
        }
    }

    #[test]
    fn floor_clamps_low_frequencies_into_the_table() {
        let mapper = mapper().with_frequency_floor(16.0);
        let reading = mapper.map(10.0).unwrap();
        assert_eq!(reading.harmonic_index, MIN_HARMONIC);
        assert_eq!(reading.note_name, "C");
        assert_eq!(reading.octave, 0);

        // Zero stays out of range even with a floor.
        assert!(mapper.map(0.0).is_none());
    }

    #[test]
    fn cents_deviation_of_an_octave() {
        assert!((calculate_cents_deviation(880.0, 440.0) - 1200.0).abs() < 1e-9);
        assert!((calculate_cents_deviation(220.0, 440.0) + 1200.0).abs() < 1e-9);
    }
}
