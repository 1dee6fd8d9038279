//! # Harmonic Table Module
//!
//! Equal temperament lookup tables used to name detected pitches.
//!
//! Harmonic indices are semitone offsets from C4, so index 9 is the A4
//! tuning reference at 440 Hz. The table covers `[MIN_HARMONIC, MAX_HARMONIC]`
//! and is stored with a bias so the lowest entry sits at position zero.
//!
//! ## Features
//! - Precomputed semitone to frequency table, built once at startup
//! - Harmonic index to note name and octave conversion
//! - Plain `A4`-style labels for reporting

/// Lowest representable harmonic index (C0).
pub const MIN_HARMONIC: i32 = -48;

/// Highest representable harmonic index (B10).
pub const MAX_HARMONIC: i32 = 83;

/// Offset added to a harmonic index to obtain its table position.
pub const HARMONIC_BIAS: i32 = 48;

/// Tuning reference frequency of A4 in Hz.
pub const REFERENCE_FREQUENCY: f64 = 440.0;

/// Harmonic index of the tuning reference (A4).
pub const REFERENCE_HARMONIC: i32 = 9;

/// Chromatic note names, starting at C.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

const TABLE_LEN: usize = (HARMONIC_BIAS + MAX_HARMONIC + 1) as usize;

/// Semitone to frequency lookup table.
///
/// Built once and then only read. Share it between analyzer threads with an
/// `Arc` rather than rebuilding it per worker.
#[derive(Debug, Clone)]
pub struct HarmonicTable {
    frequencies: Box<[f64; TABLE_LEN]>,
}

impl HarmonicTable {
    /// Builds the table: `440 * 2^((x - BIAS - 9) / 12)` for every biased
    /// index `x` in `[0, BIAS + MAX_HARMONIC]`.
    pub fn new() -> Self {
        let mut frequencies = Box::new([0.0; TABLE_LEN]);
        for (x, slot) in frequencies.iter_mut().enumerate() {
            let semitones = x as i32 - HARMONIC_BIAS - REFERENCE_HARMONIC;
            *slot = REFERENCE_FREQUENCY * 2.0_f64.powf(semitones as f64 / 12.0);
        }
        Self { frequencies }
    }

    /// Returns the equal temperament frequency of harmonic `h`, or `None`
    /// when `h` is outside `[MIN_HARMONIC, MAX_HARMONIC]`.
    pub fn frequency_of(&self, h: i32) -> Option<f64> {
        if !contains(h) {
            return None;
        }
        Some(self.frequencies[(h + HARMONIC_BIAS) as usize])
    }

    /// Iterates over every `(harmonic, frequency)` pair, lowest first.
    pub fn iter(&self) -> impl Iterator<Item = (i32, f64)> + '_ {
        self.frequencies
            .iter()
            .enumerate()
            .map(|(x, &freq)| (x as i32 - HARMONIC_BIAS, freq))
    }
}

impl Default for HarmonicTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns true when `h` has a table entry.
pub fn contains(h: i32) -> bool {
    (MIN_HARMONIC..=MAX_HARMONIC).contains(&h)
}

/// Converts a harmonic index to its note name and octave.
///
/// # Arguments
/// * `h` - Harmonic index (semitones from C4)
///
/// # Returns
/// * `Some((name, octave))` - e.g. `("A", 4)` for `h = 9`
/// * `None` - `h` is outside the table
pub fn harmonic_to_note(h: i32) -> Option<(&'static str, i32)> {
    if !contains(h) {
        return None;
    }
    let biased = h + HARMONIC_BIAS;
    let octave = biased / 12;
    Some((NOTE_NAMES[(biased % 12) as usize], octave))
}

/// Formats a harmonic index as a note label such as `"C#5"`.
pub fn label(h: i32) -> Option<String> {
    harmonic_to_note(h).map(|(name, octave)| format!("{name}{octave}"))
}

/// Treble staff glyphs for C4 through A#5: `O` on a line or space, `#` for
/// a sharp. Entry 0 is the empty staff.
const STAFF_LINES: [&str; 23] = [
    "  | | | | |  ",
    "O | | | | |  ",
    "# | | | | |  ",
    " O| | | | |  ",
    " #| | | | |  ",
    "  O | | | |  ",
    "  |O| | | |  ",
    "  |#| | | |  ",
    "  | O | | |  ",
    "  | # | | |  ",
    "  | |O| | |  ",
    "  | |#| | |  ",
    "  | | O | |  ",
    "  | | |O| |  ",
    "  | | |#| |  ",
    "  | | | O |  ",
    "  | | | # |  ",
    "  | | | |O|  ",
    "  | | | | O  ",
    "  | | | | |O ",
    "  | | | | |# ",
    "  | | | | | O",
    "  | | | | | #",
];

/// Draws harmonic `h` on a five-line treble staff. Notes outside C4..A#5
/// (0..=21) get the empty staff.
pub fn staff_line(h: i32) -> &'static str {
    match usize::try_from(h) {
        Ok(i) if i <= 21 => STAFF_LINES[i + 1],
        _ => STAFF_LINES[0],
    }
}
