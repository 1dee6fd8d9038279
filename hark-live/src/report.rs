//! Console reporters for completed analyses.

use hark_core::harmonics::staff_line;
use hark_core::{Analysis, AnalysisOutcome, PitchReport, Reporter};
use std::io::{self, Write};

/// Output style for the live tool, picked with `HARK_REPORT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Text,
    /// Text with a treble staff column for C4..A#5.
    Staff,
    Json,
}

impl ReportFormat {
    pub fn from_env() -> Self {
        match std::env::var("HARK_REPORT") {
            Ok(value) if value.eq_ignore_ascii_case("json") => ReportFormat::Json,
            Ok(value) if value.eq_ignore_ascii_case("staff") => ReportFormat::Staff,
            _ => ReportFormat::Text,
        }
    }

    pub fn reporter<W: Write + 'static>(self, out: W) -> Box<dyn Reporter> {
        match self {
            ReportFormat::Text => Box::new(TextReporter { out, staff: false }),
            ReportFormat::Staff => Box::new(TextReporter { out, staff: true }),
            ReportFormat::Json => Box::new(JsonReporter { out }),
        }
    }
}

/// One line per analysis: frequency, deviation, harmonic, note and
/// intensity for a single peak, or a compact list for several.
pub struct TextReporter<W> {
    out: W,
    staff: bool,
}

impl<W: Write> TextReporter<W> {
    fn write_line(&mut self, analysis: &Analysis) -> io::Result<()> {
        match &analysis.outcome {
            AnalysisOutcome::NoPeak => writeln!(self.out, "#{:<6} no peak", analysis.seq),
            AnalysisOutcome::Detected(peaks) if peaks.len() == 1 => {
                writeln!(self.out, "#{:<6} {}", analysis.seq, format_peak(&peaks[0], self.staff))
            }
            AnalysisOutcome::Detected(peaks) => {
                write!(self.out, "#{:<6}", analysis.seq)?;
                for peak in peaks {
                    write!(self.out, " {:12.6} {}", peak.frequency, format_note(peak))?;
                }
                writeln!(self.out)
            }
        }
    }
}

impl<W: Write> Reporter for TextReporter<W> {
    fn report(&mut self, analysis: &Analysis) {
        if let Err(e) = self.write_line(analysis) {
            log::error!("Failed to write report: {e}");
        }
    }
}

/// One JSON object per line.
pub struct JsonReporter<W> {
    out: W,
}

impl<W: Write> Reporter for JsonReporter<W> {
    fn report(&mut self, analysis: &Analysis) {
        let result = serde_json::to_writer(&mut self.out, analysis)
            .map_err(io::Error::from)
            .and_then(|_| writeln!(self.out));
        if let Err(e) = result {
            log::error!("Failed to write report: {e}");
        }
    }
}

fn format_peak(peak: &PitchReport, staff: bool) -> String {
    let deviation = peak
        .note
        .as_ref()
        .map_or_else(|| format!("{:>13}", "-"), |n| format!("(~{:+11.6})", n.deviation_hz));
    let harmonic = peak
        .note
        .as_ref()
        .map_or_else(|| "  -".to_string(), |n| format!("{:3}", n.harmonic_index));
    let staff = if staff {
        let h = peak.note.as_ref().map_or(-1, |n| n.harmonic_index);
        format!("   {}", staff_line(h))
    } else {
        String::new()
    };
    format!(
        "{:12.6}: {}   {}   {}{}   {:14.3}",
        peak.frequency,
        deviation,
        harmonic,
        format_note(peak),
        staff,
        peak.intensity
    )
}

fn format_note(peak: &PitchReport) -> String {
    match &peak.note {
        Some(note) => format!("{:<2}{:<2}", note.note_name, note.octave),
        None => "--  ".to_string(),
    }
}
