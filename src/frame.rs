// src/frame.rs
//
// Decoding of the scale's fixed-width output frame.
//
// Frame layout (one reading per line):
//
//   <sign><space padding><number><3-char unit suffix><CR><LF>
//   e.g. "+   123.45 g \r\n"
//
// The sign may itself be a space (unsigned reading). The decimal separator
// is always a dot and there is never an exponent.

use chrono::{DateTime, Local};
use serde::Serialize;
use thiserror::Error;

/// Terminator every frame must end with
pub const LINE_ENDING: &[u8] = b"\r\n";

/// Width of the unit suffix that trails the number (" g ")
pub const UNIT_SUFFIX_WIDTH: usize = 3;

/// A decoded reading.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Measurement {
    /// Frame text with padding removed, kept for display
    pub raw_text: String,
    pub mass_grams: f64,
    pub captured_at: DateTime<Local>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFault {
    #[error("malformed frame {raw_text:?}")]
    Malformed { raw_text: String },
}

/// Decode one line as delivered by the link, terminator included.
///
/// Callers filter out empty reads (timeouts) before getting here.
pub fn parse_frame(line: &[u8], captured_at: DateTime<Local>) -> Result<Measurement, ParseFault> {
    let malformed = || ParseFault::Malformed {
        raw_text: String::from_utf8_lossy(line)
            .trim_end_matches(['\r', '\n'])
            .to_string(),
    };

    let body = line.strip_suffix(LINE_ENDING).ok_or_else(malformed)?;
    let text = std::str::from_utf8(body).map_err(|_| malformed())?;

    // Keep the sign character verbatim, drop the padding after it
    let mut chars = text.chars();
    let sign = chars.next().ok_or_else(malformed)?;
    let display = format!("{}{}", sign, chars.as_str().trim_start());

    // Byte offset where the unit suffix starts
    let suffix_start = display
        .char_indices()
        .rev()
        .nth(UNIT_SUFFIX_WIDTH - 1)
        .map(|(i, _)| i)
        .ok_or_else(malformed)?;

    // A unit never contains digits; if it does, the frame has no unit
    if display[suffix_start..]
        .chars()
        .any(|c| c.is_ascii_digit() || c == '.')
    {
        return Err(malformed());
    }

    let number = display[..suffix_start].trim();
    if !is_plain_decimal(number) {
        return Err(malformed());
    }
    let mass_grams: f64 = number.parse().map_err(|_| malformed())?;

    Ok(Measurement {
        raw_text: display,
        mass_grams,
        captured_at,
    })
}

/// Optional sign, digits, at most one dot.
fn is_plain_decimal(s: &str) -> bool {
    let digits = s.strip_prefix(|c: char| c == '+' || c == '-').unwrap_or(s);
    let mut seen_dot = false;
    let mut seen_digit = false;

    for c in digits.chars() {
        match c {
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => return false,
        }
    }

    seen_digit
}
