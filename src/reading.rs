use std::fmt;

pub const STARTUP_LINE: &str = "[Arduino] Starting...";
pub const FAULT_LINE: &str = "[Arduino] Failed to read from DHT sensor!";
pub const LINE_ENDING: &str = "\n";

/// Outcome of one sensor query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    Valid { temperature: f32, humidity: f32 },
    Invalid,
}

impl Reading {
    /// Classifies a raw pair. A single non-finite field invalidates the whole reading.
    pub fn from_raw(temperature: f32, humidity: f32) -> Reading {
        if temperature.is_finite() && humidity.is_finite() {
            Reading::Valid {
                temperature,
                humidity,
            }
        } else {
            Reading::Invalid
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Reading::Valid { .. })
    }

    /// The serial line for this reading, without the line ending.
    pub fn line(&self) -> String {
        match self {
            Reading::Valid {
                temperature,
                humidity,
            } => format!(
                "{},{}",
                format_one_decimal(*temperature),
                format_one_decimal(*humidity)
            ),
            Reading::Invalid => FAULT_LINE.to_owned(),
        }
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.line())
    }
}

/// Formats `value` with exactly one fractional digit.
///
/// Rounds half away from zero on the exact binary value, so `-5.25` becomes
/// `-5.3` while `99.95f32` (stored as 99.9499969...) becomes `99.9`.
/// Negative values rounding to zero keep their sign.
pub fn format_one_decimal(value: f32) -> String {
    let rounded = (f64::from(value) * 10.0).round() / 10.0;
    format!("{rounded:.1}")
}
