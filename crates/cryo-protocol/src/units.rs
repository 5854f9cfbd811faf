//! Unit-aware numeric parsing of controller replies
//!
//! Temperature replies carry the input's unit symbol (`K`, `C`, `F`, `S`).
//! Depending on firmware and display settings the symbol may come before or
//! after the number, so the unit is removed as a literal substring rather
//! than an anchored suffix.

use tracing::trace;

use crate::error::ParseError;

/// Parse a temperature reply, removing the first occurrence of `unit`.
///
/// ```rust
/// use cryo_protocol::units::parse_temperature;
///
/// assert_eq!(parse_temperature("310.5K", "K").unwrap(), 310.5);
/// assert_eq!(parse_temperature("K310.5", "K").unwrap(), 310.5);
/// ```
pub fn parse_temperature(raw: &str, unit: &str) -> Result<f64, ParseError> {
    let stripped = if unit.is_empty() {
        raw.to_string()
    } else {
        raw.replacen(unit, "", 1)
    };
    parse_number(&stripped)
}

/// Parse an output power reply (percent of full scale) as a fraction.
///
/// Values outside 0-100 are passed through unclamped.
pub fn parse_percent(raw: &str) -> Result<f64, ParseError> {
    Ok(parse_number(raw)? / 100.0)
}

fn parse_number(text: &str) -> Result<f64, ParseError> {
    let trimmed = text.trim();
    trimmed.parse::<f64>().map_err(|e| {
        trace!("Unparsable reply {:?}: {}", trimmed, e);
        ParseError::InvalidNumber(trimmed.to_string())
    })
}

/// Format a set point for writing to the device.
///
/// Whole numbers keep one decimal place (`300.0`), everything else uses the
/// shortest representation that round-trips.
pub fn format_value(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}
