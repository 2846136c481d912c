//! Human duration strings for timed disable ("30s", "5m", "1h30m")

use crate::error::PiholeResult;
use crate::validation_error;

/// Parse a duration into whole seconds.
///
/// A bare number is seconds. Units `s`, `m`, `h`, `d` may be chained
/// (`1h30m`). Whitespace between parts is ignored.
pub fn parse_duration(input: &str) -> PiholeResult<u64> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(validation_error!("Duration is empty", "duration", "duration"));
    }

    if let Ok(seconds) = compact.parse::<u64>() {
        return Ok(seconds);
    }

    let mut total: u64 = 0;
    let mut digits = String::new();
    for c in compact.to_ascii_lowercase().chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }

        let unit = match c {
            's' => 1,
            'm' => 60,
            'h' => 3600,
            'd' => 86_400,
            other => {
                return Err(validation_error!(
                    format!("Unknown duration unit '{}' in '{}'", other, input),
                    "duration",
                    "duration"
                ))
            }
        };

        let value: u64 = digits.parse().map_err(|_| {
            validation_error!(
                format!("Missing number before '{}' in '{}'", c, input),
                "duration",
                "duration"
            )
        })?;
        digits.clear();

        total = value
            .checked_mul(unit)
            .and_then(|v| total.checked_add(v))
            .ok_or_else(|| validation_error!("Duration is too large", "duration", "duration"))?;
    }

    if !digits.is_empty() {
        return Err(validation_error!(
            format!("Trailing number without unit in '{}'", input),
            "duration",
            "duration"
        ));
    }

    Ok(total)
}
