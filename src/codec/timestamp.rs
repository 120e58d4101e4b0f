//! Timestamp Parsing
//!
//! Dotted-path lines may carry a trailing Unix timestamp. Up to 10 digits are
//! whole seconds. Longer values carry a fractional suffix after the first 10
//! digits, and how that suffix is read depends on [`FractionalTimestamps`].
//!
//! Parsing never fails a line: anything unreadable becomes "now".

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Number of leading digits holding whole seconds
pub const SECONDS_DIGITS: usize = 10;

const NANOS_PER_MILLI: i64 = 1_000_000;
const NANOS_DIGITS: usize = 9;

/// How digits past the tenth are turned into a sub-second offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FractionalTimestamps {
    /// Byte-compatible with data already written by earlier collectors.
    ///
    /// The suffix of length L is right-padded with L zeros, read as an
    /// integer and multiplied by one millisecond. `1700000000123` therefore
    /// lands 123 *seconds* after `1700000000`, not 123ms. The offset can
    /// exceed one second.
    Compat,
    /// The suffix is a decimal fraction of a second: `1700000000123` is
    /// `1700000000.123`. Digits past nanosecond precision are truncated.
    Exact,
}

impl Default for FractionalTimestamps {
    fn default() -> Self {
        FractionalTimestamps::Compat
    }
}

/// Parse a timestamp field, falling back to `now` on any failure
pub fn parse_timestamp(raw: &str, now: SystemTime, mode: FractionalTimestamps) -> SystemTime {
    if raw.is_empty() {
        return now;
    }
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        return now;
    }

    let parsed = if raw.len() <= SECONDS_DIGITS {
        raw.parse::<u64>()
            .ok()
            .and_then(|secs| UNIX_EPOCH.checked_add(Duration::from_secs(secs)))
    } else {
        let (secs, fraction) = raw.split_at(SECONDS_DIGITS);
        let offset = match mode {
            FractionalTimestamps::Compat => compat_offset(fraction),
            FractionalTimestamps::Exact => exact_offset(fraction),
        };
        secs.parse::<u64>().ok().and_then(|secs| {
            UNIX_EPOCH
                .checked_add(Duration::from_secs(secs))?
                .checked_add(offset?)
        })
    };

    parsed.unwrap_or(now)
}

/// Doubled zero-padding then milliseconds. Overflow counts as a parse failure.
fn compat_offset(fraction: &str) -> Option<Duration> {
    let padded = format!("{}{}", fraction, "0".repeat(fraction.len()));
    let scaled = padded.parse::<i64>().ok()?;
    let nanos = scaled.checked_mul(NANOS_PER_MILLI)?;
    Some(Duration::from_nanos(nanos as u64))
}

fn exact_offset(fraction: &str) -> Option<Duration> {
    let digits = &fraction[..fraction.len().min(NANOS_DIGITS)];
    let padded = format!("{:0<width$}", digits, width = NANOS_DIGITS);
    let nanos = padded.parse::<u32>().ok()?;
    Some(Duration::new(0, nanos))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(42)
    }

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn test_absent_is_now() {
        assert_eq!(parse_timestamp("", now(), FractionalTimestamps::Compat), now());
    }

    #[test]
    fn test_ten_digits_is_whole_seconds() {
        let ts = parse_timestamp("1700000000", now(), FractionalTimestamps::Compat);
        assert_eq!(ts, at(1_700_000_000));
    }

    #[test]
    fn test_short_value_is_whole_seconds() {
        let ts = parse_timestamp("12345", now(), FractionalTimestamps::Compat);
        assert_eq!(ts, at(12_345));
    }

    #[test]
    fn test_compat_millis_suffix_is_scaled_quirkily() {
        // "123" -> "123000" -> 123000ms
        let ts = parse_timestamp("1700000000123", now(), FractionalTimestamps::Compat);
        assert_eq!(ts, at(1_700_000_000) + Duration::from_secs(123));
    }

    #[test]
    fn test_compat_single_digit_suffix() {
        // "5" -> "50" -> 50ms
        let ts = parse_timestamp("17000000005", now(), FractionalTimestamps::Compat);
        assert_eq!(ts, at(1_700_000_000) + Duration::from_millis(50));
    }

    #[test]
    fn test_compat_overflow_falls_back_to_now() {
        // 9-digit suffix doubles to 18 digits, times 1ms overflows i64
        let ts = parse_timestamp("1700000000999999999", now(), FractionalTimestamps::Compat);
        assert_eq!(ts, now());
    }

    #[test]
    fn test_exact_millis_suffix() {
        let ts = parse_timestamp("1700000000123", now(), FractionalTimestamps::Exact);
        assert_eq!(ts, at(1_700_000_000) + Duration::from_millis(123));
    }

    #[test]
    fn test_exact_truncates_past_nanos() {
        let ts = parse_timestamp("1700000000123456789999", now(), FractionalTimestamps::Exact);
        assert_eq!(ts, at(1_700_000_000) + Duration::from_nanos(123_456_789));
    }

    #[test]
    fn test_non_digits_fall_back_to_now() {
        assert_eq!(
            parse_timestamp("17000000x0", now(), FractionalTimestamps::Exact),
            now()
        );
        assert_eq!(
            parse_timestamp("+1700000000", now(), FractionalTimestamps::Compat),
            now()
        );
    }

    #[test]
    fn test_mode_deserializes_lowercase() {
        #[derive(Deserialize)]
        struct Wrapper {
            mode: FractionalTimestamps,
        }
        let w: Wrapper = toml::from_str("mode = \"exact\"").unwrap();
        assert_eq!(w.mode, FractionalTimestamps::Exact);
        assert_eq!(FractionalTimestamps::default(), FractionalTimestamps::Compat);
    }
}
