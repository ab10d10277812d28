// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! TTL extraction from node annotations.
//!
//! The TTL annotation accepts either a plain number of seconds (`"300"`) or a Go-style
//! duration string (`"5m"`, `"1h30m"`). Invalid or out-of-range values are logged and
//! ignored so that a typo never blocks publishing a node.

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::warn;

use crate::annotations::TTL_ANNOTATION;
use crate::constants::{TTL_MAX_SECS, TTL_MIN_SECS};

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SECOND: u128 = 1_000_000_000;
const NANOS_PER_MINUTE: u128 = 60 * NANOS_PER_SECOND;
const NANOS_PER_HOUR: u128 = 60 * NANOS_PER_MINUTE;

// Digits beyond this are below nanosecond precision for every unit
const MAX_FRACTION_DIGITS: usize = 18;

/// Parse a Go-style duration string into a Rust `Duration`.
///
/// A duration is a sequence of decimal numbers, each with an optional fraction and a
/// unit suffix, such as `"300ms"`, `"1.5h"` or `"2h45m"`. Valid units are `ns`,
/// `us` (or `µs`), `ms`, `s`, `m`, `h`. The bare string `"0"` is also accepted.
///
/// # Examples
///
/// ```
/// use nodedns::ttl::parse_go_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_go_duration("90s").unwrap(), Duration::from_secs(90));
/// assert_eq!(parse_go_duration("1m30s").unwrap(), Duration::from_secs(90));
/// assert_eq!(parse_go_duration("1.5h").unwrap(), Duration::from_secs(5400));
///
/// assert!(parse_go_duration("").is_err());
/// assert!(parse_go_duration("10").is_err());  // Missing unit
/// assert!(parse_go_duration("10d").is_err()); // Unknown unit
/// ```
///
/// # Errors
///
/// Returns an error if:
/// - The string is empty or has a number without a unit
/// - A unit is not recognized
/// - The duration is negative or overflows
pub fn parse_go_duration(duration_str: &str) -> Result<Duration> {
    let unsigned = duration_str.strip_prefix('+').unwrap_or(duration_str);
    if unsigned.starts_with('-') {
        bail!("Duration '{duration_str}' is negative");
    }
    if unsigned == "0" {
        return Ok(Duration::ZERO);
    }
    if unsigned.is_empty() {
        bail!("Duration string cannot be empty");
    }

    let mut total: u128 = 0;
    let mut rest = unsigned;

    while !rest.is_empty() {
        let int_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let (int_part, after_int) = rest.split_at(int_end);

        let (frac_part, after_number) = match after_int.strip_prefix('.') {
            Some(fraction) => {
                let frac_end = fraction
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(fraction.len());
                fraction.split_at(frac_end)
            }
            None => ("", after_int),
        };

        if int_part.is_empty() && frac_part.is_empty() {
            bail!("Invalid duration '{duration_str}'");
        }

        let unit_end = after_number
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after_number.len());
        let (unit, remaining) = after_number.split_at(unit_end);

        let unit_nanos = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => NANOS_PER_MICRO,
            "ms" => NANOS_PER_MILLI,
            "s" => NANOS_PER_SECOND,
            "m" => NANOS_PER_MINUTE,
            "h" => NANOS_PER_HOUR,
            "" => bail!("Missing unit in duration '{duration_str}'"),
            _ => bail!("Unknown unit '{unit}' in duration '{duration_str}'"),
        };

        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part
                .parse()
                .context("Duration value must be a positive integer")?
        };
        total = whole
            .checked_mul(unit_nanos)
            .and_then(|v| total.checked_add(v))
            .context("Duration value too large (overflow)")?;

        if !frac_part.is_empty() {
            let digits = &frac_part[..frac_part.len().min(MAX_FRACTION_DIGITS)];
            let numerator: u128 = digits.parse().context("Invalid duration fraction")?;
            let scale = 10u128.pow(u32::try_from(digits.len()).context("Invalid duration fraction")?);
            total = total
                .checked_add(numerator * unit_nanos / scale)
                .context("Duration value too large (overflow)")?;
        }

        rest = remaining;
    }

    let nanos = u64::try_from(total).context("Duration value too large (overflow)")?;
    Ok(Duration::from_nanos(nanos))
}

/// Parse a TTL value into whole seconds.
///
/// Duration strings are tried first; plain integers are the fallback. Fractional
/// seconds are truncated.
///
/// # Errors
///
/// Returns the duration parse error if the value is neither a duration nor an integer.
pub fn parse_ttl(value: &str) -> Result<i64> {
    match parse_go_duration(value) {
        Ok(duration) => {
            i64::try_from(duration.as_secs()).context("TTL value too large (overflow)")
        }
        Err(duration_err) => value.parse::<i64>().map_err(|_| duration_err),
    }
}

/// Read the TTL annotation of a resource.
///
/// Returns `None` when the annotation is absent, unparseable, or outside
/// `[TTL_MIN_SECS, TTL_MAX_SECS]`. The latter two cases log a warning naming
/// `resource` (e.g. `node/worker-1`).
///
/// # Example
///
/// ```
/// use nodedns::ttl::ttl_from_annotations;
/// use std::collections::BTreeMap;
///
/// let annotations = BTreeMap::from([(
///     "external-dns.alpha.kubernetes.io/ttl".to_string(),
///     "2m".to_string(),
/// )]);
/// assert_eq!(ttl_from_annotations(&annotations, "node/worker-1"), Some(120));
/// ```
#[must_use]
pub fn ttl_from_annotations(annotations: &BTreeMap<String, String>, resource: &str) -> Option<i32> {
    let raw = annotations.get(TTL_ANNOTATION)?;

    let seconds = match parse_ttl(raw) {
        Ok(seconds) => seconds,
        Err(e) => {
            warn!(resource, value = %raw, error = %e, "Ignoring invalid TTL annotation");
            return None;
        }
    };

    if !(TTL_MIN_SECS..=TTL_MAX_SECS).contains(&seconds) {
        warn!(
            resource,
            ttl = seconds,
            "TTL value must be between [{TTL_MIN_SECS}, {TTL_MAX_SECS}]"
        );
        return None;
    }

    i32::try_from(seconds).ok()
}

#[cfg(test)]
#[path = "ttl_tests.rs"]
mod ttl_tests;
