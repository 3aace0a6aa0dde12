//! Size strings such as `999mb`, `10k` or `512`

use crate::encoder::SizeBudget;
use crate::error::{HighlightError, Result};

/// Parses a size string into a budget.
///
/// A trailing `b`/`B` selects byte units (`k`/`kb` = 1024, up to `pb`);
/// anything else is a plain count where `k`, `m`, `g`, `t`, `p` are powers
/// of 1000. Fractions are accepted and truncated after scaling.
pub fn parse_size_budget(size: &str) -> Result<SizeBudget> {
    let trimmed = size.trim();
    let value = if trimmed.ends_with(['b', 'B']) {
        parse_bytes(trimmed)
    } else {
        parse_singles(trimmed)
    }
    .ok_or_else(|| HighlightError::InvalidSize(size.to_string()))?;
    Ok(SizeBudget::Limit(value))
}

/// Like [`parse_size_budget`], but a missing value means no bound.
pub fn parse_optional_budget(size: Option<&str>) -> Result<SizeBudget> {
    match size {
        Some(size) => parse_size_budget(size),
        None => Ok(SizeBudget::Unbounded),
    }
}

fn parse_bytes(size: &str) -> Option<usize> {
    let lower = size.to_ascii_lowercase();
    const UNITS: [(&str, u32); 5] = [("kb", 1), ("mb", 2), ("gb", 3), ("tb", 4), ("pb", 5)];
    for (suffix, power) in UNITS {
        if let Some(number) = lower.strip_suffix(suffix) {
            return scale(number, 1024f64.powi(power as i32));
        }
    }
    scale(lower.strip_suffix('b')?, 1.0)
}

fn parse_singles(size: &str) -> Option<usize> {
    let lower = size.to_ascii_lowercase();
    const UNITS: [(char, i32); 5] = [('k', 3), ('m', 6), ('g', 9), ('t', 12), ('p', 15)];
    for (suffix, power) in UNITS {
        if let Some(number) = lower.strip_suffix(suffix) {
            return scale(number, 10f64.powi(power));
        }
    }
    lower.parse::<usize>().ok()
}

fn scale(number: &str, factor: f64) -> Option<usize> {
    let number = number.trim();
    if number.is_empty() || number.starts_with(['-', '+']) {
        return None;
    }
    let value: f64 = number.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    let scaled = value * factor;
    if scaled >= usize::MAX as f64 {
        return Some(usize::MAX);
    }
    Some(scaled as usize)
}
