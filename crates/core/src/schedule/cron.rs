// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Five-field cron expression parsing and matching
//!
//! Fields: minute, hour, day-of-month, month, day-of-week. Each field
//! accepts `*`, numbers, `a-b` ranges, comma lists, and `/step` on a
//! range or `*`. Day-of-week 0 and 7 both mean Sunday. Day handling is
//! vixie-style: when day-of-month and day-of-week are both restricted,
//! a date matches if either matches.

use chrono::{Datelike, NaiveDateTime, Timelike};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CronParseError {
    #[error("expected 5 fields (minute hour day month weekday), got {got}")]
    FieldCount { got: usize },
    #[error("invalid {field} field {value:?}")]
    BadField { field: &'static str, value: String },
    #[error("{field} value {value} out of range {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },
}

/// One parsed field as a bitmask plus a flag for whether it was `*`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Field {
    mask: u64,
    any: bool,
}

impl Field {
    fn contains(&self, value: u32) -> bool {
        self.mask & (1 << value) != 0
    }
}

fn parse_field(
    spec: &str,
    field: &'static str,
    min: u32,
    max: u32,
) -> Result<Field, CronParseError> {
    let bad = || CronParseError::BadField {
        field,
        value: spec.to_string(),
    };

    if spec == "*" {
        let mut mask = 0u64;
        for v in min..=max {
            mask |= 1 << v;
        }
        return Ok(Field { mask, any: true });
    }

    let parse_num = |s: &str| -> Result<u32, CronParseError> {
        let value: u32 = s.parse().map_err(|_| bad())?;
        if value < min || value > max {
            return Err(CronParseError::OutOfRange {
                field,
                value,
                min,
                max,
            });
        }
        Ok(value)
    };

    let mut mask = 0u64;
    for atom in spec.split(',') {
        if atom.is_empty() {
            return Err(bad());
        }

        let (base, step) = match atom.split_once('/') {
            Some((b, s)) => (b, s.parse::<u32>().map_err(|_| bad())?),
            None => (atom, 1),
        };
        if step == 0 {
            return Err(bad());
        }

        let (lo, hi) = if base == "*" {
            (min, max)
        } else if let Some((a, b)) = base.split_once('-') {
            (parse_num(a)?, parse_num(b)?)
        } else {
            let v = parse_num(base)?;
            // A bare number with a step means "from v to max", per vixie
            if step > 1 {
                (v, max)
            } else {
                (v, v)
            }
        };
        if lo > hi {
            return Err(bad());
        }

        let mut v = lo;
        while v <= hi {
            mask |= 1 << v;
            v += step;
        }
    }

    Ok(Field { mask, any: false })
}

/// A parsed five-field cron expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    minute: Field,
    hour: Field,
    dom: Field,
    month: Field,
    dow: Field,
    source: String,
}

impl CronSchedule {
    pub fn parse(expr: &str) -> Result<Self, CronParseError> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(CronParseError::FieldCount { got: fields.len() });
        }

        let mut dow = parse_field(fields[4], "day-of-week", 0, 7)?;
        // 7 is an alias for Sunday
        if dow.contains(7) {
            dow.mask |= 1;
            dow.mask &= !(1 << 7);
        }

        Ok(Self {
            minute: parse_field(fields[0], "minute", 0, 59)?,
            hour: parse_field(fields[1], "hour", 0, 23)?,
            dom: parse_field(fields[2], "day-of-month", 1, 31)?,
            month: parse_field(fields[3], "month", 1, 12)?,
            dow,
            source: expr.to_string(),
        })
    }

    /// Does the given wall-clock minute match this schedule?
    pub fn matches(&self, t: NaiveDateTime) -> bool {
        if !self.minute.contains(t.minute())
            || !self.hour.contains(t.hour())
            || !self.month.contains(t.month())
        {
            return false;
        }

        let dom_ok = self.dom.contains(t.day());
        let dow_ok = self.dow.contains(t.weekday().num_days_from_sunday());

        match (self.dom.any, self.dow.any) {
            // Both restricted: vixie OR rule
            (false, false) => dom_ok || dow_ok,
            _ => dom_ok && dow_ok,
        }
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

#[cfg(test)]
#[path = "cron_tests.rs"]
mod tests;
