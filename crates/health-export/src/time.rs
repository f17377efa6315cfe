// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Timestamp handling for exporter payloads.
//!
//! The exporter writes timestamps using the device's regional settings, so the
//! same producer may send 24-hour or 12-hour clock values, and newer iOS
//! releases insert a narrow no-break space (U+202F) before the meridiem
//! marker. Parsing tries every known format; the index of the last format that
//! worked is remembered so that a steady stream from one device only pays for
//! a single attempt.
//!
//! Encoding always uses [`TIME_FORMAT`], whatever format the value came from.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, FixedOffset, SecondsFormat};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::TimeParseError;

/// Canonical output format, e.g. `2021-12-24 00:04:00 +0800`.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// Known exporter formats in the order they are tried.
///
/// `%p` accepts `AM`/`PM` in either case, so one entry covers both the upper
/// and lower case meridiem variants.
pub const TIME_FORMATS: [&str; 3] = [
    TIME_FORMAT,
    "%Y-%m-%d %I:%M:%S %p %z",
    "%Y-%m-%d %I:%M:%S\u{202f}%p %z",
];

static DEFAULT_PARSER: TimeParser = TimeParser::new(&TIME_FORMATS);

/// Parses `s` with the process-wide parser.
pub fn parse_time(s: &str) -> Result<Time, TimeParseError> {
    DEFAULT_PARSER.parse(s)
}

/// Multi-format parser with a last-successful-format hint.
///
/// The hint is a plain atomic index read and written with relaxed ordering.
/// Concurrent parses may overwrite each other's hint; a stale hint only costs
/// a fallback scan over the full list.
#[derive(Debug)]
pub struct TimeParser {
    formats: &'static [&'static str],
    hint: AtomicUsize,
}

impl TimeParser {
    pub const fn new(formats: &'static [&'static str]) -> Self {
        Self {
            formats,
            hint: AtomicUsize::new(0),
        }
    }

    pub fn parse(&self, s: &str) -> Result<Time, TimeParseError> {
        let hint = self.hint.load(Ordering::Relaxed);
        if let Some(format) = self.formats.get(hint) {
            if let Ok(parsed) = DateTime::parse_from_str(s, format) {
                return Ok(Time(parsed));
            }
        }

        let mut reasons = Vec::with_capacity(self.formats.len());
        for (index, format) in self.formats.iter().enumerate() {
            match DateTime::parse_from_str(s, format) {
                Ok(parsed) => {
                    self.hint.store(index, Ordering::Relaxed);
                    return Ok(Time(parsed));
                }
                Err(e) => reasons.push(format!("cannot parse with format {format:?}: {e}")),
            }
        }
        Err(TimeParseError::new(s, reasons))
    }

    /// Format that will be attempted first on the next call.
    pub fn last_used_format(&self) -> &'static str {
        let hint = self.hint.load(Ordering::Relaxed);
        self.formats.get(hint).copied().unwrap_or(TIME_FORMAT)
    }
}

/// A wall-clock instant with the offset it was reported in.
///
/// Equality and ordering compare instants, so `07:57:00 am +1000` and
/// `07:57:00 +1000` are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Time(DateTime<FixedOffset>);

impl Time {
    pub fn new(datetime: DateTime<FixedOffset>) -> Self {
        Self(datetime)
    }

    pub fn as_datetime(&self) -> &DateTime<FixedOffset> {
        &self.0
    }

    /// Renders the value in [`TIME_FORMAT`].
    pub fn to_canonical_string(&self) -> String {
        self.0.format(TIME_FORMAT).to_string()
    }
}

impl From<DateTime<FixedOffset>> for Time {
    fn from(datetime: DateTime<FixedOffset>) -> Self {
        Self(datetime)
    }
}

impl FromStr for Time {
    type Err = TimeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_time(s)
    }
}

/// RFC 3339, e.g. `2021-11-26T02:35:10+08:00`.
impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }
}

impl Serialize for Time {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0.format(TIME_FORMAT))
    }
}

impl<'de> Deserialize<'de> for Time {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse_time(&s).map_err(de::Error::custom)
    }
}
