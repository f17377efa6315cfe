// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Returned when a timestamp matches none of the known exporter formats.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to parse time {input:?} across all known formats: {}", .reasons.join("; "))]
pub struct TimeParseError {
    input: String,
    reasons: Vec<String>,
}

impl TimeParseError {
    pub(crate) fn new(input: &str, reasons: Vec<String>) -> Self {
        Self {
            input: input.to_string(),
            reasons,
        }
    }

    /// The text that failed to parse.
    pub fn input(&self) -> &str {
        &self.input
    }

    /// One entry per attempted format, in the order they were tried.
    pub fn reasons(&self) -> &[String] {
        &self.reasons
    }
}

/// Malformed JSON, or a known field holding the wrong JSON type.
#[derive(Debug, thiserror::Error)]
#[error("cannot decode payload: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

impl DecodeError {
    /// Line of the input where decoding stopped, 1-based.
    pub fn line(&self) -> usize {
        self.0.line()
    }

    /// True when the input ended before a complete document was read.
    pub fn is_eof(&self) -> bool {
        self.0.is_eof()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("cannot encode payload: {0}")]
pub struct EncodeError(#[from] serde_json::Error);
