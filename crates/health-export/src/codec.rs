// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::io::Read;

use tracing::trace;

use crate::errors::{DecodeError, EncodeError};
use crate::payload::Payload;

/// Decodes a payload from raw request bytes. A `null` document is an empty
/// payload.
pub fn decode(bytes: &[u8]) -> Result<Payload, DecodeError> {
    let payload = serde_json::from_slice::<Option<Payload>>(bytes)?.unwrap_or_default();
    trace!(
        metrics = payload.metrics().len(),
        workouts = payload.workouts().len(),
        "decoded payload"
    );
    Ok(payload)
}

pub fn decode_reader<R: Read>(reader: R) -> Result<Payload, DecodeError> {
    Ok(serde_json::from_reader::<_, Option<Payload>>(reader)?.unwrap_or_default())
}

/// Encodes a payload as compact JSON. Timestamps use the canonical 24-hour
/// format regardless of how they were received.
pub fn encode(payload: &Payload) -> Result<Vec<u8>, EncodeError> {
    Ok(serde_json::to_vec(payload)?)
}

pub fn encode_pretty(payload: &Payload) -> Result<Vec<u8>, EncodeError> {
    Ok(serde_json::to_vec_pretty(payload)?)
}

pub fn encode_to_string(payload: &Payload) -> Result<String, EncodeError> {
    Ok(serde_json::to_string(payload)?)
}
