// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{self, HeaderMap, HeaderValue};
use hyper::{Response, StatusCode};
use subtle::ConstantTimeEq;
use tracing::{debug, error, warn};

pub type HttpResponse = Response<Full<Bytes>>;

/// Plain-text response with the given status. The message is logged at
/// debug for successes, warn for client errors and error for server errors.
pub fn log_and_create_http_response(message: &str, status: StatusCode) -> HttpResponse {
    if status.is_server_error() {
        error!("{message}");
    } else if status.is_client_error() {
        warn!("{message}");
    } else {
        debug!("{message}");
    }

    let mut response = Response::new(Full::new(Bytes::from(message.to_string())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// Checks the `Content-Length` header against `max_content_length`.
///
/// Returns `None` when the request may proceed. Chunked requests without a
/// length are let through; their body is bounded while it is read.
pub fn verify_request_content_length(
    header_map: &HeaderMap,
    max_content_length: usize,
    error_message_prefix: &str,
) -> Option<HttpResponse> {
    let content_length_header = match header_map.get(header::CONTENT_LENGTH) {
        Some(res) => res,
        None => {
            if header_map.contains_key(header::TRANSFER_ENCODING) {
                return None;
            }
            return Some(log_and_create_http_response(
                &format!(
                    "{error_message_prefix}: Missing Content-Length and Transfer-Encoding header"
                ),
                StatusCode::LENGTH_REQUIRED,
            ));
        }
    };

    let content_length = match content_length_header
        .to_str()
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
    {
        Some(length) => length,
        None => {
            return Some(log_and_create_http_response(
                &format!("{error_message_prefix}: Invalid Content-Length header"),
                StatusCode::BAD_REQUEST,
            ));
        }
    };

    if content_length > max_content_length {
        return Some(log_and_create_http_response(
            &format!("{error_message_prefix}: Payload too large"),
            StatusCode::PAYLOAD_TOO_LARGE,
        ));
    }
    None
}

/// Constant-time comparison of the `Authorization` header with
/// `Bearer <token>`.
pub fn verify_bearer_token(header_map: &HeaderMap, token: &str) -> bool {
    let Some(provided) = header_map
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
    else {
        return false;
    };

    provided.as_bytes().ct_eq(token.as_bytes()).into()
}
