// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Request, StatusCode};
use hyper_util::rt::TokioIo;
use std::time::Duration;
use tokio::time::timeout;

pub const STEP_COUNT_PAYLOAD: &str = r#"{
  "data": {
    "metrics": [
      {
        "name": "step_count",
        "units": "count",
        "data": [
          {"qty": 120, "date": "2021-12-24 00:04:00 +0800"},
          {"qty": 80, "date": "2021-12-24 00:05:00 +0800"}
        ]
      }
    ],
    "workouts": []
  }
}"#;

/// Send an HTTP request over TCP and return the status and body
pub async fn send_tcp_request(
    port: u16,
    uri: &str,
    method: &str,
    headers: &[(&str, &str)],
    body: Option<&str>,
) -> Result<(StatusCode, String), Box<dyn std::error::Error>> {
    let stream = timeout(
        Duration::from_secs(2),
        tokio::net::TcpStream::connect(format!("127.0.0.1:{}", port)),
    )
    .await??;

    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

    tokio::spawn(async move {
        let _ = conn.await;
    });

    let mut request_builder = Request::builder()
        .uri(uri)
        .method(method)
        .header("Host", format!("127.0.0.1:{}", port))
        .header("Content-Type", "application/json");
    for (name, value) in headers {
        request_builder = request_builder.header(*name, *value);
    }

    let body = body.unwrap_or_default().to_string();
    let request = request_builder
        .header("Content-Length", body.len().to_string())
        .body(Full::new(Bytes::from(body)))?;
    let response = timeout(Duration::from_secs(2), sender.send_request(request)).await??;

    let status = response.status();
    let bytes = response.into_body().collect().await?.to_bytes();
    Ok((status, String::from_utf8(bytes.to_vec())?))
}
