// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP transport. Each registered destination gets one route:
//! `POST /api/healthautoexport/v1/<lowercased name>/ingest?target=<label>`.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use health_ingester::Ingester;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::header::{self, HeaderValue};
use hyper::service::service_fn;
use hyper::{Method, Request, StatusCode};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::error::ServerError;
use crate::http_utils::{
    log_and_create_http_response, verify_bearer_token, verify_request_content_length,
    HttpResponse,
};

pub const ROUTE_PREFIX: &str = "/api/healthautoexport/v1";

pub fn ingest_path(destination: &str) -> String {
    format!("{ROUTE_PREFIX}/{}/ingest", destination.to_lowercase())
}

#[derive(Debug, Default, Deserialize)]
struct IngestQuery {
    #[serde(default)]
    target: String,
}

pub struct IngestService {
    ingester: Arc<Ingester>,
    routes: HashMap<String, String>,
    auth_token: Option<String>,
    max_request_bytes: usize,
}

impl IngestService {
    /// Builds one route per destination registered on `ingester`.
    pub fn new(ingester: Arc<Ingester>, auth_token: Option<String>, max_request_bytes: usize) -> Self {
        let routes = ingester
            .destinations()
            .into_iter()
            .map(|name| (ingest_path(&name), name))
            .collect();
        Self {
            ingester,
            routes,
            auth_token,
            max_request_bytes,
        }
    }

    /// Paths served, sorted.
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }

    pub async fn handle<B>(&self, req: Request<B>, remote_addr: Option<SocketAddr>) -> HttpResponse
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let started = Instant::now();
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let user_agent = req
            .headers()
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("-")
            .to_string();

        let remote_addr = remote_addr.map_or_else(|| "-".to_string(), |addr| addr.to_string());

        let response = self.route(req).await;

        info!(
            %method,
            %path,
            %remote_addr,
            %user_agent,
            status = response.status().as_u16(),
            elapsed = ?started.elapsed(),
            "handled request"
        );
        response
    }

    async fn route<B>(&self, req: Request<B>) -> HttpResponse
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let Some(destination) = self.routes.get(req.uri().path()) else {
            return log_and_create_http_response("not found", StatusCode::NOT_FOUND);
        };

        if req.method() != Method::POST {
            let mut response =
                log_and_create_http_response("method not allowed", StatusCode::METHOD_NOT_ALLOWED);
            response
                .headers_mut()
                .insert(header::ALLOW, HeaderValue::from_static("POST"));
            return response;
        }

        if let Some(token) = &self.auth_token {
            if !verify_bearer_token(req.headers(), token) {
                return log_and_create_http_response("unauthorized", StatusCode::UNAUTHORIZED);
            }
        }

        let error_prefix = format!("ingest error for {destination}");
        if let Some(response) =
            verify_request_content_length(req.headers(), self.max_request_bytes, &error_prefix)
        {
            return response;
        }

        let query: IngestQuery = match serde_urlencoded::from_str(req.uri().query().unwrap_or("")) {
            Ok(query) => query,
            Err(e) => {
                return log_and_create_http_response(
                    &format!("{error_prefix}: invalid query: {e}"),
                    StatusCode::BAD_REQUEST,
                )
            }
        };

        let body = match Limited::new(req.into_body(), self.max_request_bytes).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                return log_and_create_http_response(
                    &format!("{error_prefix}: Payload too large"),
                    StatusCode::PAYLOAD_TOO_LARGE,
                )
            }
            Err(e) => {
                return log_and_create_http_response(
                    &format!("{error_prefix}: cannot read body: {e}"),
                    StatusCode::BAD_REQUEST,
                )
            }
        };
        trace!(%destination, target = %query.target, body = %String::from_utf8_lossy(&body), "request body");

        match self.ingester.ingest(&body, destination, &query.target) {
            Ok(()) => log_and_create_http_response("ok", StatusCode::OK),
            Err(e) => log_and_create_http_response(
                &format!("{error_prefix}: {e}"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        }
    }

    /// Accepts connections until `cancel` fires. Connections already being
    /// served are left to finish on their own tasks.
    pub async fn serve(self: Arc<Self>, listener: TcpListener, cancel: CancellationToken) -> Result<(), ServerError> {
        let server = hyper::server::conn::http1::Builder::new();
        let mut joinset = tokio::task::JoinSet::new();

        if let Ok(addr) = listener.local_addr() {
            info!(%addr, routes = ?self.paths(), "listening for exports");
        }

        loop {
            let (conn, remote_addr) = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(connections = joinset.len(), "stopped accepting connections");
                    joinset.detach_all();
                    return Ok(());
                },
                con_res = listener.accept() => match con_res {
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::ConnectionAborted
                                | io::ErrorKind::ConnectionReset
                                | io::ErrorKind::ConnectionRefused
                        ) =>
                    {
                        continue;
                    }
                    Err(e) => {
                        error!("Server error: {e}");
                        return Err(e.into());
                    }
                    Ok(accepted) => accepted,
                },
                finished = async {
                    match joinset.join_next().await {
                        Some(finished) => finished,
                        None => std::future::pending().await,
                    }
                } => match finished {
                    Err(e) if e.is_panic() => {
                        error!("Connection handler panicked: {:?}", e);
                        continue;
                    },
                    Ok(()) | Err(_) => continue,
                },
            };

            let conn = hyper_util::rt::TokioIo::new(conn);
            let server = server.clone();
            let this = Arc::clone(&self);
            let service = service_fn(move |req| {
                let this = Arc::clone(&this);
                async move { Ok::<_, std::convert::Infallible>(this.handle(req, Some(remote_addr)).await) }
            });
            joinset.spawn(async move {
                if let Err(e) = server.serve_connection(conn, service).await {
                    debug!("Connection error: {e}");
                }
            });
        }
    }
}
