// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP front end for the Health Auto Export ingester.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::future::Future;
use std::sync::Arc;

use health_ingester::destinations::{LocalFile, Stdout};
use health_ingester::Ingester;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub mod config;
pub mod error;
pub mod http_utils;
pub mod server;

use config::ServerConfig;
use error::ServerError;
use server::IngestService;

/// Builds an ingester with every destination enabled in `config`. The
/// ingester is not started.
pub fn build_ingester(config: &ServerConfig) -> Result<Ingester, ServerError> {
    let ingester = Ingester::new(config.ingester_config());

    if config.enable_local_file {
        let path = config.local_file_metrics_path.as_ref().ok_or_else(|| {
            ServerError::InvalidConfig("HAE_LOCALFILE_METRICS_PATH is not set".to_string())
        })?;
        ingester.register_destination(Arc::new(LocalFile::new(path)?))?;
    }
    if config.enable_stdout {
        ingester.register_destination(Arc::new(Stdout::new()))?;
    }
    Ok(ingester)
}

/// Serves until `shutdown` resolves, then stops accepting requests and drains
/// the ingester within `config.shutdown_timeout`.
pub async fn run(
    config: ServerConfig,
    listener: TcpListener,
    shutdown: impl Future<Output = ()>,
) -> Result<(), ServerError> {
    let ingester = Arc::new(build_ingester(&config)?);
    ingester.start()?;

    let service = Arc::new(IngestService::new(
        Arc::clone(&ingester),
        config.auth_token.clone(),
        config.max_request_bytes,
    ));
    let cancel = CancellationToken::new();
    let mut server = tokio::spawn(service.serve(listener, cancel.clone()));

    let served = tokio::select! {
        () = shutdown => {
            info!("shutdown requested");
            cancel.cancel();
            (&mut server).await
        },
        result = &mut server => result,
    };
    let served = match served {
        Ok(result) => result,
        Err(e) => {
            error!("HTTP server task failed: {e}");
            Ok(())
        }
    };

    tokio::time::timeout(config.shutdown_timeout, ingester.shutdown())
        .await
        .map_err(|_| ServerError::ShutdownTimeout(config.shutdown_timeout))?;
    served
}

/// Resolves on ctrl-c, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("cannot listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
