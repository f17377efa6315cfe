// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::process::ExitCode;

use health_ingester_server::config::ServerConfig;
use health_ingester_server::error::ServerError;
use tokio::net::TcpListener;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
pub async fn main() -> ExitCode {
    let config = ServerConfig::from_env();
    let log_level = config
        .as_ref()
        .map_or("info", |config| config.log_level.as_str());

    let env_filter = format!("h2=off,hyper=off,{log_level}");
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    debug!(
        listen_addr = %config.listen_addr,
        local_file = config.enable_local_file,
        stdout = config.enable_stdout,
        auth = config.auth_token.is_some(),
        "loaded configuration"
    );

    let listener = match TcpListener::bind(config.listen_addr).await {
        Ok(listener) => listener,
        Err(source) => {
            error!(
                "{}",
                ServerError::Bind {
                    addr: config.listen_addr,
                    source
                }
            );
            return ExitCode::FAILURE;
        }
    };

    match health_ingester_server::run(config, listener, health_ingester_server::shutdown_signal()).await {
        Ok(()) => {
            info!("health ingester stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
