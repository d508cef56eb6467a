//! Library entry for the `linkshift_agent` crate.
//!
//! Exposes `inner_main` so a workspace-level shim binary can call into the agent logic.
//!
//! Provides the long-running handover controller service, a one-shot probe and a load sink.
#![cfg_attr(
    test,
    expect(clippy::indexing_slicing, reason = "This is not problematic in tests",)
)]

extern crate alloc;
extern crate core;

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod control;
pub mod net;
pub mod probe;
pub mod quality;
pub mod radio;
pub mod route;
pub mod sink;
pub mod stream;
#[cfg(test)]
mod testing;

use alloc::sync::Arc;
use core::time::Duration;
use std::{env, process, sync::Once};

use eyre::{Result, WrapErr as _, eyre};
use tokio::signal;
use tracing::{Instrument as _, info};
use tracing_subscriber::{EnvFilter, fmt::time::ChronoLocal};

use app::{Attachment, Controller, ExecutorSettings, HandoverExecutor, ScanLoop, Shared};
use cli::{Cli, Command, LogFormat};
use commands::Tool;
use config::AgentConfig;
use control::{ChannelSettings, ControlChannel, WsConnector};
use net::IpTool;
use radio::WpaCli;
use route::RouteRedirector;
use stream::{LoadGenerator, MediaPipeline, StreamSupervisor};

static INIT_TRACING: Once = Once::new();

/// The agent's main function; can be called from a shim binary.
///
/// # Errors
///
/// Returns an error if the config cannot be loaded, or the selected command fails.
///
/// # Panics
///
/// Panics if the termination signal handler cannot be installed.
pub async fn inner_main(invocation: Cli) -> Result<()> {
    match invocation.command {
        Command::Service(args) => {
            init_tracing(args.log_format);
            let config = config::load(&args.config).await?;
            let span = tracing::info_span!(
                "agent",
                node = config.node.id,
                pid = process::id(),
                version = env!("CARGO_PKG_VERSION")
            );
            info!(parent: &span, config = %args.config, "Starting agent");
            run_service(config).instrument(span).await
        }
        Command::Probe { config } => {
            init_tracing(LogFormat::Compact);
            let config = config::load(&config).await?;
            let limit = Duration::from_secs(config.system.tool_timeout_secs);
            let radio = WpaCli::new(&config.radio, &config.scan.frequencies, limit);
            let net = IpTool::new(Tool::new(config.routing.command.clone(), limit));
            let summary = probe::probe(&config, &radio, &net).await?;
            print!("{summary}");
            Ok(())
        }
        Command::Sink(args) => {
            init_tracing(LogFormat::Compact);
            sink::run(&args.bind, args.port, Duration::from_secs(args.report_secs)).await
        }
    }
}

fn init_tracing(format: LogFormat) {
    INIT_TRACING.call_once(move || {
        let default_level = if env::var("LINKSHIFT_INTEGRATION_TEST").is_ok() {
            "error"
        } else {
            "info"
        };

        let builder = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
            )
            .with_timer(ChronoLocal::rfc_3339());

        match format {
            LogFormat::Compact => builder.compact().init(),
            LogFormat::Json => builder.json().init(),
            LogFormat::Pretty => builder.pretty().init(),
        }
    });
}

/// Builds the production controller from `config` and runs it until terminated.
async fn run_service(config: AgentConfig) -> Result<()> {
    let config = Arc::new(config);
    let destination = config
        .destination()
        .ok_or_else(|| eyre!("destination {} is not configured", config.node.destination))?;
    let limit = Duration::from_secs(config.system.tool_timeout_secs);

    let radio = Arc::new(WpaCli::new(&config.radio, &config.scan.frequencies, limit));
    let net = Arc::new(IpTool::new(Tool::new(config.routing.command.clone(), limit)));
    let redirector = Arc::new(RouteRedirector::new(
        Arc::clone(&net),
        config.gateways.clone(),
    ));
    let media = config
        .media
        .enabled
        .then(|| MediaPipeline::new(config.media.clone(), destination));
    let load = config.load.enabled.then(|| {
        Arc::new(LoadGenerator::new(
            Arc::clone(&net),
            config.load.clone(),
            destination,
            &config.interfaces.wired,
        ))
    });
    let streams = Arc::new(StreamSupervisor::new(
        Arc::clone(&redirector),
        destination,
        media,
        load,
    ));

    let shared = Arc::new(Shared::new(
        Attachment::wired(&config.interfaces.wired, None),
        Duration::from_secs(config.scan.cooldown_secs),
    ));
    let executor = Arc::new(HandoverExecutor::new(
        ExecutorSettings {
            access_points: config.access_points.clone(),
            interfaces: config.interfaces.clone(),
            destination,
            timing: config.handover.clone(),
        },
        Arc::clone(&shared),
        Arc::clone(&radio),
        net,
        Arc::clone(&streams),
        redirector,
    ));
    let scan = Arc::new(ScanLoop::new(
        Arc::clone(&shared),
        radio,
        config.scan.clone(),
    ));

    let server = &config.server;
    let connector = WsConnector::new(
        server.url.clone(),
        config.node.id,
        server.token.clone(),
        Duration::from_secs(server.connect_timeout_secs),
    );
    let (channel, inbound) = ControlChannel::new(
        connector,
        ChannelSettings {
            node_id: config.node.id,
            keepalive: Duration::from_secs(server.keepalive_secs),
            backoff_base: Duration::from_secs(server.backoff_base_secs),
            backoff_cap: Duration::from_secs(server.backoff_cap_secs),
        },
    );

    let controller = Arc::new(Controller::new(
        Arc::clone(&config),
        shared,
        executor,
        scan,
        channel,
    ));
    let mut tasks = controller
        .start(inbound)
        .await
        .wrap_err("Failed to bind streams to the wired interface")?;
    tasks.extend(streams.spawn_load());
    info!(url = %server.url, "Agent running");

    shutdown_signal().await;
    info!("Received shutdown, stopping");
    for task in &tasks {
        task.abort();
    }
    streams.shutdown().await;
    Ok(())
}

/// Resolves on SIGTERM or Ctrl-C.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to create SIGTERM signal handler");
        tokio::select! {
            _ = sigterm.recv() => {}
            res = signal::ctrl_c() => drop(res),
        }
    }
    #[cfg(not(unix))]
    {
        drop(signal::ctrl_c().await);
    }
}
