// src/main.rs - Dashboard printer link: status poller plus command API
use clap::Parser;
use std::str::FromStr;
use std::sync::Arc;

use printer_dash::config;
use printer_dash::status::{HttpStatusTransport, StatusPoller};
use printer_dash::web::api::{create_router, AppStateInner};
use printer_dash::TracingEventSink;

#[derive(Debug, Parser)]
#[command(name = "printer-dash", version, about = "Printer status poller and control-session API")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "printer.toml")]
    config: String,

    /// Address for the HTTP API, overriding [web].bind
    #[arg(long)]
    bind: Option<String>,

    /// Log level, overriding [logging].level
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let args = Args::parse();

    let config = config::load_config(&args.config).map_err(|e| {
        eprintln!("Failed to load config from '{}': {}", args.config, e);
        Box::new(e) as Box<dyn std::error::Error + Send + Sync + 'static>
    })?;

    // Initialize logging
    let level_name = args.log_level.as_deref().unwrap_or(&config.logging.level);
    let level = tracing::Level::from_str(level_name).unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();

    tracing::info!("Starting printer-dash {}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Printer: {} (control port {}, status port {})",
        config.printer.host,
        config.printer.control_port,
        config.printer.status_port
    );

    let state = Arc::new(AppStateInner::new(
        config.printer.host.clone(),
        config.printer.control_port,
        config.session.to_session_config(),
    ));

    let transport = HttpStatusTransport::from_config(&config.printer)?;
    let mut poller = StatusPoller::new(
        Arc::new(transport),
        Arc::new(TracingEventSink),
        config.poller.to_poller_config(),
    );
    let status_state = state.clone();
    poller.start(config.poller.interval(), move |status| {
        if !status.is_connected {
            tracing::debug!("Printer offline: {}", status.error.as_deref().unwrap_or("unknown"));
        }
        status_state.publish_status(status);
    });

    let app = create_router(state);
    let bind = args.bind.unwrap_or(config.web.bind);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!("Web API listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    poller.stop();
    tracing::info!("Shut down");
    Ok(())
}
