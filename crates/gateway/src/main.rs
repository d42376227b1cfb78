use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig as _;

use tp_domain::config::ObservabilityConfig;
use tp_gateway::bootstrap;
use tp_gateway::cli::{Cli, Command, ConfigCommand};
use tp_gateway::state::AppState;

const DEFAULT_FILTER: &str = "info,tp_gateway=debug,tp_mcp_client=debug";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Default to serve when no subcommand is given.
        None | Some(Command::Serve) => {
            let (config, config_path) = tp_gateway::cli::load_config()?;
            let tracer_provider = init_tracing(&config.observability);
            let state = bootstrap::build_app_state(Arc::new(config), config_path).await?;
            serve(state, tracer_provider).await
        }
        Some(Command::Tools { json }) => {
            init_cli_tracing();
            with_state(|state| async move {
                tp_gateway::cli::tools::list(&state, json).await
            })
            .await
        }
        Some(Command::Call { tool, args }) => {
            init_cli_tracing();
            with_state(|state| async move {
                tp_gateway::cli::tools::call(&state, &tool, &args).await
            })
            .await
        }
        Some(Command::Agents) => {
            init_cli_tracing();
            with_state(|state| async move { tp_gateway::cli::agents::list(&state).await }).await
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, config_path) = tp_gateway::cli::load_config()?;
            if !tp_gateway::cli::config::validate(&config, &config_path) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _config_path) = tp_gateway::cli::load_config()?;
            tp_gateway::cli::config::show(&config)
        }
        Some(Command::Version) => {
            println!("toolport {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Boot, run a one-shot command, then disconnect whatever the outcome.
async fn with_state<F, Fut>(command: F) -> anyhow::Result<()>
where
    F: FnOnce(AppState) -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<()>>,
{
    let (config, config_path) = tp_gateway::cli::load_config()?;
    let state = bootstrap::build_app_state(Arc::new(config), config_path).await?;
    let result = command(state.clone()).await;
    bootstrap::shutdown(&state).await;
    result
}

/// Initialize structured JSON tracing (only for the `serve` command).
///
/// When `otlp_endpoint` is configured, an OpenTelemetry layer is added
/// so that every `tracing` span is also exported as an OTel span via
/// OTLP/gRPC. The returned [`SdkTracerProvider`] handle must be shut
/// down on exit to flush pending spans.
///
/// [`SdkTracerProvider`]: opentelemetry_sdk::trace::SdkTracerProvider
fn init_tracing(
    obs: &ObservabilityConfig,
) -> Option<opentelemetry_sdk::trace::SdkTracerProvider> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = tracing_subscriber::fmt::layer().json();

    let Some(endpoint) = &obs.otlp_endpoint else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();
        return None;
    };

    let exporter = match opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
    {
        Ok(e) => e,
        Err(e) => {
            eprintln!(
                "WARNING: failed to create OTLP exporter for {endpoint}: {e}; \
                 starting without OpenTelemetry"
            );
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .init();
            return None;
        }
    };

    let resource = opentelemetry_sdk::Resource::builder()
        .with_service_name(obs.service_name.clone())
        .build();

    let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_sampler(opentelemetry_sdk::trace::Sampler::TraceIdRatioBased(
            obs.sample_rate,
        ))
        .with_resource(resource)
        .build();

    let otel_layer =
        tracing_opentelemetry::layer().with_tracer(tracer_provider.tracer("toolport"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(otel_layer)
        .init();

    Some(tracer_provider)
}

/// Initialize compact stderr-only tracing for CLI one-shot commands.
///
/// Defaults to `warn` level so diagnostic output does not pollute stdout.
fn init_cli_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

/// Hold the primary providers open and supervised until a shutdown signal.
async fn serve(
    state: AppState,
    tracer_provider: Option<opentelemetry_sdk::trace::SdkTracerProvider>,
) -> anyhow::Result<()> {
    tracing::info!(config = %state.config_path.display(), "toolport starting");

    bootstrap::spawn_background_tasks(&state);
    match state.primary.tool_count().await {
        Ok(tools) => tracing::info!(tools, "primary tools discovered"),
        Err(e) => tracing::warn!(error = %e, kind = %e.kind, "initial tool discovery failed"),
    }

    shutdown_signal().await?;

    bootstrap::shutdown(&state).await;

    // Flush and shut down the OTel tracer provider so pending spans
    // are exported before the process exits.
    if let Some(provider) = tracer_provider {
        if let Err(e) = provider.shutdown() {
            tracing::warn!(error = ?e, "OpenTelemetry tracer provider shutdown failed");
        }
    }

    tracing::info!("shutdown complete");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() -> anyhow::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .map_err(|e| anyhow::anyhow!("registering SIGTERM handler: {e}"))?;

        tokio::select! {
            _ = ctrl_c => tracing::info!("received SIGINT, shutting down"),
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = ctrl_c.await {
            anyhow::bail!("waiting for ctrl-c: {e}");
        }
        tracing::info!("received SIGINT, shutting down");
    }

    Ok(())
}
