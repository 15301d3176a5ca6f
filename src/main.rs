use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;

use gatewait::backend;
use gatewait::config::{BackendArgs, Cli, Command, GatewayArgs, LoadArgs, StandaloneArgs};
use gatewait::gateway::{self, EngineKind, RoutingEngine};
use gatewait::loadgen::LoadRunner;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log_level.to_lowercase()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    match cli.command {
        Command::Backend(args) => run_backend(args).await,
        Command::Gateway(args) => run_gateway(args).await,
        Command::Load(args) => run_load(args).await,
        Command::Standalone(args) => run_standalone(args).await,
    }
}

/// Serve the delay simulator until interrupted.
async fn run_backend(args: BackendArgs) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let app = backend::routes(shutdown_rx);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Delay backend listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Flip the flag so in-flight waits fail as Interrupted instead
            // of completing after the listener is gone
            let _ = shutdown_tx.send(true);
        })
        .await?;

    tracing::info!("Backend shutdown complete");
    Ok(())
}

/// Serve the forwarding gateway with the selected engine until interrupted.
async fn run_gateway(args: GatewayArgs) -> Result<()> {
    let kind: EngineKind = args
        .engine
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    let client = downstream_client(args.connect_timeout, args.request_timeout)?;
    let engine = Arc::new(RoutingEngine::new(
        kind,
        client,
        args.backend_url.clone(),
        args.workers,
    ));
    let app = gateway::routes(engine);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(
        "Gateway ({}) listening on http://{}, forwarding to {}",
        kind,
        addr,
        args.backend_url
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Gateway shutdown complete");
    Ok(())
}

/// Run the staged load plan against an external target. The exit status
/// carries the verdict: non-zero when any threshold is violated.
async fn run_load(args: LoadArgs) -> Result<()> {
    let json = args.json;
    let plan = args.to_plan()?;
    let result = LoadRunner::new(plan)?.run().await;

    if json {
        println!("{}", result.to_json());
    } else {
        result.print_report();
    }

    if !result.passed {
        std::process::exit(1);
    }
    Ok(())
}

/// Boot the backend and the chosen gateway on ephemeral local ports, then
/// run the load plan against the gateway.
async fn run_standalone(args: StandaloneArgs) -> Result<()> {
    let kind: EngineKind = args
        .engine
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    // Backend
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let backend_listener = TcpListener::bind("127.0.0.1:0").await?;
    let backend_url = format!("http://{}", backend_listener.local_addr()?);
    let backend_app = backend::routes(shutdown_rx);
    tokio::spawn(async move {
        axum::serve(backend_listener, backend_app).await.ok();
    });

    // Gateway in front of it
    let client = downstream_client(10, 300)?;
    let engine = Arc::new(RoutingEngine::new(
        kind,
        client,
        backend_url.clone(),
        args.workers,
    ));
    let gateway_listener = TcpListener::bind("127.0.0.1:0").await?;
    let gateway_url = format!("http://{}", gateway_listener.local_addr()?);
    let gateway_app = gateway::routes(engine);
    tokio::spawn(async move {
        axum::serve(gateway_listener, gateway_app).await.ok();
    });

    tracing::info!(
        "Standalone: backend at {}, gateway ({}) at {}",
        backend_url,
        kind,
        gateway_url
    );

    let json = args.json;
    let plan = args.to_plan(gateway_url)?;
    let result = LoadRunner::new(plan)?.run().await;

    let _ = shutdown_tx.send(true);

    if json {
        println!("{}", result.to_json());
    } else {
        result.print_report();
    }

    if !result.passed {
        std::process::exit(1);
    }
    Ok(())
}

/// HTTP client used for gateway-to-backend forwarding
fn downstream_client(connect_timeout: u64, request_timeout: u64) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(connect_timeout))
        .timeout(Duration::from_secs(request_timeout))
        .pool_max_idle_per_host(500)
        .build()?;
    Ok(client)
}

/// Handle graceful shutdown signal
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown...");
        },
    }
}
