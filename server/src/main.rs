use clap::Parser;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;

use theatre_server::config::{generate_config_template, Cli, Config};
use theatre_server::stats::{self, Aggregator};
use theatre_server::{routes, state, theatre, ws};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Handle --generate-config: print template and exit
    if cli.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load(&cli)?;

    // Initialize tracing/logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("theatre_server=info"));
    if config.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(env_filter).init();
    }

    tracing::info!("Theatre server v{} starting", env!("CARGO_PKG_VERSION"));

    // Activity flows from the replay producer to the aggregator over this channel
    let (events_tx, events_rx) = stats::event_channel();

    // Load the repertoire; without plays there is nothing to stage
    let (theatre, plays) = theatre::load_plays(Path::new(&config.plays_path), events_tx)?;
    tracing::info!(
        plays = plays.len(),
        members = theatre.member_count(),
        path = %config.plays_path,
        "Repertoire loaded"
    );
    let theatre = Arc::new(theatre);

    let connections = ws::new_connection_registry();

    stats::spawn_aggregator(
        Aggregator::new(config.stats.top_n, config.stats.window()),
        events_rx,
        connections.clone(),
        config.stats.tick_interval(),
    );

    theatre::spawn_replay(theatre.clone(), plays, config.replay.line_interval());

    let app_state = state::AppState {
        theatre,
        connections,
        outbox_capacity: config.connections.outbox_capacity,
        write_timeout: config.connections.write_timeout(),
    };

    let app = routes::build_router(app_state);

    // Bind and serve
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
