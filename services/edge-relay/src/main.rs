use std::sync::Arc;

use anyhow::Context;
use clienthog_core::logging;
use clienthog_edge::{
    control, FrameDispatcher, IngestLoop, SourceAllowList, TrackedEntityStore, UdpFogTransport,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

mod config;

use config::RelayConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = RelayConfig::from_env().context("invalid relay configuration")?;
    logging::init_with_format(config.log_format)?;

    if config.used_defaults {
        warn!("Environment variables not initialized correctly, using default values");
    }
    info!(
        device_id = %config.device_id,
        camera = %config.camera_addr,
        fog_node = %config.fog_addr,
        control = %config.control_addr,
        tracked = ?config.initial_entities,
        policy = %config.unmatched_policy,
        extractor = %config.extractor,
        "Starting edge relay"
    );

    let store = Arc::new(TrackedEntityStore::new(config.initial_entities.clone()));

    let transport = UdpFogTransport::connect(&config.fog_addr)
        .await
        .with_context(|| format!("cannot reach fog node address {}", config.fog_addr))?;
    let mut dispatcher = FrameDispatcher::new(config.device_id, Arc::new(transport))
        .with_extractor(config.extractor.build())
        .with_unmatched_policy(config.unmatched_policy)
        .with_forward_timeout(config.forward_timeout);
    if let Some(limit) = config.max_in_flight {
        dispatcher = dispatcher.with_max_in_flight(limit);
    }

    let ingest = IngestLoop::bind(
        &config.camera_addr,
        Arc::new(SourceAllowList::new(config.approved_sources.clone())),
        Arc::clone(&store),
        Arc::new(dispatcher),
    )
    .await?;
    info!("Server started successfully: {}", config.camera_addr);

    let listener = TcpListener::bind(&config.control_addr)
        .await
        .with_context(|| format!("cannot bind control endpoint on {}", config.control_addr))?;

    // Either task ending is fatal; the other one is dropped with its socket.
    tokio::select! {
        result = ingest.run() => {
            if let Err(e) = &result {
                error!(error = %e, "Ingest loop stopped");
            }
            result?;
        }
        result = control::serve(listener, store) => {
            if let Err(e) = &result {
                error!(error = %e, "Control endpoint stopped");
            }
            result?;
        }
    }

    anyhow::bail!("relay task exited unexpectedly")
}
