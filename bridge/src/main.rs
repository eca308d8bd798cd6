//! Replays a recorded change scenario against an in-memory library.
//!
//! ```text
//! photokit-replay scenario.json
//! ```
//!
//! The scenario holds the album's native assets, the fetch parameters and a
//! list of steps. Each step may replace the native assets and then submits
//! one change. The asset list after every step is printed as a JSON line.

use std::sync::Arc;

use photokit_bridge::{BridgeConfig, MemoryBridge, PhotoLibrary};
use photokit_engine::{AlbumFetchParams, AssetFetchParams, ChangeDescriptor, Entry, RawRecord};
use serde::Deserialize;
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const REPLAY_ALBUM: &str = "replay";

#[derive(Debug, Deserialize)]
struct Scenario {
    #[serde(default)]
    params: AssetFetchParams,
    assets: Vec<RawRecord>,
    #[serde(default)]
    steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
struct Step {
    /// Native assets once the change happened
    #[serde(default)]
    assets: Option<Vec<RawRecord>>,
    /// Change body; `_cacheKey` defaults to the album's tracking key
    change: serde_json::Value,
}

fn emit(step: usize, result: &photokit_bridge::Result<Arc<Vec<Entry>>>) -> serde_json::Result<()> {
    let line = match result {
        Ok(assets) => json!({
            "step": step,
            "assets": assets.iter().map(Entry::local_identifier).collect::<Vec<_>>()
        }),
        Err(e) => json!({ "step": step, "error": e.to_string() }),
    };
    println!("{}", serde_json::to_string(&line)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let config = BridgeConfig::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let path = std::env::args()
        .nth(1)
        .ok_or("usage: photokit-replay <scenario.json>")?;
    let scenario: Scenario = serde_json::from_str(&std::fs::read_to_string(&path)?)?;

    tracing::info!(%path, steps = scenario.steps.len(), "Replaying scenario");

    let native = Arc::new(MemoryBridge::new());
    native.set_assets(Some(REPLAY_ALBUM), scenario.assets);
    native.set_albums(
        "album",
        vec![RawRecord::album(REPLAY_ALBUM, "album").with_field("title", "Replay")],
    );

    let library = PhotoLibrary::new(native.clone(), config)?;
    let albums = library
        .get_albums(AlbumFetchParams::of_type("album"))
        .await?;
    let album = albums
        .albums()
        .first()
        .cloned()
        .ok_or("replay album missing")?;

    let initial = album.get_assets(scenario.params.tracked()).await?;
    emit(0, &Ok(initial.assets))?;
    let key = album.tracking_key().ok_or("replay album is not tracked")?;

    for (index, step) in scenario.steps.into_iter().enumerate() {
        if let Some(assets) = step.assets {
            native.set_assets(Some(REPLAY_ALBUM), assets);
        }

        let mut body = step.change;
        if let Some(fields) = body.as_object_mut() {
            fields
                .entry("_cacheKey")
                .or_insert_with(|| key.as_str().into());
        }
        let change: ChangeDescriptor = serde_json::from_value(body)?;

        let result = album.submit_change(change).await;
        emit(index + 1, &result)?;
    }

    let status = album.stop_tracking().await?;
    tracing::info!(status = %status.status, "Replay finished");

    Ok(())
}
