// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{Context, Result};
use car_damage_node::{
    api::{start_server, AppState},
    config::ServiceConfig,
    inference::{InferencePipeline, SnapshotStore},
    model::ModelLoader,
    monitoring::ServiceMetrics,
    vision::CascadePresenceFilter,
};
use std::{env, sync::Arc};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    println!("🚗 Starting Car Damage Node...\n");
    println!("📦 BUILD VERSION: {}", car_damage_node::version::VERSION);
    info!("{}", car_damage_node::version::get_version_string());
    println!();

    let config = ServiceConfig::from_env().context("invalid configuration")?;
    info!("Configuration: {:?}", config);

    // Load failures abort before the listener binds
    println!("🧠 Loading classifier from {}...", config.model_path.display());
    let loader = ModelLoader::new(config.loader_config());
    let model = loader
        .load(&config.model_path, Some(&config.classes_path))
        .with_context(|| format!("failed to load model from {}", config.model_path.display()))?;
    println!(
        "✅ Classifier ready: {} ({} classes)",
        model.architecture,
        model.labels.len()
    );

    // Cascade is read on first request
    let presence = CascadePresenceFilter::new(&config.cascade_path, config.detection_params())?;
    if !config.cascade_path.exists() {
        tracing::warn!(
            "Car cascade not found at {}; predictions will fail until it is provided",
            config.cascade_path.display()
        );
    }

    let pipeline = InferencePipeline::new(model, Arc::new(presence))
        .with_snapshots(SnapshotStore::new(&config.save_dir))
        .with_min_confidence(config.snapshot_min_confidence);

    let metrics = ServiceMetrics::new().context("failed to register metrics")?;
    let state = AppState::new(Arc::new(pipeline), metrics);

    println!("🌐 Serving on http://{}", config.bind_address());
    start_server(state, &config.bind_address()).await?;

    println!("👋 Car Damage Node stopped");
    Ok(())
}
