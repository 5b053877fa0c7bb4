//! Check-config command - validates configuration without serving

use anyhow::Context;

use crate::config::AppConfig;

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    config.validate()?;

    println!(
        "Configuration OK: upstream={} cache={} embedding={} vector={} threshold={}",
        config.server.upstream_url,
        config.cache.cache_type,
        config.embedding.provider_type,
        config.vector.store_type,
        config.semantic_cache.similarity_threshold
    );

    Ok(())
}
