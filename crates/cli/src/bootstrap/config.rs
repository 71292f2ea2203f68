use ferrous_dns_domain::CoreConfig;
use tracing::info;

/// Load [`CoreConfig`] from an optional TOML file, falling back to defaults
/// for every field the file omits (`CoreConfig`'s `#[serde(default)]`
/// contract).
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<CoreConfig> {
    let config = match config_path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("reading config file {path}: {e}"))?;
            CoreConfig::from_toml_str(&text)?
        }
        None => CoreConfig::default(),
    };

    info!(
        config_file = config_path.unwrap_or("default"),
        cache_size = config.cache_size,
        ecs_cache_size = config.ecs_cache_size,
        use_ecs_cache = config.use_ecs_cache,
        "Configuration loaded"
    );

    Ok(config)
}
