//! `bluechat serve`: Start the HTTP chat gateway.

use std::path::Path;

pub async fn run(
    config_path: Option<&Path>,
    port: Option<u16>,
    host: Option<String>,
    backend: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config =
        super::load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port {
        config.gateway.port = port;
    }
    if let Some(host) = host {
        config.gateway.host = host;
    }
    if let Some(kind) = backend {
        config.backend.kind = kind.parse()?;
    }
    config.validate()?;

    println!("💬 BlueChat Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Backend:   {}", config.backend.active_name());
    println!("   Knowledge: {}", config.knowledge.path.display());

    bluechat_gateway::start(config).await?;

    Ok(())
}
