//! `bluechat doctor`: Diagnose system health.

use bluechat_config::{AppConfig, BackendKind};
use bluechat_knowledge::KnowledgeStore;
use std::path::Path;

pub async fn run(config_path: Option<&Path>, ping: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 BlueChat Doctor: System Diagnostics");
    println!("=======================================\n");

    let mut issues = 0;

    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(AppConfig::config_path);
    if !path.exists() {
        println!("  ⚠️  No config file at {}: using defaults", path.display());
    }

    let config = match super::load_config(config_path) {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  Fix the config before running other checks.");
            return Ok(());
        }
    };

    match config.backend.kind {
        BackendKind::Remote => {
            if config.has_api_key() {
                println!("  ✅ API key configured for {}", config.backend.remote.api_url);
            } else {
                println!("  ❌ No API key: export GROQ_API_KEY");
                issues += 1;
            }
        }
        BackendKind::Local => {
            if cfg!(feature = "local") {
                println!("  ✅ Local inference available ({})", config.backend.local.model);
            } else {
                println!("  ❌ Local backend selected but built without the `local` feature");
                issues += 1;
            }
        }
    }

    match KnowledgeStore::load(&config.knowledge.path) {
        Ok(store) if store.is_empty() => {
            println!("  ⚠️  Knowledge document is empty: {}", config.knowledge.path.display());
            issues += 1;
        }
        Ok(store) => println!("  ✅ Knowledge base: {} entries", store.len()),
        Err(e) => {
            println!("  ❌ Knowledge base unavailable: {e}");
            issues += 1;
        }
    }

    if ping {
        let built = {
            let config = config.clone();
            tokio::task::spawn_blocking(move || bluechat_providers::build_from_config(&config))
                .await?
        };
        match built {
            Ok(backend) => match backend.health_check().await {
                Ok(true) => println!("  ✅ Backend '{}' reachable", backend.name()),
                Ok(false) => {
                    println!("  ❌ Backend '{}' answered with an error", backend.name());
                    issues += 1;
                }
                Err(e) => {
                    println!("  ❌ Backend '{}' unreachable: {e}", backend.name());
                    issues += 1;
                }
            },
            Err(e) => {
                println!("  ❌ Backend could not be built: {e}");
                issues += 1;
            }
        }
    }

    // Summary
    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
