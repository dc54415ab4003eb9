//! `bluechat onboard`: Write a default config file.

use bluechat_config::AppConfig;
use std::path::Path;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(AppConfig::config_path);

    println!("💬 BlueChat: First-Time Setup");
    println!("==============================\n");

    if let Some(dir) = config_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if !dir.exists() {
            std::fs::create_dir_all(dir)?;
            println!("✅ Created config directory: {}", dir.display());
        }
    }

    if config_path.exists() {
        println!("⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("✅ Created config.toml at: {}", config_path.display());
    println!("\n📝 Next steps:");
    println!("   1. Export GROQ_API_KEY (the key is never stored in the file)");
    println!("   2. Run: bluechat import <bluebook.md>   (or place qa-data/bluebook.json)");
    println!("   3. Run: bluechat doctor");
    println!("   4. Run: bluechat serve\n");

    Ok(())
}
