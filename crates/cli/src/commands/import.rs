//! `bluechat import`: Convert the Bluebook markdown into the knowledge document.

use bluechat_knowledge::{SECTION_START_MARKER, parse_bluebook_markdown};
use std::path::Path;

pub async fn run(
    config_path: Option<&Path>,
    input: &Path,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let output = match output {
        Some(path) => path.to_path_buf(),
        None => super::load_config(config_path)?.knowledge.path,
    };

    let markdown = std::fs::read_to_string(input)
        .map_err(|e| format!("Failed to read {}: {e}", input.display()))?;
    let entries = parse_bluebook_markdown(&markdown);

    if entries.is_empty() {
        return Err(format!(
            "No sections found in {} (expected the \"{SECTION_START_MARKER}\" chapter)",
            input.display()
        )
        .into());
    }

    if let Some(dir) = output.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(&output, serde_json::to_string_pretty(&entries)?)?;

    println!("✅ Imported {} entries into {}", entries.len(), output.display());
    Ok(())
}
