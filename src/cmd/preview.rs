//! Plain-text preview command: `issuelink preview`.

use std::path::PathBuf;

use anyhow::{Context, Result};

use issuelink::document::preview;

pub fn cmd_preview(files: &[PathBuf]) -> Result<()> {
    for file in files {
        let markup = std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        println!("{}", preview(&markup));
    }
    Ok(())
}
