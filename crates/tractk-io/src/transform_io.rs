use anyhow::{Context, Result};
use std::path::Path;
use tractk_core::transform::TransformRecord;

/// Write a transform record as pretty-printed JSON.
pub fn write_transform<P: AsRef<Path>>(path: P, record: &TransformRecord) -> Result<()> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(record).context("Failed to serialize transform")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write transform file {}", path.display()))?;
    tracing::debug!(path = %path.display(), "wrote transform");
    Ok(())
}

pub fn read_transform<P: AsRef<Path>>(path: P) -> Result<TransformRecord> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read transform file {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse transform file {}", path.display()))
}
