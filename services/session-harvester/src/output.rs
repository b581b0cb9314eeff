//! Result artifact persistence

use std::path::Path;

use tracing::info;

use crate::error::{Error, Result};
use crate::orchestrator::CombinedResult;

/// Write the combined result as pretty-printed JSON, replacing the file.
pub async fn write_result(path: &Path, result: &CombinedResult) -> Result<()> {
    let output_error = |message: String| Error::Output {
        path: path.display().to_string(),
        message,
    };

    let json = serde_json::to_string_pretty(result)
        .map_err(|e| output_error(format!("serializing result: {e}")))?;
    tokio::fs::write(path, json.as_bytes())
        .await
        .map_err(|e| output_error(e.to_string()))?;

    info!(path = %path.display(), "all data saved");
    Ok(())
}
