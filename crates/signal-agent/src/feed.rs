use std::path::{Path, PathBuf};

use analysis_core::{AnalysisError, Candle, CandleSource, Timeframe};
use async_trait::async_trait;

/// Reads `<dir>/<ASSET>.json` (a JSON array of candles) as a price feed.
pub struct FileCandleSource {
    dir: PathBuf,
}

impl FileCandleSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, asset: &str) -> PathBuf {
        self.dir.join(format!("{asset}.json"))
    }

    /// Parse one candle file, keeping the last `limit` candles.
    pub async fn read_file(path: &Path, limit: usize) -> Result<Vec<Candle>, AnalysisError> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            AnalysisError::InvalidData(format!("cannot read {}: {e}", path.display()))
        })?;
        let mut candles: Vec<Candle> = serde_json::from_str(&raw).map_err(|e| {
            AnalysisError::InvalidData(format!("{} is not a candle array: {e}", path.display()))
        })?;
        let skip = candles.len().saturating_sub(limit);
        candles.drain(..skip);
        Ok(candles)
    }
}

#[async_trait]
impl CandleSource for FileCandleSource {
    async fn candles(
        &self,
        asset: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Option<Vec<Candle>>, AnalysisError> {
        let path = self.path_for(asset);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(None);
        }
        tracing::debug!(asset, ?timeframe, path = %path.display(), "reading candles");
        Self::read_file(&path, limit).await.map(Some)
    }
}
