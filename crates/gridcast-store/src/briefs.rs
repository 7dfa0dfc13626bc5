//! Short-TTL live-brief cache on `Dragonfly` (Redis-compatible).
//!
//! Briefs are advisory news/market snippets attached to context packs.
//! The cache is never system of record: a cold cache just means packs
//! carry no briefs.

use fred::prelude::*;

use gridcast_types::{GameId, LiveBrief, MAX_LIVE_BRIEFS, RunId};

use crate::error::StoreError;

/// Default brief TTL in seconds.
const DEFAULT_BRIEF_TTL_SECS: i64 = 300;

/// Connection handle to the live-brief cache.
#[derive(Clone)]
pub struct BriefCache {
    client: Client,
    ttl_secs: i64,
}

impl BriefCache {
    /// Connect to the cache at the given Redis-scheme URL.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] if the URL cannot be parsed and
    /// [`StoreError::Cache`] if the connection fails.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let config = Config::from_url(url)
            .map_err(|e| StoreError::Config(format!("invalid cache URL: {e}")))?;
        let client = Builder::from_config(config).build()?;
        client.init().await?;

        tracing::info!("connected to live-brief cache");
        Ok(Self {
            client,
            ttl_secs: DEFAULT_BRIEF_TTL_SECS,
        })
    }

    /// Override the brief TTL.
    #[must_use]
    pub const fn with_ttl_secs(mut self, ttl_secs: i64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    fn key(run_id: &RunId, game_id: &GameId) -> String {
        format!("briefs:{run_id}:{game_id}")
    }

    /// Push a brief for a game, trimming the list to the pack limit.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Cache`] if the write fails.
    pub async fn push(
        &self,
        run_id: &RunId,
        game_id: &GameId,
        brief: &LiveBrief,
    ) -> Result<(), StoreError> {
        let key = Self::key(run_id, game_id);
        let json = serde_json::to_string(brief)?;

        let _: () = self.client.lpush(&key, json.as_str()).await?;
        let _: () = self
            .client
            .ltrim(&key, 0, i64::try_from(MAX_LIVE_BRIEFS).unwrap_or(8).saturating_sub(1))
            .await?;
        let _: () = self.client.expire(&key, self.ttl_secs, None).await?;
        Ok(())
    }

    /// Read up to [`MAX_LIVE_BRIEFS`] briefs for a game, newest first.
    ///
    /// A cold or unreachable key yields an empty list, not an error,
    /// because briefs are advisory.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Cache`] only on transport failure.
    pub async fn fetch(
        &self,
        run_id: &RunId,
        game_id: &GameId,
    ) -> Result<Vec<LiveBrief>, StoreError> {
        let key = Self::key(run_id, game_id);
        let raw: Vec<String> = self
            .client
            .lrange(&key, 0, i64::try_from(MAX_LIVE_BRIEFS).unwrap_or(8).saturating_sub(1))
            .await?;

        let briefs = raw
            .iter()
            .filter_map(|json| serde_json::from_str(json).ok())
            .collect();
        Ok(briefs)
    }
}
