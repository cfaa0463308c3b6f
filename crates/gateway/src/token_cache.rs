// =============================================================================
// TokenCache — venue bearer token cached on a persistent volume so a process
// restart reuses the existing token instead of burning the venue's
// token-issuance rate limit. Rotation only happens within 5 minutes of
// expiry (spec §4.1).
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

const ROTATE_WITHIN: chrono::Duration = chrono::Duration::minutes(5);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    pub fn needs_rotation(&self) -> bool {
        Utc::now() + ROTATE_WITHIN >= self.expires_at
    }

    /// Load the cached token from `path`, if present and well-formed.
    /// A missing or corrupt file is not an error — the caller falls back to
    /// issuing a fresh token.
    pub fn load(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str::<Self>(&content) {
            Ok(cached) => {
                info!(path = %path.display(), expires_at = %cached.expires_at, "loaded cached venue token");
                Some(cached)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cached token file is corrupt, ignoring");
                None
            }
        }
    }

    /// Persist via write-to-tmp-then-rename so a crash mid-write never
    /// leaves a half-written token file behind.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create token cache dir {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self).context("failed to serialize cached token")?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp token cache to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp token cache to {}", path.display()))?;
        info!(path = %path.display(), "venue token cached (atomic)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_disk() {
        let dir = std::env::temp_dir().join(format!("gateway-token-test-{}", uuid::Uuid::new_v4()));
        let path = dir.join("token.json");
        let token = CachedToken {
            token: "abc123".to_string(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        };
        token.save(&path).unwrap();
        let loaded = CachedToken::load(&path).unwrap();
        assert_eq!(loaded.token, "abc123");
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn missing_file_returns_none() {
        assert!(CachedToken::load("/nonexistent/path/token.json").is_none());
    }

    #[test]
    fn needs_rotation_within_five_minutes_of_expiry() {
        let token = CachedToken {
            token: "x".to_string(),
            expires_at: Utc::now() + chrono::Duration::minutes(4),
        };
        assert!(token.needs_rotation());

        let token = CachedToken {
            token: "x".to_string(),
            expires_at: Utc::now() + chrono::Duration::minutes(30),
        };
        assert!(!token.needs_rotation());
    }
}
