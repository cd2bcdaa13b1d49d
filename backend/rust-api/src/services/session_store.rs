use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;

use crate::metrics::{record_cache_hit, record_cache_miss, track_cache_operation};
use crate::models::QuizData;

/// Key of the single active quiz record of a user.
pub fn session_key(user_id: &str) -> String {
    format!("quiz:session:{}", user_id)
}

/// Per-player storage of the quiz record. Expiry of stored records is up to
/// the store; the quiz itself only looks at `QuizData::timestamp`.
#[async_trait]
pub trait QuizSessionStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<QuizData>>;

    async fn save(&self, key: &str, data: &QuizData, ttl_seconds: u64) -> Result<()>;

    async fn ping(&self) -> Result<()>;
}

pub struct RedisSessionStore {
    redis: ConnectionManager,
}

impl RedisSessionStore {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl QuizSessionStore for RedisSessionStore {
    async fn load(&self, key: &str) -> Result<Option<QuizData>> {
        let mut conn = self.redis.clone();

        let json: Option<String> = track_cache_operation("get", async {
            redis::cmd("GET")
                .arg(key)
                .query_async(&mut conn)
                .await
                .context("Failed to get quiz session from Redis")
        })
        .await?;

        match json {
            Some(json) => {
                record_cache_hit();
                let data = serde_json::from_str(&json)
                    .with_context(|| format!("Failed to parse quiz session {}", key))?;
                Ok(Some(data))
            }
            None => {
                record_cache_miss();
                Ok(None)
            }
        }
    }

    async fn save(&self, key: &str, data: &QuizData, ttl_seconds: u64) -> Result<()> {
        let mut conn = self.redis.clone();
        let json = serde_json::to_string(data)?;

        track_cache_operation("setex", async {
            redis::cmd("SETEX")
                .arg(key)
                .arg(ttl_seconds)
                .arg(json)
                .query_async::<()>(&mut conn)
                .await
                .context("Failed to save quiz session to Redis")
        })
        .await
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.redis.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .context("Redis ping failed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_key_is_scoped_to_the_user() {
        assert_eq!(session_key("u-17"), "quiz:session:u-17");
        assert_ne!(session_key("a"), session_key("b"));
    }
}
