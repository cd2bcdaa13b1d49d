use crate::config::Config;
use mongodb::Client as MongoClient;
use redis::aio::ConnectionManager;
use std::sync::Arc;

use session_store::{QuizSessionStore, RedisSessionStore};
use topic_store::{MongoTopicStore, TopicStore};

pub struct AppState {
    pub config: Config,
    pub topics: Arc<dyn TopicStore>,
    pub sessions: Arc<dyn QuizSessionStore>,
}

impl AppState {
    pub async fn new(
        config: Config,
        mongo_client: MongoClient,
        redis_client: redis::Client,
    ) -> anyhow::Result<Self> {
        let mongo = mongo_client.database(&config.mongo_database);

        tracing::info!("Attempting to connect to Redis...");

        let redis = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            ConnectionManager::new(redis_client),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

        let sessions = RedisSessionStore::new(redis);
        tokio::time::timeout(std::time::Duration::from_secs(5), sessions.ping())
            .await
            .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

        tracing::info!("Redis connection established successfully");

        Ok(Self::with_stores(
            config,
            Arc::new(MongoTopicStore::new(mongo)),
            Arc::new(sessions),
        ))
    }

    pub fn with_stores(
        config: Config,
        topics: Arc<dyn TopicStore>,
        sessions: Arc<dyn QuizSessionStore>,
    ) -> Self {
        Self {
            config,
            topics,
            sessions,
        }
    }
}

pub mod question_generator;
pub mod quiz_service;
pub mod quiz_state;
pub mod ranking_service;
pub mod scoring;
pub mod session_store;
pub mod topic_store;
