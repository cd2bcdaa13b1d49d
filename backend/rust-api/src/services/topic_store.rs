use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::{Collection, Database};

use crate::metrics::track_db_operation;
use crate::models::topic::{ScoreRecord, TopicRecord};
use crate::models::{Score, Topic};

/// Read access to topics and read/write access to the scores per topic.
#[async_trait]
pub trait TopicStore: Send + Sync {
    async fn get_topic(&self, topic_id: &str) -> Result<Option<Topic>>;

    /// Earlier scores of the topic, sorted by points descending.
    async fn get_scores_by_topic(&self, topic_id: &str) -> Result<Vec<Score>>;

    async fn create_score(&self, score: &Score) -> Result<()>;

    async fn ping(&self) -> Result<()>;
}

pub struct MongoTopicStore {
    mongo: Database,
}

impl MongoTopicStore {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    fn topics(&self) -> Collection<TopicRecord> {
        self.mongo.collection("topics")
    }

    fn scores(&self) -> Collection<ScoreRecord> {
        self.mongo.collection("scores")
    }
}

#[async_trait]
impl TopicStore for MongoTopicStore {
    async fn get_topic(&self, topic_id: &str) -> Result<Option<Topic>> {
        let Ok(object_id) = ObjectId::parse_str(topic_id) else {
            tracing::debug!("Topic id {} is not an ObjectId", topic_id);
            return Ok(None);
        };

        let collection = self.topics();
        let record = track_db_operation("find_one", "topics", async {
            collection
                .find_one(doc! { "_id": object_id })
                .await
                .context("Failed to fetch topic")
        })
        .await?;

        Ok(record.map(Topic::from))
    }

    async fn get_scores_by_topic(&self, topic_id: &str) -> Result<Vec<Score>> {
        let Ok(object_id) = ObjectId::parse_str(topic_id) else {
            return Ok(Vec::new());
        };

        let collection = self.scores();
        let records: Vec<ScoreRecord> = track_db_operation("find", "scores", async {
            let cursor = collection
                .find(doc! { "topic_id": object_id })
                .sort(doc! { "points": -1 })
                .await
                .context("Failed to query scores")?;

            cursor
                .try_collect()
                .await
                .context("Failed to iterate scores")
        })
        .await?;

        Ok(records.into_iter().map(Score::from).collect())
    }

    async fn create_score(&self, score: &Score) -> Result<()> {
        let topic_id = ObjectId::parse_str(&score.topic_id).context("Invalid topic ID format")?;
        let record = ScoreRecord {
            id: ObjectId::new(),
            topic_id,
            user_id: score.user_id.clone(),
            points: score.points,
            date: mongodb::bson::DateTime::from_millis(score.date.timestamp_millis()),
        };

        let collection = self.scores();
        track_db_operation("insert_one", "scores", async {
            collection
                .insert_one(&record)
                .await
                .map(|_| ())
                .context("Failed to save score")
        })
        .await?;

        tracing::info!(
            "Score saved: id={}, topic={}, user={}, points={}",
            record.id,
            score.topic_id,
            score.user_id,
            score.points
        );
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.mongo
            .run_command(doc! { "ping": 1 })
            .await
            .map(|_| ())
            .context("MongoDB ping failed")
    }
}
