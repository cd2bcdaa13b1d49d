#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::{NaiveDate, Utc};
use jahreszahlen_api::{
    config::Config,
    create_router,
    middlewares::auth::{JwtClaims, JwtService},
    models::{Event, QuizData, Score, Topic},
    services::{session_store::QuizSessionStore, topic_store::TopicStore, AppState},
};
use mongodb::bson::oid::ObjectId;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

pub const CSRF_TOKEN: &str = "test-csrf-token";

#[derive(Default)]
pub struct InMemoryTopicStore {
    topics: Mutex<HashMap<String, Topic>>,
    scores: Mutex<Vec<Score>>,
    fail_score_writes: Mutex<bool>,
}

impl InMemoryTopicStore {
    pub fn insert_topic(&self, topic: Topic) {
        self.topics.lock().unwrap().insert(topic.id.clone(), topic);
    }

    pub fn insert_score(&self, topic_id: &str, user_id: &str, points: i32) {
        self.scores.lock().unwrap().push(Score {
            topic_id: topic_id.to_string(),
            user_id: user_id.to_string(),
            points,
            date: Utc::now(),
        });
    }

    pub fn scores(&self) -> Vec<Score> {
        self.scores.lock().unwrap().clone()
    }

    pub fn fail_score_writes(&self, fail: bool) {
        *self.fail_score_writes.lock().unwrap() = fail;
    }
}

#[async_trait]
impl TopicStore for InMemoryTopicStore {
    async fn get_topic(&self, topic_id: &str) -> Result<Option<Topic>> {
        Ok(self.topics.lock().unwrap().get(topic_id).cloned())
    }

    async fn get_scores_by_topic(&self, topic_id: &str) -> Result<Vec<Score>> {
        let mut scores: Vec<Score> = self
            .scores
            .lock()
            .unwrap()
            .iter()
            .filter(|score| score.topic_id == topic_id)
            .cloned()
            .collect();
        scores.sort_by(|a, b| b.points.cmp(&a.points));
        Ok(scores)
    }

    async fn create_score(&self, score: &Score) -> Result<()> {
        if *self.fail_score_writes.lock().unwrap() {
            return Err(anyhow!("score collection unavailable"));
        }
        self.scores.lock().unwrap().push(score.clone());
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemorySessionStore {
    records: Mutex<HashMap<String, QuizData>>,
    fail_writes: Mutex<bool>,
}

impl InMemorySessionStore {
    pub fn get(&self, user_id: &str) -> Option<QuizData> {
        self.records
            .lock()
            .unwrap()
            .get(&format!("quiz:session:{}", user_id))
            .cloned()
    }

    pub fn put(&self, user_id: &str, data: QuizData) {
        self.records
            .lock()
            .unwrap()
            .insert(format!("quiz:session:{}", user_id), data);
    }

    pub fn fail_writes(&self, fail: bool) {
        *self.fail_writes.lock().unwrap() = fail;
    }
}

#[async_trait]
impl QuizSessionStore for InMemorySessionStore {
    async fn load(&self, key: &str) -> Result<Option<QuizData>> {
        Ok(self.records.lock().unwrap().get(key).cloned())
    }

    async fn save(&self, key: &str, data: &QuizData, _ttl_seconds: u64) -> Result<()> {
        if *self.fail_writes.lock().unwrap() {
            return Err(anyhow!("session store unavailable"));
        }
        self.records
            .lock()
            .unwrap()
            .insert(key.to_string(), data.clone());
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub config: Config,
    pub topics: Arc<InMemoryTopicStore>,
    pub sessions: Arc<InMemorySessionStore>,
}

pub fn create_test_app() -> TestApp {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let config = Config::for_tests();
    let topics = Arc::new(InMemoryTopicStore::default());
    let sessions = Arc::new(InMemorySessionStore::default());

    let app_state = Arc::new(AppState::with_stores(
        config.clone(),
        topics.clone(),
        sessions.clone(),
    ));

    TestApp {
        router: create_router(app_state),
        config,
        topics,
        sessions,
    }
}

/// Topic with `events` events, one every 25 years from 1500 on.
pub fn sample_topic(events: usize) -> Topic {
    Topic {
        id: ObjectId::new().to_hex(),
        name: "Schweizer Geschichte".to_string(),
        events: (0..events)
            .map(|i| {
                Event::new(
                    ObjectId::new().to_hex(),
                    format!("Ereignis {}", i),
                    NaiveDate::from_ymd_opt(1500 + 25 * i as i32, 1 + i as u32 % 12, 1).unwrap(),
                )
            })
            .collect(),
    }
}

impl TestApp {
    pub fn seed_topic(&self, events: usize) -> Topic {
        let topic = sample_topic(events);
        self.topics.insert_topic(topic.clone());
        topic
    }

    pub fn token(&self, user_id: &str) -> String {
        JwtService::new(&self.config.jwt_secret)
            .generate_token(&JwtClaims::player(user_id, 3600))
            .unwrap()
    }

    /// Sends an authenticated request with a valid CSRF token pair.
    pub async fn call(
        &self,
        method: &str,
        user_id: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", format!("Bearer {}", self.token(user_id)))
            .header("x-csrf-token", CSRF_TOKEN)
            .header("cookie", format!("csrf_token={}", CSRF_TOKEN))
            .header("content-type", "application/json")
            .body(match body {
                Some(body) => Body::from(body.to_string()),
                None => Body::empty(),
            })
            .unwrap();

        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&body).into_owned())
            })
        };
        (status, json)
    }
}

pub fn quiz_uri(topic_id: &str, path: &str) -> String {
    format!("/api/v1/topics/{}/quiz/{}", topic_id, path)
}
