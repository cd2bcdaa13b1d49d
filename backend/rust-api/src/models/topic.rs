use chrono::{DateTime, Datelike, NaiveDate, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

/// A dated historical event. `year` is denormalized from `date`: phases 1
/// and 2 only ever show the year, phase 3 orders by the full date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub name: String,
    pub year: i32,
    pub date: NaiveDate,
}

impl Event {
    pub fn new(id: impl Into<String>, name: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            year: date.year(),
            date,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub id: String,
    pub name: String,
    pub events: Vec<Event>,
}

impl Topic {
    pub fn events_count(&self) -> usize {
        self.events.len()
    }
}

/// Final result of one completed quiz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub topic_id: String,
    pub user_id: String,
    pub points: i32,
    pub date: DateTime<Utc>,
}

// MongoDB documents

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicRecord {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    #[serde(default)]
    pub events: Vec<EventRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRecord {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub topic_id: ObjectId,
    pub user_id: String,
    pub points: i32,
    pub date: mongodb::bson::DateTime,
}

impl From<TopicRecord> for Topic {
    fn from(record: TopicRecord) -> Self {
        Self {
            id: record.id.to_hex(),
            name: record.name,
            events: record.events.into_iter().map(Event::from).collect(),
        }
    }
}

impl From<EventRecord> for Event {
    fn from(record: EventRecord) -> Self {
        Event::new(record.id.to_hex(), record.name, record.date)
    }
}

impl From<ScoreRecord> for Score {
    fn from(record: ScoreRecord) -> Self {
        Self {
            topic_id: record.topic_id.to_hex(),
            user_id: record.user_id,
            points: record.points,
            date: DateTime::from_timestamp_millis(record.date.timestamp_millis())
                .unwrap_or_default(),
        }
    }
}
