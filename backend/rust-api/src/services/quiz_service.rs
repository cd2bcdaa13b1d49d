use chrono::Utc;
use rand::{rngs::StdRng, SeedableRng};
use std::sync::Arc;
use thiserror::Error;

use crate::config::QuizRules;
use crate::metrics::{
    QUIZ_FINAL_POINTS, QUIZ_POINTS_AWARDED_TOTAL, QUIZ_SCORES_RECORDED_TOTAL,
    QUIZ_TRANSITIONS_TOTAL, QUIZ_VALIDATION_FAILURES_TOTAL,
};
use crate::models::{PhaseReview, PhaseView, QuizData, QuizStep, QuizSummary, Score};

use super::quiz_state::{self, ValidationError};
use super::scoring::PhaseScore;
use super::session_store::{session_key, QuizSessionStore};
use super::topic_store::TopicStore;
use super::AppState;

#[derive(Debug, Error)]
pub enum QuizError {
    #[error("Ein Fehler ist aufgetreten in Phase {phase} des Quizzes. {reason}")]
    Validation { phase: u8, reason: ValidationError },

    #[error("Topic {0} not found")]
    NotFound(String),

    #[error("Quiz phase {0} does not exist")]
    UnknownPhase(u8),

    #[error("Storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

/// Runs quiz transitions for one player against the topic and session stores.
///
/// Each operation loads the player's record, applies a pure transition from
/// [`quiz_state`] and writes the result back only when the transition
/// succeeded. Read-only operations never write.
pub struct QuizService {
    topics: Arc<dyn TopicStore>,
    sessions: Arc<dyn QuizSessionStore>,
    rules: QuizRules,
    session_ttl_seconds: u64,
}

impl QuizService {
    pub fn new(
        topics: Arc<dyn TopicStore>,
        sessions: Arc<dyn QuizSessionStore>,
        rules: QuizRules,
        session_ttl_seconds: u64,
    ) -> Self {
        Self {
            topics,
            sessions,
            rules,
            session_ttl_seconds,
        }
    }

    pub fn from_state(state: &AppState) -> Self {
        Self::new(
            state.topics.clone(),
            state.sessions.clone(),
            state.config.quiz.clone(),
            state.config.session_ttl_seconds,
        )
    }

    /// Starts phase 1, replacing any quiz the player had in progress.
    pub async fn start_phase1(&self, user_id: &str, topic_id: &str) -> Result<PhaseView, QuizError> {
        let topic = self
            .topics
            .get_topic(topic_id)
            .await?
            .ok_or_else(|| QuizError::NotFound(topic_id.to_string()))?;

        let data = {
            let mut rng = StdRng::from_os_rng();
            quiz_state::start(&topic, &self.rules, &mut rng, Utc::now())
        }
        .map_err(|reason| self.rejected(user_id, topic_id, QuizStep::PreparedPhase1, reason))?;

        self.store(user_id, &data).await?;
        self.transitioned(user_id, &data);

        self.view(user_id, &data)
    }

    pub async fn submit_phase1(
        &self,
        user_id: &str,
        topic_id: &str,
        answers: &[Option<i32>],
    ) -> Result<PhaseReview, QuizError> {
        let record = self.load(user_id).await?;
        let (data, score) =
            quiz_state::submit_phase1(record, topic_id, answers, &self.rules, Utc::now())
                .map_err(|reason| {
                    self.rejected(user_id, topic_id, QuizStep::PreparedPhase1, reason)
                })?;

        self.store(user_id, &data).await?;
        self.awarded(user_id, &data, score);

        self.review(user_id, &data)
    }

    pub async fn prepare_phase2(&self, user_id: &str, topic_id: &str) -> Result<PhaseView, QuizError> {
        let record = self.load(user_id).await?;
        let data = quiz_state::prepare_phase2(record, topic_id, &self.rules, Utc::now())
            .map_err(|reason| self.rejected(user_id, topic_id, QuizStep::SubmittedPhase1, reason))?;

        self.store(user_id, &data).await?;
        self.transitioned(user_id, &data);

        self.view(user_id, &data)
    }

    pub async fn submit_phase2(
        &self,
        user_id: &str,
        topic_id: &str,
        answers: &[Option<i32>],
    ) -> Result<PhaseReview, QuizError> {
        let record = self.load(user_id).await?;
        let (data, score) =
            quiz_state::submit_phase2(record, topic_id, answers, &self.rules, Utc::now())
                .map_err(|reason| {
                    self.rejected(user_id, topic_id, QuizStep::PreparedPhase2, reason)
                })?;

        self.store(user_id, &data).await?;
        self.awarded(user_id, &data, score);

        self.review(user_id, &data)
    }

    pub async fn prepare_phase3(&self, user_id: &str, topic_id: &str) -> Result<PhaseView, QuizError> {
        let record = self.load(user_id).await?;
        let data = {
            let mut rng = StdRng::from_os_rng();
            quiz_state::prepare_phase3(record, topic_id, &self.rules, &mut rng, Utc::now())
        }
        .map_err(|reason| self.rejected(user_id, topic_id, QuizStep::SubmittedPhase2, reason))?;

        self.store(user_id, &data).await?;
        self.transitioned(user_id, &data);

        self.view(user_id, &data)
    }

    /// Scores the timeline, ranks the final total against the topic's earlier
    /// scores and records the new score exactly once per playthrough.
    pub async fn submit_phase3(
        &self,
        user_id: &str,
        topic_id: &str,
        order: &[String],
    ) -> Result<PhaseReview, QuizError> {
        let expected = QuizStep::PreparedPhase3;
        let record = self.load(user_id).await?;

        // reject before touching the score collection
        quiz_state::validate(record.as_ref(), expected, topic_id, &self.rules, Utc::now())
            .map_err(|reason| self.rejected(user_id, topic_id, expected, reason))?;

        let previous = record.clone();
        let population = self.topics.get_scores_by_topic(topic_id).await?;
        let (data, score) = quiz_state::submit_phase3(
            record,
            topic_id,
            order,
            &population,
            &self.rules,
            Utc::now(),
        )
        .map_err(|reason| self.rejected(user_id, topic_id, expected, reason))?;

        // The finished record goes first: a replay then fails with a step
        // mismatch instead of recording a second score.
        self.store(user_id, &data).await?;

        let recorded = self
            .topics
            .create_score(&Score {
                topic_id: topic_id.to_string(),
                user_id: user_id.to_string(),
                points: data.points,
                date: data.timestamp,
            })
            .await;
        if let Err(e) = recorded {
            tracing::error!("Failed to record score: user={}, topic={}: {:#}", user_id, topic_id, e);
            if let Some(previous) = &previous {
                if let Err(restore) = self.store(user_id, previous).await {
                    tracing::error!("Failed to restore quiz record: user={}: {}", user_id, restore);
                }
            }
            return Err(e.into());
        }
        QUIZ_SCORES_RECORDED_TOTAL.inc();
        QUIZ_FINAL_POINTS.observe(data.points as f64);

        self.awarded(user_id, &data, score);

        self.review(user_id, &data)
    }

    /// Questions of a prepared phase, as generated by the preceding transition.
    pub async fn view_phase(
        &self,
        user_id: &str,
        topic_id: &str,
        phase: u8,
    ) -> Result<PhaseView, QuizError> {
        let expected = QuizStep::prepared(phase).ok_or(QuizError::UnknownPhase(phase))?;
        let record = self.load(user_id).await?;
        let data = quiz_state::validate(record.as_ref(), expected, topic_id, &self.rules, Utc::now())
            .map_err(|reason| self.rejected(user_id, topic_id, expected, reason))?;

        self.view(user_id, data)
    }

    pub async fn review_phase(
        &self,
        user_id: &str,
        topic_id: &str,
        phase: u8,
    ) -> Result<PhaseReview, QuizError> {
        let expected = QuizStep::submitted(phase).ok_or(QuizError::UnknownPhase(phase))?;
        let record = self.load(user_id).await?;
        let data = quiz_state::validate(record.as_ref(), expected, topic_id, &self.rules, Utc::now())
            .map_err(|reason| self.rejected(user_id, topic_id, expected, reason))?;

        self.review(user_id, data)
    }

    pub async fn summary(&self, user_id: &str, topic_id: &str) -> Result<QuizSummary, QuizError> {
        let expected = QuizStep::SubmittedPhase3;
        let record = self.load(user_id).await?;
        let data = quiz_state::validate(record.as_ref(), expected, topic_id, &self.rules, Utc::now())
            .map_err(|reason| self.rejected(user_id, topic_id, expected, reason))?;

        quiz_state::summary(data, &self.rules)
            .map_err(|reason| self.rejected(user_id, topic_id, expected, reason))
    }

    async fn load(&self, user_id: &str) -> Result<Option<QuizData>, QuizError> {
        Ok(self.sessions.load(&session_key(user_id)).await?)
    }

    async fn store(&self, user_id: &str, data: &QuizData) -> Result<(), QuizError> {
        self.sessions
            .save(&session_key(user_id), data, self.session_ttl_seconds)
            .await?;
        Ok(())
    }

    fn view(&self, user_id: &str, data: &QuizData) -> Result<PhaseView, QuizError> {
        quiz_state::phase_view(data)
            .map_err(|reason| self.rejected(user_id, &data.topic_id, data.step(), reason))
    }

    fn review(&self, user_id: &str, data: &QuizData) -> Result<PhaseReview, QuizError> {
        quiz_state::phase_review(data)
            .map_err(|reason| self.rejected(user_id, &data.topic_id, data.step(), reason))
    }

    fn transitioned(&self, user_id: &str, data: &QuizData) {
        QUIZ_TRANSITIONS_TOTAL
            .with_label_values(&[data.step().as_str()])
            .inc();
        tracing::info!(
            "Quiz transition: user={}, topic={}, step={}, points={}",
            user_id,
            data.topic_id,
            data.step(),
            data.points
        );
    }

    fn awarded(&self, user_id: &str, data: &QuizData, score: PhaseScore) {
        let phase = data.step().phase().to_string();
        QUIZ_POINTS_AWARDED_TOTAL
            .with_label_values(&[phase.as_str()])
            .inc_by(score.points.max(0) as u64);
        tracing::debug!(
            "Phase {} scored: user={}, points={}, correct={}",
            phase,
            user_id,
            score.points,
            score.correct_guesses
        );
        self.transitioned(user_id, data);
    }

    fn rejected(
        &self,
        user_id: &str,
        topic_id: &str,
        expected: QuizStep,
        reason: ValidationError,
    ) -> QuizError {
        QUIZ_VALIDATION_FAILURES_TOTAL
            .with_label_values(&[reason.code()])
            .inc();
        tracing::warn!(
            "Quiz request rejected: user={}, topic={}, expected={}, reason={}",
            user_id,
            topic_id,
            expected,
            reason.code()
        );

        QuizError::Validation {
            phase: expected.phase(),
            reason,
        }
    }
}
