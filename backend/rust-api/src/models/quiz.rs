use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::topic::Event;

/// Strict position of a quiz session. Only ever advances by one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizStep {
    PreparedPhase1,
    SubmittedPhase1,
    PreparedPhase2,
    SubmittedPhase2,
    PreparedPhase3,
    SubmittedPhase3,
}

impl QuizStep {
    pub const ALL: [QuizStep; 6] = [
        QuizStep::PreparedPhase1,
        QuizStep::SubmittedPhase1,
        QuizStep::PreparedPhase2,
        QuizStep::SubmittedPhase2,
        QuizStep::PreparedPhase3,
        QuizStep::SubmittedPhase3,
    ];

    pub fn ordinal(self) -> u8 {
        self as u8
    }

    /// Phase number (1..=3) this step belongs to.
    pub fn phase(self) -> u8 {
        self.ordinal() / 2 + 1
    }

    pub fn next(self) -> Option<QuizStep> {
        Self::ALL.get(self.ordinal() as usize + 1).copied()
    }

    pub fn prepared(phase: u8) -> Option<QuizStep> {
        match phase {
            1 => Some(QuizStep::PreparedPhase1),
            2 => Some(QuizStep::PreparedPhase2),
            3 => Some(QuizStep::PreparedPhase3),
            _ => None,
        }
    }

    pub fn submitted(phase: u8) -> Option<QuizStep> {
        Self::prepared(phase).and_then(QuizStep::next)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QuizStep::PreparedPhase1 => "prepared_phase1",
            QuizStep::SubmittedPhase1 => "submitted_phase1",
            QuizStep::PreparedPhase2 => "prepared_phase2",
            QuizStep::SubmittedPhase2 => "submitted_phase2",
            QuizStep::PreparedPhase3 => "prepared_phase3",
            QuizStep::SubmittedPhase3 => "submitted_phase3",
        }
    }
}

impl std::fmt::Display for QuizStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Multiple-choice question of phase 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase1Question {
    pub id: String,
    pub event_name: String,
    pub event_year: i32,
    pub choices: Vec<i32>,
    pub user_guess: Option<i32>,
    pub correct_guess: bool,
    pub points: i32,
}

/// Free-form year question of phase 2.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase2Question {
    pub id: String,
    pub event_name: String,
    pub event_year: i32,
    pub user_guess: Option<i32>,
    pub correct_guess: bool,
    pub points: i32,
}

/// One event of the phase 3 timeline. `order` is its 0-based chronological rank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase3Question {
    pub event_name: String,
    pub event_year: i32,
    pub order: usize,
}

/// What the user put into one presentation slot of phase 3.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase3Placement {
    pub slot: usize,
    pub event_name: Option<String>,
    pub true_order: Option<usize>,
    pub points: i32,
    pub correct_guess: bool,
}

/// Position of a finished score within the topic's earlier scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ranking {
    /// Share of earlier attempts this one outperforms, `None` without any.
    pub percentile: Option<u32>,
    pub population: usize,
}

impl Ranking {
    pub fn message(&self) -> String {
        match self.percentile {
            Some(percentile) => format!(
                "Du warst besser als {}% der Spieler bei diesem Thema.",
                percentile
            ),
            None => "Für dieses Thema sind noch keine Vergleichswerte vorhanden.".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase3Result {
    pub questions: Vec<Phase3Question>,
    pub placements: Vec<Phase3Placement>,
    pub ranking: Ranking,
}

/// Current step together with the question set that belongs to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", content = "questions", rename_all = "snake_case")]
pub enum QuizStage {
    PreparedPhase1(Vec<Phase1Question>),
    SubmittedPhase1(Vec<Phase1Question>),
    PreparedPhase2(Vec<Phase2Question>),
    SubmittedPhase2(Vec<Phase2Question>),
    PreparedPhase3(Vec<Phase3Question>),
    SubmittedPhase3(Phase3Result),
}

impl QuizStage {
    pub fn step(&self) -> QuizStep {
        match self {
            QuizStage::PreparedPhase1(_) => QuizStep::PreparedPhase1,
            QuizStage::SubmittedPhase1(_) => QuizStep::SubmittedPhase1,
            QuizStage::PreparedPhase2(_) => QuizStep::PreparedPhase2,
            QuizStage::SubmittedPhase2(_) => QuizStep::SubmittedPhase2,
            QuizStage::PreparedPhase3(_) => QuizStep::PreparedPhase3,
            QuizStage::SubmittedPhase3(_) => QuizStep::SubmittedPhase3,
        }
    }
}

/// Per-player record of one playthrough, kept in the session store between
/// requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizData {
    pub topic_id: String,
    pub topic_name: String,
    /// Snapshot of the topic's events in the order shuffled at start.
    pub events: Vec<Event>,
    pub points: i32,
    pub correct_guesses: u32,
    pub stage: QuizStage,
    pub timestamp: DateTime<Utc>,
}

impl QuizData {
    pub fn step(&self) -> QuizStep {
        self.stage.step()
    }
}

// Request payloads

/// Answers of a submitted phase. Phases 1 and 2 read `answers` (one year per
/// question index, `null` for unanswered), phase 3 reads `order` (one event
/// name per presentation slot).
#[derive(Debug, Default, Deserialize)]
pub struct SubmitAnswersRequest {
    #[serde(default)]
    pub answers: Vec<Option<i32>>,
    #[serde(default)]
    pub order: Vec<String>,
}

// Response payloads

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase1QuestionView {
    pub id: String,
    pub event_name: String,
    pub choices: Vec<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase2QuestionView {
    pub id: String,
    pub event_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase3QuestionView {
    pub slot: usize,
    pub event_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PhaseQuestions {
    MultipleChoice(Vec<Phase1QuestionView>),
    YearGuess(Vec<Phase2QuestionView>),
    Chronology(Vec<Phase3QuestionView>),
}

/// Prepared question set as shown to the player, without answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseView {
    pub topic_id: String,
    pub topic_name: String,
    pub phase: u8,
    pub questions: PhaseQuestions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReviewDetails {
    MultipleChoice(Vec<Phase1Question>),
    YearGuess(Vec<Phase2Question>),
    Chronology {
        placements: Vec<Phase3Placement>,
        chronology: Vec<Phase3Question>,
    },
}

/// Correction of a submitted phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseReview {
    pub topic_id: String,
    pub topic_name: String,
    pub phase: u8,
    pub points: i32,
    pub correct_guesses: u32,
    pub details: ReviewDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizSummary {
    pub topic_id: String,
    pub topic_name: String,
    pub points: i32,
    pub correct_guesses: u32,
    pub questions_count: usize,
    pub potential_points: i32,
    pub ranking: Ranking,
    pub ranking_message: String,
}

impl From<&Phase1Question> for Phase1QuestionView {
    fn from(question: &Phase1Question) -> Self {
        Self {
            id: question.id.clone(),
            event_name: question.event_name.clone(),
            choices: question.choices.clone(),
        }
    }
}

impl From<&Phase2Question> for Phase2QuestionView {
    fn from(question: &Phase2Question) -> Self {
        Self {
            id: question.id.clone(),
            event_name: question.event_name.clone(),
        }
    }
}
