//! Question sets for the three quiz phases.
//!
//! Generators never own a random source: callers pass one in, so every
//! session draws from its own generator and tests can seed it.

use rand::{seq::SliceRandom, Rng};

use crate::config::QuizRules;
use crate::models::{Event, Phase1Question, Phase2Question, Phase3Question};

fn question_id(index: usize) -> String {
    format!("q{}", index)
}

/// Multiple-choice questions for the first `p1_questions` events.
///
/// Each question offers the correct year plus `p1_choices - 1` distinct
/// distractors drawn uniformly from `[year - max_diff, year + max_diff]`.
pub fn create_phase1_questions<R: Rng + ?Sized>(
    events: &[Event],
    rules: &QuizRules,
    rng: &mut R,
) -> Vec<Phase1Question> {
    events
        .iter()
        .take(rules.p1_questions)
        .enumerate()
        .map(|(index, event)| {
            let mut choices = year_choices(event.year, rules, rng);
            choices.shuffle(rng);

            Phase1Question {
                id: question_id(index),
                event_name: event.name.clone(),
                event_year: event.year,
                choices,
                user_guess: None,
                correct_guess: false,
                points: 0,
            }
        })
        .collect()
}

/// Correct year followed by the distractors, unshuffled.
fn year_choices<R: Rng + ?Sized>(correct_year: i32, rules: &QuizRules, rng: &mut R) -> Vec<i32> {
    let min = correct_year.saturating_sub(rules.p1_choices_max_diff);
    let max = correct_year.saturating_add(rules.p1_choices_max_diff);

    let mut years = Vec::with_capacity(rules.p1_choices);
    years.push(correct_year);

    // QuizRules::validate guarantees the range holds enough distinct years.
    while years.len() < rules.p1_choices {
        let year = rng.random_range(min..=max);
        if !years.contains(&year) {
            years.push(year);
        }
    }

    years
}

/// Exact-year questions for the `p2_questions` events following phase 1.
pub fn create_phase2_questions(events: &[Event], rules: &QuizRules) -> Vec<Phase2Question> {
    events
        .iter()
        .skip(rules.p1_questions)
        .take(rules.p2_questions)
        .enumerate()
        .map(|(index, event)| Phase2Question {
            id: question_id(index),
            event_name: event.name.clone(),
            event_year: event.year,
            user_guess: None,
            correct_guess: false,
            points: 0,
        })
        .collect()
}

/// Timeline of all events. Each question carries its chronological rank by
/// full date; the returned list itself is in shuffled presentation order.
pub fn create_phase3_questions<R: Rng + ?Sized>(
    events: &[Event],
    rng: &mut R,
) -> Vec<Phase3Question> {
    let mut sorted: Vec<&Event> = events.iter().collect();
    // stable: equal dates keep their relative order
    sorted.sort_by_key(|event| event.date);

    let mut questions: Vec<Phase3Question> = sorted
        .into_iter()
        .enumerate()
        .map(|(order, event)| Phase3Question {
            event_name: event.name.clone(),
            event_year: event.year,
            order,
        })
        .collect();

    questions.shuffle(rng);
    questions
}
