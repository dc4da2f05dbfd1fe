//! The study session: the term set, the quiz history and the quiz state
//! machine, owned by one value and persisted through a [`Store`] after
//! every mutation.
//!
//! Quiz flow:
//! ```text
//! Idle ──begin_quiz──▶ Generating ──question_ready──▶ Answering
//!  ▲                      │                             │    ▲
//!  └──question_failed─────┘               begin_grading │    │ grading_failed
//!                                                       ▼    │
//!                          Finished ◀──finish_grading── Grading
//! ```
//! The outbound service calls happen between the transitions, so a caller
//! holding the session behind a lock can release it while waiting.

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::error::{Error, Result};
use crate::history::{History, HistoryEntry};
use crate::level::{LevelChange, Mode};
use crate::review;
use crate::store::Store;
use crate::term::Term;
use crate::tutor::{GradeRequest, Grading, GradingService, QuestionService};

#[derive(Debug, Clone, PartialEq)]
pub struct QuizOutcome {
    pub term_name: String,
    pub mode: Mode,
    pub question: String,
    pub answer: String,
    pub grading: Grading,
    pub change: LevelChange,
}

impl QuizOutcome {
    pub fn passed(&self) -> bool {
        self.grading.score >= crate::level::PASS_SCORE
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum QuizState {
    #[default]
    Idle,
    Generating {
        term_name: String,
        mode: Mode,
    },
    Answering {
        term_name: String,
        mode: Mode,
        question: String,
        /// Answer kept from a failed grading attempt.
        draft: String,
    },
    Grading {
        term_name: String,
        mode: Mode,
        question: String,
        answer: String,
    },
    Finished(QuizOutcome),
}

impl QuizState {
    pub fn name(&self) -> &'static str {
        match self {
            QuizState::Idle => "idle",
            QuizState::Generating { .. } => "generating",
            QuizState::Answering { .. } => "answering",
            QuizState::Grading { .. } => "grading",
            QuizState::Finished(_) => "finished",
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, QuizState::Generating { .. } | QuizState::Grading { .. })
    }

    fn term_name(&self) -> Option<&str> {
        match self {
            QuizState::Idle => None,
            QuizState::Generating { term_name, .. }
            | QuizState::Answering { term_name, .. }
            | QuizState::Grading { term_name, .. } => Some(term_name),
            QuizState::Finished(outcome) => Some(&outcome.term_name),
        }
    }
}

/// The term handed to the question service when a quiz starts.
#[derive(Debug, Clone, PartialEq)]
pub struct QuizTicket {
    pub term_name: String,
    pub mode: Mode,
}

pub struct Session<S: Store> {
    store: S,
    terms: Vec<Term>,
    history: History,
    quiz: QuizState,
}

impl<S: Store> Session<S> {
    /// Load the collections and run the decay sweep once.
    pub fn open(store: S, now: DateTime<Utc>) -> Result<Session<S>> {
        let (terms, history) = store.load()?;
        log::debug!("loaded {} terms, {} history entries", terms.len(), history.len());
        let mut session = Session {
            store,
            terms,
            history,
            quiz: QuizState::Idle,
        };
        session.sweep(now)?;
        Ok(session)
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    pub fn term(&self, name: &str) -> Option<&Term> {
        self.terms.iter().find(|t| t.name == name)
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn quiz(&self) -> &QuizState {
        &self.quiz
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Save the candidate collections, then adopt them. On a store failure
    /// the session keeps its previous state.
    fn commit(&mut self, terms: Vec<Term>, history: History) -> Result<()> {
        self.store.save(&terms, &history)?;
        self.terms = terms;
        self.history = history;
        Ok(())
    }

    pub fn register(&mut self, name: &str, description: &str, now: DateTime<Utc>) -> Result<&Term> {
        let name = name.trim();
        let description = description.trim();
        if name.is_empty() || description.is_empty() {
            return Err(Error::validation(
                "both a term name and a description are required",
            ));
        }
        if self.term(name).is_some() {
            return Err(Error::validation(format!("term already exists: {name}")));
        }

        let mut terms = self.terms.clone();
        terms.push(Term::new(name, description, now));
        self.commit(terms, self.history.clone())?;
        log::info!("registered term {name}");
        Ok(&self.terms[self.terms.len() - 1])
    }

    pub fn remove(&mut self, name: &str) -> Result<Term> {
        let pos = self
            .terms
            .iter()
            .position(|t| t.name == name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;

        let mut terms = self.terms.clone();
        let removed = terms.remove(pos);
        self.commit(terms, self.history.clone())?;
        if self.quiz.term_name() == Some(name) {
            self.quiz = QuizState::Idle;
        }
        log::info!("removed term {name}");
        Ok(removed)
    }

    pub fn clear_history(&mut self) -> Result<()> {
        self.commit(self.terms.clone(), History::new())
    }

    /// Run the decay sweep and persist if anything was reset.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let mut terms = self.terms.clone();
        let reset = review::sweep(&mut terms, now);
        if !reset.is_empty() {
            self.commit(terms, self.history.clone())?;
        }
        Ok(reset)
    }

    /// Terms currently eligible for a levelup quiz. Call [`Session::sweep`]
    /// first when time has passed since the session was opened.
    pub fn due_terms(&self, now: DateTime<Utc>) -> Vec<&Term> {
        review::filter_due(&self.terms, now)
            .into_iter()
            .map(|i| &self.terms[i])
            .collect()
    }

    pub fn begin_quiz<R: Rng + ?Sized>(
        &mut self,
        mode: Mode,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<QuizTicket> {
        if self.quiz.is_pending() {
            return Err(Error::invalid_state(format!(
                "cannot start a quiz while {}",
                self.quiz.name()
            )));
        }
        if self.terms.is_empty() {
            return Err(Error::validation("no terms are registered"));
        }
        self.sweep(now)?;

        let index =
            review::choose_candidate(&self.terms, mode, now, rng).ok_or(Error::NoEligibleTerms)?;
        let term = &self.terms[index];
        log::debug!("quiz on {} (level {}, {mode})", term.name, term.level);

        let ticket = QuizTicket {
            term_name: term.name.clone(),
            mode,
        };
        self.quiz = QuizState::Generating {
            term_name: ticket.term_name.clone(),
            mode,
        };
        Ok(ticket)
    }

    pub fn question_ready(&mut self, question: String) -> Result<()> {
        match std::mem::take(&mut self.quiz) {
            QuizState::Generating { term_name, mode } => {
                self.quiz = QuizState::Answering {
                    term_name,
                    mode,
                    question,
                    draft: String::new(),
                };
                Ok(())
            }
            other => {
                let name = other.name();
                self.quiz = other;
                Err(Error::invalid_state(format!("no question pending ({name})")))
            }
        }
    }

    pub fn question_failed(&mut self) {
        if matches!(self.quiz, QuizState::Generating { .. }) {
            self.quiz = QuizState::Idle;
        }
    }

    /// Validate the answer and move to the grading state. Returns the
    /// request for the grading service.
    pub fn begin_grading(&mut self, answer: &str) -> Result<GradeRequest> {
        let answer = answer.trim();
        let QuizState::Answering {
            term_name,
            mode,
            question,
            ..
        } = &self.quiz
        else {
            return Err(Error::invalid_state(format!(
                "no question to answer ({})",
                self.quiz.name()
            )));
        };
        if answer.is_empty() {
            return Err(Error::validation("please enter an answer"));
        }
        let term = self
            .term(term_name)
            .ok_or_else(|| Error::NotFound(term_name.clone()))?;

        let request = GradeRequest {
            term_name: term.name.clone(),
            description: term.description.clone(),
            question: question.clone(),
            user_answer: answer.to_string(),
        };
        self.quiz = QuizState::Grading {
            term_name: term_name.clone(),
            mode: *mode,
            question: question.clone(),
            answer: answer.to_string(),
        };
        Ok(request)
    }

    /// Back to the question, keeping the answer the user typed.
    pub fn grading_failed(&mut self) {
        self.quiz = match std::mem::take(&mut self.quiz) {
            QuizState::Grading {
                term_name,
                mode,
                question,
                answer,
            } => QuizState::Answering {
                term_name,
                mode,
                question,
                draft: answer,
            },
            other => other,
        };
    }

    /// Apply the grading to the term, record it in the history and persist.
    pub fn finish_grading(&mut self, grading: Grading, now: DateTime<Utc>) -> Result<QuizOutcome> {
        let QuizState::Grading {
            term_name,
            mode,
            question,
            answer,
        } = &self.quiz
        else {
            return Err(Error::invalid_state(format!(
                "no grading pending ({})",
                self.quiz.name()
            )));
        };

        let mut terms = self.terms.clone();
        let Some(term) = terms.iter_mut().find(|t| t.name == *term_name) else {
            let name = term_name.clone();
            self.quiz = QuizState::Idle;
            return Err(Error::NotFound(name));
        };
        let change = review::apply_grade(term, *mode, grading.score, now);

        let mut history = self.history.clone();
        history.push(HistoryEntry {
            date: now,
            term_name: term_name.clone(),
            question: question.clone(),
            user_answer: answer.clone(),
            score: grading.score,
            feedback: grading.feedback.clone(),
            model_answer: grading.model_answer.clone(),
            mode: *mode,
            level_change: change.to_string(),
        });

        let outcome = QuizOutcome {
            term_name: term_name.clone(),
            mode: *mode,
            question: question.clone(),
            answer: answer.clone(),
            grading,
            change,
        };
        if let Err(e) = self.commit(terms, history) {
            self.grading_failed();
            return Err(e);
        }
        log::info!(
            "graded {} ({}): score {}, {}",
            outcome.term_name,
            outcome.mode,
            outcome.grading.score,
            outcome.change
        );

        self.quiz = QuizState::Finished(outcome.clone());
        Ok(outcome)
    }

    /// Leave a finished or unanswered quiz. Pending requests are not
    /// cancelled.
    pub fn reset_quiz(&mut self) {
        if !self.quiz.is_pending() {
            self.quiz = QuizState::Idle;
        }
    }

    /// Pick a term and fetch its question in one step.
    pub async fn ask<Q, R>(
        &mut self,
        tutor: &Q,
        mode: Mode,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<QuizTicket>
    where
        Q: QuestionService,
        R: Rng + ?Sized,
    {
        let ticket = self.begin_quiz(mode, now, rng)?;
        match tutor.generate_question(&ticket.term_name).await {
            Ok(question) => {
                self.question_ready(question)?;
                Ok(ticket)
            }
            Err(e) => {
                self.question_failed();
                Err(e)
            }
        }
    }

    /// Grade `answer` to the current question in one step.
    pub async fn answer<G: GradingService>(
        &mut self,
        tutor: &G,
        answer: &str,
        now: DateTime<Utc>,
    ) -> Result<QuizOutcome> {
        let request = self.begin_grading(answer)?;
        match tutor.grade_answer(&request).await {
            Ok(grading) => self.finish_grading(grading, now),
            Err(e) => {
                self.grading_failed();
                Err(e)
            }
        }
    }
}
