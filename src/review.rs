use std::fmt;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rand::seq::IndexedRandom;

use crate::level::{self, Grade, LevelChange, MAX_LEVEL, Mode};
use crate::term::Term;

/// Apply one graded attempt to `term`.
pub fn apply_grade(term: &mut Term, mode: Mode, score: u8, now: DateTime<Utc>) -> LevelChange {
    let grade = Grade::from_score(score);
    let old_level = term.level;

    term.total_attempts += 1;
    if grade == Grade::Pass {
        term.correct_count += 1;
    }

    if mode == Mode::Practice {
        return LevelChange::Practice { level: old_level };
    }

    term.last_review = Some(now);

    if old_level >= MAX_LEVEL {
        return LevelChange::Unchanged { level: old_level };
    }

    match grade {
        Grade::Pass => {
            let new_level = old_level + 1;
            term.level = new_level;
            term.next_review = if new_level >= MAX_LEVEL {
                None
            } else {
                level::next_review_at(old_level, now)
            };
            LevelChange::Advanced {
                from: old_level,
                to: new_level,
            }
        }
        Grade::Fail => {
            term.level = 0;
            term.next_review = None;
            LevelChange::Reset { from: old_level }
        }
    }
}

/// Force overdue terms back to level 1. Returns the names of the terms
/// that were reset.
pub fn sweep(terms: &mut [Term], now: DateTime<Utc>) -> Vec<String> {
    let mut reset = Vec::new();
    for term in terms.iter_mut() {
        if level::needs_reset(term.level, term.last_review, now) {
            log::info!(
                "decay: {} dropped from level {} to 1",
                term.name,
                term.level
            );
            term.level = 1;
            term.next_review = None;
            term.last_review = Some(now);
            reset.push(term.name.clone());
        }
    }
    reset
}

pub fn filter_due(terms: &[Term], now: DateTime<Utc>) -> Vec<usize> {
    terms
        .iter()
        .enumerate()
        .filter(|(_, term)| term.is_due(now))
        .map(|(i, _)| i)
        .collect()
}

/// Candidate indices for a quiz: every term in practice mode, due terms
/// in levelup mode.
pub fn candidates(terms: &[Term], mode: Mode, now: DateTime<Utc>) -> Vec<usize> {
    match mode {
        Mode::Practice => (0..terms.len()).collect(),
        Mode::Levelup => filter_due(terms, now),
    }
}

pub fn choose_candidate<R: Rng + ?Sized>(
    terms: &[Term],
    mode: Mode,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Option<usize> {
    candidates(terms, mode, now).choose(rng).copied()
}

pub fn search<'a>(terms: &'a [Term], query: &str) -> Vec<&'a Term> {
    terms.iter().filter(|t| t.matches(query)).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewStatus {
    FirstStudy,
    Mastered,
    Ready,
    Waiting(Duration),
}

pub fn review_status(term: &Term, now: DateTime<Utc>) -> ReviewStatus {
    if term.level == 0 {
        return ReviewStatus::FirstStudy;
    }
    if term.level >= MAX_LEVEL {
        return ReviewStatus::Mastered;
    }
    match term.next_review {
        Some(due) if now < due => ReviewStatus::Waiting(due - now),
        _ => ReviewStatus::Ready,
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewStatus::FirstStudy => f.write_str("first study"),
            ReviewStatus::Mastered => f.write_str("mastered"),
            ReviewStatus::Ready => f.write_str("ready for review"),
            ReviewStatus::Waiting(left) => {
                if left.num_days() > 0 {
                    write!(f, "in {} days", left.num_days())
                } else if left.num_hours() > 0 {
                    write!(f, "in {} hours", left.num_hours())
                } else {
                    write!(f, "in {} minutes", left.num_minutes())
                }
            }
        }
    }
}

pub struct LevelSummary {
    pub level: u8,
    pub label: &'static str,
    pub total: usize,
}

/// Term counts per level 0..=7, for the overview page.
pub fn level_summaries(terms: &[Term]) -> Vec<LevelSummary> {
    let mut counts = [0usize; MAX_LEVEL as usize + 1];
    for term in terms {
        counts[usize::from(term.level.min(MAX_LEVEL))] += 1;
    }
    counts
        .iter()
        .enumerate()
        .map(|(lvl, &total)| {
            let lvl = lvl as u8;
            LevelSummary {
                level: lvl,
                label: level::label(lvl),
                total,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn term_at(level: u8) -> Term {
        let mut term = Term::new(format!("lv{level}"), "desc", now() - Duration::days(30));
        term.level = level;
        term
    }

    #[test]
    fn overdue_level_three_decays_to_one() {
        let mut term = term_at(3);
        term.last_review = Some(now() - Duration::hours(100));
        term.next_review = Some(now() - Duration::hours(64));
        let mut terms = vec![term];
        let reset = sweep(&mut terms, now());
        assert_eq!(reset, vec!["lv3".to_string()]);
        assert_eq!(terms[0].level, 1);
        assert_eq!(terms[0].next_review, None);
        assert_eq!(terms[0].last_review, Some(now()));
    }

    #[test]
    fn sweep_skips_levels_zero_and_seven() {
        let mut terms = vec![term_at(0), term_at(7)];
        for t in &mut terms {
            t.last_review = Some(now() - Duration::days(365));
        }
        assert!(sweep(&mut terms, now()).is_empty());
        assert_eq!(terms[0].level, 0);
        assert_eq!(terms[1].level, 7);
    }

    #[test]
    fn sweep_is_single_pass() {
        let mut term = term_at(4);
        term.last_review = Some(now() - Duration::hours(200));
        let mut terms = vec![term];
        assert_eq!(sweep(&mut terms, now()).len(), 1);
        // level 1 has a zero-hour window, but last_review is now
        assert!(sweep(&mut terms, now()).is_empty());
    }

    #[test]
    fn level_zero_pass_is_immediately_due() {
        let mut term = term_at(0);
        let change = apply_grade(&mut term, Mode::Levelup, 85, now());
        assert_eq!(change, LevelChange::Advanced { from: 0, to: 1 });
        assert_eq!(term.level, 1);
        assert_eq!(term.next_review, Some(now()));
        assert!(term.is_due(now()));
    }

    #[test]
    fn level_six_pass_masters() {
        let mut term = term_at(6);
        term.next_review = Some(now());
        apply_grade(&mut term, Mode::Levelup, 100, now());
        assert_eq!(term.level, 7);
        assert_eq!(term.next_review, None);
        assert!(!term.is_due(now()));
        assert!(!term.is_due(now() + Duration::days(10_000)));
    }

    #[test]
    fn level_four_fail_resets_to_zero() {
        let mut term = term_at(4);
        term.next_review = Some(now() + Duration::hours(10));
        let change = apply_grade(&mut term, Mode::Levelup, 40, now());
        assert_eq!(change, LevelChange::Reset { from: 4 });
        assert_eq!(term.level, 0);
        assert_eq!(term.next_review, None);
        assert_eq!(term.total_attempts, 1);
        assert_eq!(term.correct_count, 0);
        assert_eq!(term.last_review, Some(now()));
        assert!(term.is_due(now()));
    }

    #[test]
    fn mastered_term_is_left_alone() {
        let mut term = term_at(7);
        let change = apply_grade(&mut term, Mode::Levelup, 10, now());
        assert_eq!(change, LevelChange::Unchanged { level: 7 });
        assert_eq!(term.level, 7);
        assert_eq!(term.total_attempts, 1);
    }

    #[test]
    fn candidates_by_mode() {
        let mut waiting = term_at(3);
        waiting.next_review = Some(now() + Duration::hours(5));
        let terms = vec![term_at(0), waiting, term_at(7), term_at(2)];
        assert_eq!(candidates(&terms, Mode::Practice, now()), vec![0, 1, 2, 3]);
        assert_eq!(candidates(&terms, Mode::Levelup, now()), vec![0, 3]);
    }

    #[test]
    fn choose_candidate_respects_eligibility() {
        let terms = vec![term_at(7), term_at(0), term_at(7)];
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            assert_eq!(choose_candidate(&terms, Mode::Levelup, now(), &mut rng), Some(1));
        }
        let mastered = vec![term_at(7)];
        assert_eq!(choose_candidate(&mastered, Mode::Levelup, now(), &mut rng), None);
        assert_eq!(choose_candidate(&mastered, Mode::Practice, now(), &mut rng), Some(0));
    }

    #[test]
    fn status_text() {
        let mut term = term_at(3);
        assert_eq!(review_status(&term, now()), ReviewStatus::Ready);
        term.next_review = Some(now() + Duration::hours(50));
        assert_eq!(review_status(&term, now()).to_string(), "in 2 days");
        term.next_review = Some(now() + Duration::hours(5));
        assert_eq!(review_status(&term, now()).to_string(), "in 5 hours");
        term.next_review = Some(now() + Duration::minutes(42));
        assert_eq!(review_status(&term, now()).to_string(), "in 42 minutes");
        assert_eq!(review_status(&term_at(0), now()), ReviewStatus::FirstStudy);
        assert_eq!(review_status(&term_at(7), now()), ReviewStatus::Mastered);
    }

    #[test]
    fn summaries_count_every_level() {
        let terms = vec![term_at(0), term_at(0), term_at(5)];
        let summaries = level_summaries(&terms);
        assert_eq!(summaries.len(), 8);
        assert_eq!(summaries[0].total, 2);
        assert_eq!(summaries[5].total, 1);
        assert_eq!(summaries[5].label, "Lv5 1 week");
    }

    proptest! {
        #[test]
        fn pass_advances_one_level(level in 0u8..=6, score in 70u8..=100) {
            let mut term = term_at(level);
            apply_grade(&mut term, Mode::Levelup, score, now());
            prop_assert_eq!(term.level, level + 1);
            if level + 1 == MAX_LEVEL {
                prop_assert_eq!(term.next_review, None);
            } else if level == 0 {
                prop_assert_eq!(term.next_review, Some(now()));
            } else {
                prop_assert!(term.next_review.unwrap() > now());
            }
        }

        #[test]
        fn fail_resets_to_zero(level in 0u8..=6, score in 0u8..70, hours in 0i64..1000) {
            let mut term = term_at(level);
            term.next_review = Some(now() + Duration::hours(hours));
            apply_grade(&mut term, Mode::Levelup, score, now());
            prop_assert_eq!(term.level, 0);
            prop_assert_eq!(term.next_review, None);
        }

        #[test]
        fn practice_never_touches_schedule(level in 0u8..=7, score in 0u8..=100) {
            let mut term = term_at(level);
            term.next_review = if (1..7).contains(&level) { Some(now() + Duration::hours(3)) } else { None };
            term.last_review = Some(now() - Duration::hours(1));
            let before = term.clone();
            apply_grade(&mut term, Mode::Practice, score, now());
            prop_assert_eq!(term.level, before.level);
            prop_assert_eq!(term.next_review, before.next_review);
            prop_assert_eq!(term.last_review, before.last_review);
            prop_assert_eq!(term.total_attempts, 1);
            prop_assert_eq!(term.correct_count, u32::from(score >= 70));
        }
    }
}
