//! Mastery levels 0..=7 and the review windows attached to them.
//! Level 0 is unlearned and has no window; level 7 is terminal.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const MAX_LEVEL: u8 = 7;
pub const PASS_SCORE: u8 = 70;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelConfig {
    pub level: u8,
    pub min_hours: f64,
    pub max_hours: f64,
    pub label: &'static str,
    pub color: &'static str,
}

impl LevelConfig {
    pub fn midpoint_hours(&self) -> f64 {
        (self.min_hours + self.max_hours) / 2.0
    }
}

const LEVELS: [LevelConfig; 7] = [
    LevelConfig { level: 1, min_hours: 0.0, max_hours: 0.0, label: "Lv1 First", color: "#ff6b6b" },
    LevelConfig { level: 2, min_hours: 2.0, max_hours: 5.0, label: "Lv2 Short", color: "#ff8c42" },
    LevelConfig { level: 3, min_hours: 24.0, max_hours: 48.0, label: "Lv3 1 day", color: "#ffd93d" },
    LevelConfig { level: 4, min_hours: 72.0, max_hours: 96.0, label: "Lv4 3 days", color: "#6bcf7f" },
    LevelConfig { level: 5, min_hours: 168.0, max_hours: 192.0, label: "Lv5 1 week", color: "#4d96ff" },
    LevelConfig { level: 6, min_hours: 336.0, max_hours: 360.0, label: "Lv6 2 weeks", color: "#9d4edd" },
    LevelConfig { level: 7, min_hours: 744.0, max_hours: 768.0, label: "Lv7 Mastered", color: "#ff006e" },
];

pub fn config(level: u8) -> Option<&'static LevelConfig> {
    match level {
        1..=MAX_LEVEL => Some(&LEVELS[usize::from(level) - 1]),
        _ => None,
    }
}

pub fn label(level: u8) -> &'static str {
    config(level).map_or("Unlearned", |c| c.label)
}

pub fn color(level: u8) -> &'static str {
    config(level).map_or("#cccccc", |c| c.color)
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Practice,
    Levelup,
}

impl Mode {
    pub fn parse(s: &str) -> Option<Mode> {
        match s.trim().to_ascii_lowercase().as_str() {
            "practice" => Some(Mode::Practice),
            "levelup" | "level-up" => Some(Mode::Levelup),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Practice => "practice",
            Mode::Levelup => "levelup",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Grade {
    Pass,
    Fail,
}

impl Grade {
    pub fn from_score(score: u8) -> Grade {
        if score >= PASS_SCORE {
            Grade::Pass
        } else {
            Grade::Fail
        }
    }
}

/// What a single graded attempt did to a term's level.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LevelChange {
    Practice { level: u8 },
    Advanced { from: u8, to: u8 },
    Reset { from: u8 },
    Unchanged { level: u8 },
}

impl LevelChange {
    pub fn new_level(self) -> u8 {
        match self {
            LevelChange::Practice { level } | LevelChange::Unchanged { level } => level,
            LevelChange::Advanced { to, .. } => to,
            LevelChange::Reset { .. } => 0,
        }
    }
}

impl fmt::Display for LevelChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelChange::Practice { level } => write!(f, "practice (Lv{level} kept)"),
            LevelChange::Advanced { from, to } => write!(f, "{from} → {to}"),
            LevelChange::Reset { from } => write!(f, "{from} → 0 (reset)"),
            LevelChange::Unchanged { level } => write!(f, "Lv{level} kept"),
        }
    }
}

fn hours(h: f64) -> Duration {
    Duration::milliseconds((h * 3_600_000.0).round() as i64)
}

pub fn elapsed_hours(since: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - since).num_milliseconds() as f64 / 3_600_000.0
}

/// Schedule the next review after a pass at `current_level` (the level
/// held before the increment). The offset is the midpoint of the
/// successor level's window.
pub fn next_review_at(current_level: u8, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if current_level >= MAX_LEVEL {
        return None;
    }
    let next = config(current_level + 1)?;
    Some(now + hours(next.midpoint_hours()))
}

/// Decay check against the window of the level currently held.
pub fn needs_reset(level: u8, last_review: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    if !(1..MAX_LEVEL).contains(&level) {
        return false;
    }
    let (Some(last), Some(cfg)) = (last_review, config(level)) else {
        return false;
    };
    elapsed_hours(last, now) > cfg.max_hours
}

/// The review-eligibility predicate.
pub fn is_due(level: u8, next_review: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match level {
        0 => true,
        1..=6 => next_review.is_none_or(|due| now >= due),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn table_covers_levels_one_to_seven() {
        assert!(config(0).is_none());
        assert!(config(8).is_none());
        for level in 1..=MAX_LEVEL {
            assert_eq!(config(level).unwrap().level, level);
        }
        assert_eq!(label(0), "Unlearned");
        assert_eq!(label(7), "Lv7 Mastered");
    }

    #[test]
    fn offsets_into_each_level() {
        let expected = [(0, 0.0), (1, 3.5), (2, 36.0), (3, 84.0), (4, 180.0), (5, 348.0), (6, 756.0)];
        for (from, h) in expected {
            let due = next_review_at(from, now()).unwrap();
            assert!((elapsed_hours(now(), due) - h).abs() < 1e-9, "from {from}");
        }
        assert_eq!(next_review_at(7, now()), None);
    }

    #[test]
    fn grade_threshold() {
        assert_eq!(Grade::from_score(70), Grade::Pass);
        assert_eq!(Grade::from_score(69), Grade::Fail);
        assert_eq!(Grade::from_score(100), Grade::Pass);
        assert_eq!(Grade::from_score(0), Grade::Fail);
    }

    #[test]
    fn level_three_overdue_after_forty_eight_hours() {
        let last = now() - Duration::hours(100);
        assert!(needs_reset(3, Some(last), now()));
        assert!(!needs_reset(3, Some(now() - Duration::hours(48)), now()));
        assert!(!needs_reset(3, None, now()));
    }

    #[test]
    fn due_predicate_edges() {
        assert!(is_due(0, Some(now() + Duration::days(3)), now()));
        assert!(!is_due(7, None, now()));
        assert!(is_due(3, None, now()));
        assert!(is_due(3, Some(now()), now()));
        assert!(!is_due(3, Some(now() + Duration::minutes(1)), now()));
    }

    #[test]
    fn mode_parse_and_display() {
        assert_eq!(Mode::parse("Practice"), Some(Mode::Practice));
        assert_eq!(Mode::parse("levelup"), Some(Mode::Levelup));
        assert_eq!(Mode::parse("exam"), None);
        assert_eq!(Mode::Levelup.to_string(), "levelup");
    }

    #[test]
    fn level_change_text() {
        assert_eq!(LevelChange::Advanced { from: 2, to: 3 }.to_string(), "2 → 3");
        assert_eq!(LevelChange::Reset { from: 4 }.to_string(), "4 → 0 (reset)");
        assert_eq!(LevelChange::Practice { level: 5 }.to_string(), "practice (Lv5 kept)");
    }

    proptest! {
        #[test]
        fn needs_reset_iff_elapsed_exceeds_window(level in 1u8..=6, minutes in 0i64..40_000) {
            let last = now() - Duration::minutes(minutes);
            let expected = minutes as f64 / 60.0 > config(level).unwrap().max_hours;
            prop_assert_eq!(needs_reset(level, Some(last), now()), expected);
        }

        #[test]
        fn terminal_levels_never_reset(level in prop::sample::select(vec![0u8, 7]), minutes in 0i64..1_000_000) {
            let last = now() - Duration::minutes(minutes);
            prop_assert!(!needs_reset(level, Some(last), now()));
        }

        #[test]
        fn middle_levels_due_iff_now_reached(level in 1u8..=6, offset in -10_000i64..10_000) {
            let next = now() + Duration::minutes(offset);
            prop_assert_eq!(is_due(level, Some(next), now()), offset <= 0);
        }
    }
}
