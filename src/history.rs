use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::level::Mode;

pub const HISTORY_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub date: DateTime<Utc>,
    pub term_name: String,
    pub question: String,
    pub user_answer: String,
    pub score: u8,
    pub feedback: String,
    pub model_answer: String,
    pub mode: Mode,
    pub level_change: String,
}

/// Quiz attempts, newest first, capped at [`HISTORY_LIMIT`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History {
    entries: Vec<HistoryEntry>,
}

pub struct HistoryStats {
    pub total_questions: usize,
    pub average_score: u32,
}

impl History {
    pub fn new() -> History {
        History::default()
    }

    pub fn from_entries(mut entries: Vec<HistoryEntry>) -> History {
        entries.truncate(HISTORY_LIMIT);
        History { entries }
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.insert(0, entry);
        self.entries.truncate(HISTORY_LIMIT);
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> HistoryStats {
        let total_questions = self.entries.len();
        let average_score = if total_questions == 0 {
            0
        } else {
            let sum: u32 = self.entries.iter().map(|e| u32::from(e.score)).sum();
            (f64::from(sum) / total_questions as f64).round() as u32
        };
        HistoryStats {
            total_questions,
            average_score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(i: usize, score: u8) -> HistoryEntry {
        HistoryEntry {
            date: Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
            term_name: format!("term-{i}"),
            question: "q".into(),
            user_answer: "a".into(),
            score,
            feedback: String::new(),
            model_answer: String::new(),
            mode: Mode::Levelup,
            level_change: "0 → 1".into(),
        }
    }

    #[test]
    fn keeps_fifty_newest_first() {
        let mut history = History::new();
        for i in 0..51 {
            history.push(entry(i, 80));
        }
        assert_eq!(history.len(), HISTORY_LIMIT);
        assert_eq!(history.entries()[0].term_name, "term-50");
        assert_eq!(history.entries()[49].term_name, "term-1");
        assert!(history.entries().iter().all(|e| e.term_name != "term-0"));
    }

    #[test]
    fn stats_average_rounds() {
        let mut history = History::new();
        assert_eq!(history.stats().average_score, 0);
        history.push(entry(0, 70));
        history.push(entry(1, 85));
        let stats = history.stats();
        assert_eq!(stats.total_questions, 2);
        assert_eq!(stats.average_score, 78);
    }

    #[test]
    fn serializes_as_plain_array() {
        let mut history = History::new();
        history.push(entry(0, 90));
        let json = serde_json::to_value(&history).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["termName"], "term-0");
        assert_eq!(json[0]["mode"], "levelup");
        assert_eq!(json[0]["userAnswer"], "a");
    }

    #[test]
    fn oversized_input_is_truncated() {
        let entries = (0..60).map(|i| entry(i, 50)).collect();
        let history = History::from_entries(entries);
        assert_eq!(history.len(), HISTORY_LIMIT);
        assert_eq!(history.entries()[0].term_name, "term-0");
    }
}
