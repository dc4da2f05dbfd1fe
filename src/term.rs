use std::io;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::level::{self, MAX_LEVEL};

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Term {
    pub name: String,
    pub description: String,
    pub level: u8,
    pub created_at: DateTime<Utc>,
    pub last_review: Option<DateTime<Utc>>,
    pub next_review: Option<DateTime<Utc>>,
    pub correct_count: u32,
    pub total_attempts: u32,
}

const HEADER: [&str; 8] = [
    "name",
    "description",
    "level",
    "created_at",
    "last_review",
    "next_review",
    "correct_count",
    "total_attempts",
];

impl Term {
    pub fn new(name: impl Into<String>, description: impl Into<String>, now: DateTime<Utc>) -> Term {
        Term {
            name: name.into(),
            description: description.into(),
            level: 0,
            created_at: now,
            last_review: None,
            next_review: None,
            correct_count: 0,
            total_attempts: 0,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        level::is_due(self.level, self.next_review, now)
    }

    pub fn is_mastered(&self) -> bool {
        self.level >= MAX_LEVEL
    }

    /// Case-insensitive substring match on name or description.
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        query.is_empty()
            || self.name.to_lowercase().contains(&query)
            || self.description.to_lowercase().contains(&query)
    }

    /// Share of the way to mastery, 0..=100.
    pub fn progress_percent(&self) -> u32 {
        u32::from(self.level.min(MAX_LEVEL)) * 100 / u32::from(MAX_LEVEL)
    }

    /// Restore the record invariants after loading hand-edited or
    /// older data.
    pub fn normalize(&mut self) {
        if self.level > MAX_LEVEL {
            self.level = 0;
        }
        if !(1..MAX_LEVEL).contains(&self.level) {
            self.next_review = None;
        }
        if self.total_attempts < self.correct_count {
            self.total_attempts = self.correct_count;
        }
    }
}

fn parse_optional_time(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        None
    } else {
        DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

fn parse_count(s: &str) -> u32 {
    s.trim().parse().unwrap_or(0)
}

fn get_field(record: &csv::StringRecord, index: usize) -> String {
    record.get(index).unwrap_or("").to_string()
}

fn format_time(t: Option<DateTime<Utc>>) -> String {
    t.map_or(String::new(), |t| t.to_rfc3339())
}

/// Read terms from CSV. Missing or unparseable fields fall back to the
/// defaults of a freshly registered term; rows without a name are skipped.
pub fn read_terms<R: io::Read>(reader: R, now: DateTime<Utc>) -> Result<Vec<Term>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

    let mut terms = Vec::new();
    for result in reader.records() {
        let record = result?;

        let name = get_field(&record, 0).trim().to_string();
        if name.is_empty() {
            continue;
        }

        let mut term = Term {
            name,
            description: get_field(&record, 1),
            level: get_field(&record, 2).trim().parse().unwrap_or(0),
            created_at: parse_optional_time(&get_field(&record, 3)).unwrap_or(now),
            last_review: parse_optional_time(&get_field(&record, 4)),
            next_review: parse_optional_time(&get_field(&record, 5)),
            correct_count: parse_count(&get_field(&record, 6)),
            total_attempts: parse_count(&get_field(&record, 7)),
        };
        term.normalize();
        terms.push(term);
    }
    Ok(terms)
}

pub fn write_terms<W: io::Write>(writer: W, terms: &[Term]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);

    writer.write_record(HEADER)?;
    for term in terms {
        writer.write_record([
            &term.name,
            &term.description,
            &term.level.to_string(),
            &term.created_at.to_rfc3339(),
            &format_time(term.last_review),
            &format_time(term.next_review),
            &term.correct_count.to_string(),
            &term.total_attempts.to_string(),
        ])?;
    }

    writer.flush().map_err(csv::Error::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 30, 0).unwrap()
    }

    #[test]
    fn csv_round_trip() {
        let mut term = Term::new("ownership", "Each value has a single owner.", now());
        term.level = 3;
        term.last_review = Some(now());
        term.next_review = Some(now() + Duration::hours(84));
        term.correct_count = 3;
        term.total_attempts = 4;

        let mut buf = Vec::new();
        write_terms(&mut buf, std::slice::from_ref(&term)).unwrap();
        let loaded = read_terms(buf.as_slice(), now()).unwrap();
        assert_eq!(loaded, vec![term]);
    }

    #[test]
    fn description_with_commas_and_newlines() {
        let term = Term::new("lifetimes", "Regions of code,\nchecked by the borrow checker.", now());
        let mut buf = Vec::new();
        write_terms(&mut buf, std::slice::from_ref(&term)).unwrap();
        let loaded = read_terms(buf.as_slice(), now()).unwrap();
        assert_eq!(loaded[0].description, term.description);
    }

    #[test]
    fn sparse_rows_get_defaults() {
        let csv = "name,description,level,created_at,last_review,next_review,correct_count,total_attempts\n\
                   borrow,A reference,,,,,,\n\
                   ,orphan description,2,,,,,\n\
                   trait,Shared behaviour\n";
        let terms = read_terms(csv.as_bytes(), now()).unwrap();
        assert_eq!(terms.len(), 2);
        assert_eq!(terms[0].name, "borrow");
        assert_eq!(terms[0].level, 0);
        assert_eq!(terms[0].created_at, now());
        assert!(terms[0].last_review.is_none());
        assert_eq!(terms[0].total_attempts, 0);
        assert_eq!(terms[1].name, "trait");
        assert_eq!(terms[1].description, "Shared behaviour");
    }

    #[test]
    fn malformed_values_are_normalized() {
        let csv = "name,description,level,created_at,last_review,next_review,correct_count,total_attempts\n\
                   a,x,9,garbage,garbage,2025-06-02T00:00:00+00:00,5,2\n\
                   b,y,7,,,2025-06-02T00:00:00+00:00,1,1\n\
                   c,z,abc,,,,-3,\n";
        let terms = read_terms(csv.as_bytes(), now()).unwrap();
        assert_eq!(terms[0].level, 0);
        assert!(terms[0].next_review.is_none());
        assert!(terms[0].last_review.is_none());
        assert_eq!(terms[0].correct_count, 5);
        assert_eq!(terms[0].total_attempts, 5);
        assert_eq!(terms[1].level, 7);
        assert!(terms[1].next_review.is_none());
        assert_eq!(terms[2].level, 0);
        assert_eq!(terms[2].correct_count, 0);
    }

    #[test]
    fn search_matches_name_or_description() {
        let term = Term::new("Closure", "An anonymous FUNCTION capturing its environment", now());
        assert!(term.matches("clos"));
        assert!(term.matches("function"));
        assert!(term.matches("  "));
        assert!(!term.matches("iterator"));
    }

    #[test]
    fn progress_tracks_level() {
        let mut term = Term::new("a", "b", now());
        assert_eq!(term.progress_percent(), 0);
        term.level = 7;
        assert_eq!(term.progress_percent(), 100);
        assert!(term.is_mastered());
    }
}
