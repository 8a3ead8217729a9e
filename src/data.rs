use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{self, Value};
use time::OffsetDateTime;

use crate::errors::*;

pub type EntryId = u32;

pub const MIN_RATING: f64 = 0.0;
pub const MAX_RATING: f64 = 10.0;

/// Where a title stands in the reading queue.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Default, Serialize, Deserialize)]
pub enum Status {
    Reading,
    Completed,
    #[serde(rename = "On Hold")]
    OnHold,
    Dropped,
    #[default]
    #[serde(rename = "Plan to Read")]
    PlanToRead,
}

impl Status {
    /// Menu order.
    pub const ALL: [Status; 5] = [
        Status::Reading,
        Status::Completed,
        Status::OnHold,
        Status::Dropped,
        Status::PlanToRead,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Status::Reading => "Reading",
            Status::Completed => "Completed",
            Status::OnHold => "On Hold",
            Status::Dropped => "Dropped",
            Status::PlanToRead => "Plan to Read",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Status {
    type Err = Error;

    /// Accepts the label in any case, with spaces, dashes or underscores
    /// between words (`plan to read`, `plan-to-read`, `ON_HOLD`).
    fn from_str(s: &str) -> Result<Status> {
        let wanted = s
            .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
            .filter(|word| !word.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        Status::ALL
            .iter()
            .find(|status| status.label().to_lowercase() == wanted)
            .cloned()
            .ok_or_else(|| ErrorKind::BadStatus(s.to_string()).into())
    }
}

/// Clamps a rating into `[MIN_RATING, MAX_RATING]`. NaN becomes `MIN_RATING`.
pub fn clamp_rating(rating: f64) -> f64 {
    if rating.is_nan() {
        MIN_RATING
    } else {
        rating.clamp(MIN_RATING, MAX_RATING)
    }
}

/// One tracked title.
///
/// Fields are only reachable through setters so that every mutation refreshes
/// `last_updated` and keeps the rating inside its range.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Entry {
    #[serde(default)]
    id: EntryId,
    title: String,
    author: String,
    #[serde(default)]
    current_chapter: u32,
    #[serde(default)]
    total_chapters: Option<u32>,
    #[serde(default)]
    status: Status,
    #[serde(default)]
    rating: Option<f64>,
    #[serde(default)]
    notes: String,
    #[serde(with = "timestamp", default = "timestamp::now")]
    last_updated: OffsetDateTime,
}

impl Entry {
    pub fn new<T: Into<String>, A: Into<String>>(title: T, author: A) -> Entry {
        Entry {
            id: 0,
            title: title.into(),
            author: author.into(),
            current_chapter: 0,
            total_chapters: None,
            status: Status::default(),
            rating: None,
            notes: String::new(),
            last_updated: timestamp::now(),
        }
    }

    pub fn with_current_chapter(mut self, chapter: u32) -> Entry {
        self.current_chapter = chapter;
        self
    }

    pub fn with_total_chapters(mut self, total: Option<u32>) -> Entry {
        self.total_chapters = total;
        self
    }

    pub fn with_status(mut self, status: Status) -> Entry {
        self.status = status;
        self
    }

    pub fn with_rating(mut self, rating: Option<f64>) -> Entry {
        self.rating = rating.map(clamp_rating);
        self
    }

    pub fn with_notes<N: Into<String>>(mut self, notes: N) -> Entry {
        self.notes = notes.into();
        self
    }

    /// Plain key/value form used for storage.
    pub fn to_record(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Rebuilds an entry from the output of `to_record`.
    ///
    /// Missing `title`/`author` or a mistyped field is a `MalformedRecord`.
    /// Records without an `id` come back with id 0.
    pub fn from_record(record: Value) -> Result<Entry> {
        let mut entry: Entry = serde_json::from_value(record)
            .map_err(|e| Error::from(ErrorKind::MalformedRecord(e.to_string())))?;
        entry.rating = entry.rating.map(clamp_rating);
        Ok(entry)
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub(crate) fn assign_id(&mut self, id: EntryId) {
        self.id = id;
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn current_chapter(&self) -> u32 {
        self.current_chapter
    }

    pub fn total_chapters(&self) -> Option<u32> {
        self.total_chapters
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn rating(&self) -> Option<f64> {
        self.rating
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn last_updated(&self) -> OffsetDateTime {
        self.last_updated
    }

    /// `"12/40"`, or `"12/?"` when the total is unknown.
    pub fn progress(&self) -> String {
        match self.total_chapters {
            Some(total) => format!("{}/{}", self.current_chapter, total),
            None => format!("{}/?", self.current_chapter),
        }
    }

    /// True once a known total has been reached.
    pub fn is_caught_up(&self) -> bool {
        self.total_chapters
            .map_or(false, |total| self.current_chapter >= total)
    }

    pub fn set_title<T: Into<String>>(&mut self, title: T) {
        self.title = title.into();
        self.touch();
    }

    pub fn set_author<A: Into<String>>(&mut self, author: A) {
        self.author = author.into();
        self.touch();
    }

    pub fn set_current_chapter(&mut self, chapter: u32) {
        self.current_chapter = chapter;
        self.touch();
    }

    pub fn set_total_chapters(&mut self, total: Option<u32>) {
        self.total_chapters = total;
        self.touch();
    }

    pub fn set_status(&mut self, status: Status) {
        self.status = status;
        self.touch();
    }

    pub fn set_rating(&mut self, rating: Option<f64>) {
        self.rating = rating.map(clamp_rating);
        self.touch();
    }

    pub fn set_notes<N: Into<String>>(&mut self, notes: N) {
        self.notes = notes.into();
        self.touch();
    }

    // never moves backwards, even if the wall clock does
    fn touch(&mut self) {
        let now = timestamp::now();
        if now > self.last_updated {
            self.last_updated = now;
        }
    }
}

mod timestamp {
    use serde::{de, ser, Deserialize, Deserializer, Serializer};
    use time::format_description::well_known::Rfc3339;
    use time::format_description::FormatItem;
    use time::macros::format_description;
    use time::{OffsetDateTime, PrimitiveDateTime};

    // Older shelves were written with local, offset-less timestamps.
    const NAIVE: &[FormatItem<'static>] = format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]"
    );

    pub fn now() -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }

    pub fn serialize<S: Serializer>(value: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        let text = value.format(&Rfc3339).map_err(ser::Error::custom)?;
        serializer.serialize_str(&text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<OffsetDateTime, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse(&text).map_err(de::Error::custom)
    }

    pub fn parse(text: &str) -> Result<OffsetDateTime, time::error::Parse> {
        OffsetDateTime::parse(text, &Rfc3339)
            .or_else(|_| PrimitiveDateTime::parse(text, NAIVE).map(PrimitiveDateTime::assume_utc))
    }
}
