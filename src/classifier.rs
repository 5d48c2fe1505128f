//! Financial message classification
//!
//! Keeps debit/credit notifications from a raw inbox batch and extracts the amount,
//! direction, spending category and age of each one. Classification never fails:
//! missing or unusable fields fall back to sentinel values.

use crate::config::{AGE_UNKNOWN, AMOUNT_UNAVAILABLE, DATE_UNAVAILABLE, UNKNOWN_SENDER};
use crate::messages::RawMessage;
use chrono::{DateTime, Local, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// `INR` or `Rs`, optional period, then a comma-grouped number with optional fraction
static AMOUNT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i:INR|Rs)\.?\s*(\d+(?:,\d+)*(?:\.\d+)?)").expect("Invalid amount regex")
});

/// Keyword checks in priority order
const CATEGORY_KEYWORDS: &[(&str, Category)] = &[
    ("grocery", Category::Grocery),
    ("dining", Category::Dining),
    ("shopping", Category::Shopping),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Debited,
    Credited,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Debited => write!(f, "debited"),
            Direction::Credited => write!(f, "credited"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Grocery,
    Dining,
    Shopping,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Grocery => write!(f, "Grocery"),
            Category::Dining => write!(f, "Dining"),
            Category::Shopping => write!(f, "Shopping"),
        }
    }
}

/// A financial message with its extracted metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedMessage {
    pub id: String,
    pub body: String,
    pub sender: String,
    pub amount: String,
    pub date: Option<NaiveDate>,
    pub relative_age: String,
    pub direction: Direction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
}

impl ClassifiedMessage {
    /// Calendar date rendered with a chrono format string, or the N/A sentinel
    pub fn formatted_date(&self, format: &str) -> String {
        match self.date {
            Some(date) => date.format(format).to_string(),
            None => DATE_UNAVAILABLE.to_string(),
        }
    }
}

/// Classify a batch against the current time
pub fn classify(raw: &[RawMessage]) -> Vec<ClassifiedMessage> {
    classify_at(raw, Utc::now())
}

/// Classify a batch, measuring ages from `now`
pub fn classify_at(raw: &[RawMessage], now: DateTime<Utc>) -> Vec<ClassifiedMessage> {
    let classified: Vec<ClassifiedMessage> = raw
        .iter()
        .filter(|msg| is_transaction_alert(&msg.body))
        .map(|msg| classify_message(msg, now))
        .collect();

    debug!(
        input = raw.len(),
        kept = classified.len(),
        "Classified inbox batch"
    );
    classified
}

/// Case-sensitive retention test. Classification below lower-cases the body, so
/// "Debited" is dropped here even though `direction_of` would accept it.
pub fn is_transaction_alert(body: &str) -> bool {
    body.contains("debited") || body.contains("credited")
}

fn classify_message(msg: &RawMessage, now: DateTime<Utc>) -> ClassifiedMessage {
    let sent_at = sent_at(msg.date_sent);

    ClassifiedMessage {
        id: msg.id.clone(),
        body: msg.body.clone(),
        sender: msg
            .address
            .clone()
            .unwrap_or_else(|| UNKNOWN_SENDER.to_string()),
        amount: extract_amount(&msg.body).unwrap_or_else(|| AMOUNT_UNAVAILABLE.to_string()),
        date: sent_at.map(|t| t.with_timezone(&Local).date_naive()),
        relative_age: sent_at
            .map(|t| relative_age(t, now))
            .unwrap_or_else(|| AGE_UNKNOWN.to_string()),
        direction: direction_of(&msg.body),
        category: category_of(&msg.body),
    }
}

/// Numeric part after the first currency marker, commas kept
pub fn extract_amount(body: &str) -> Option<String> {
    AMOUNT_PATTERN
        .captures(body)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())
}

/// Anything without "debited" counts as credited
pub fn direction_of(body: &str) -> Direction {
    if body.to_lowercase().contains("debited") {
        Direction::Debited
    } else {
        Direction::Credited
    }
}

pub fn category_of(body: &str) -> Option<Category> {
    let lower = body.to_lowercase();
    CATEGORY_KEYWORDS
        .iter()
        .find(|(keyword, _)| lower.contains(keyword))
        .map(|(_, category)| *category)
}

/// Epoch milliseconds to a timestamp; non-positive or out-of-range values are unusable
fn sent_at(date_sent: Option<i64>) -> Option<DateTime<Utc>> {
    date_sent
        .filter(|ms| *ms > 0)
        .and_then(DateTime::from_timestamp_millis)
}

/// Minutes under an hour, hours under a day, days beyond that. Counts are floored.
pub fn relative_age(sent_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (now - sent_at).num_minutes().max(0);

    if minutes < 60 {
        format!("{} minute(s) ago", minutes)
    } else if minutes < 24 * 60 {
        format!("{} hour(s) ago", minutes / 60)
    } else {
        format!("{} day(s) ago", minutes / (24 * 60))
    }
}
