//! View filtering over classified messages

use crate::classifier::{ClassifiedMessage, Direction};
use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DirectionFilter {
    #[default]
    All,
    Debited,
    Credited,
}

impl DirectionFilter {
    pub fn matches(&self, direction: Direction) -> bool {
        match self {
            DirectionFilter::All => true,
            DirectionFilter::Debited => direction == Direction::Debited,
            DirectionFilter::Credited => direction == Direction::Credited,
        }
    }
}

impl FromStr for DirectionFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(DirectionFilter::All),
            "debited" | "debit" => Ok(DirectionFilter::Debited),
            "credited" | "credit" => Ok(DirectionFilter::Credited),
            other => Err(Error::Parse(format!("unknown direction filter: {}", other))),
        }
    }
}

impl std::fmt::Display for DirectionFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DirectionFilter::All => write!(f, "all"),
            DirectionFilter::Debited => write!(f, "debited"),
            DirectionFilter::Credited => write!(f, "credited"),
        }
    }
}

/// Filter and search settings chosen in the presentation layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewState {
    pub direction: DirectionFilter,
    pub search: String,
}

impl ViewState {
    pub fn new(direction: DirectionFilter, search: impl Into<String>) -> Self {
        Self {
            direction,
            search: search.into(),
        }
    }

    pub fn with_direction(&self, direction: DirectionFilter) -> Self {
        Self {
            direction,
            search: self.search.clone(),
        }
    }

    pub fn with_search(&self, search: impl Into<String>) -> Self {
        Self {
            direction: self.direction,
            search: search.into(),
        }
    }

    pub fn accepts(&self, message: &ClassifiedMessage) -> bool {
        self.direction.matches(message.direction) && matches_search(message, &self.search)
    }
}

fn matches_search(message: &ClassifiedMessage, search: &str) -> bool {
    if search.is_empty() {
        return true;
    }
    let needle = search.to_lowercase();
    message.body.to_lowercase().contains(&needle) || message.sender.to_lowercase().contains(&needle)
}

/// Messages passing both the direction filter and the search text, in input order
pub fn apply_view(classified: &[ClassifiedMessage], view: &ViewState) -> Vec<ClassifiedMessage> {
    classified
        .iter()
        .filter(|m| view.accepts(m))
        .cloned()
        .collect()
}
