//! Current classified-message state and the refresh cycle that replaces it

use crate::classifier::{classify_at, ClassifiedMessage};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::messages::{ListFilter, MessageSource, RawMessage};
use crate::view::{apply_view, DirectionFilter, ViewState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    /// Never requested
    #[default]
    Unknown,
    Granted,
    Denied,
}

/// Owns the classified collection and the view settings.
///
/// The collection is only ever replaced wholesale by a successful fetch.
pub struct Ledger<S: MessageSource> {
    source: Arc<S>,
    filter: ListFilter,
    messages: Vec<ClassifiedMessage>,
    view: ViewState,
    permission: PermissionState,
    last_refreshed: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl<S: MessageSource> Ledger<S> {
    pub fn new(source: S, config: &Config) -> Self {
        Self::with_shared_source(Arc::new(source), config)
    }

    pub fn with_shared_source(source: Arc<S>, config: &Config) -> Self {
        Self {
            source,
            filter: ListFilter::inbox(config.max_count),
            messages: Vec::new(),
            view: ViewState::default(),
            permission: PermissionState::Unknown,
            last_refreshed: None,
            last_error: None,
        }
    }

    pub fn source(&self) -> Arc<S> {
        Arc::clone(&self.source)
    }

    pub fn list_filter(&self) -> ListFilter {
        self.filter
    }

    /// Ask the source for access. A denial sticks until the next request.
    pub fn grant_permission(&mut self) -> bool {
        let granted = self.source.request_permission();
        self.permission = if granted {
            info!("SMS permission granted");
            PermissionState::Granted
        } else {
            warn!("SMS permission denied");
            PermissionState::Denied
        };
        granted
    }

    pub fn revoke_permission(&mut self) {
        info!("SMS permission revoked");
        self.permission = PermissionState::Denied;
    }

    pub fn permission(&self) -> PermissionState {
        self.permission
    }

    pub fn is_permitted(&self) -> bool {
        self.permission == PermissionState::Granted
    }

    /// Fetch, classify and replace the collection in one step
    pub fn refresh(&mut self) -> Result<usize> {
        self.ensure_permitted()?;
        let fetched = self.source.list_messages(&self.filter);
        self.apply_fetch(fetched, Utc::now())
    }

    pub fn ensure_permitted(&self) -> Result<()> {
        if self.is_permitted() {
            Ok(())
        } else {
            Err(Error::PermissionDenied(format!(
                "permission is {:?}",
                self.permission
            )))
        }
    }

    /// Apply the outcome of a fetch. On failure the previous collection is kept.
    pub fn apply_fetch(
        &mut self,
        fetched: Result<Vec<RawMessage>>,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        match fetched {
            Ok(raw) => {
                self.messages = classify_at(&raw, now);
                self.last_refreshed = Some(now);
                self.last_error = None;
                info!(
                    fetched = raw.len(),
                    classified = self.messages.len(),
                    "Refreshed ledger"
                );
                Ok(self.messages.len())
            }
            Err(e) => {
                error!("Failed to fetch messages: {}", e);
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    pub fn set_direction_filter(&mut self, direction: DirectionFilter) {
        self.view = self.view.with_direction(direction);
    }

    pub fn set_search_text(&mut self, search: impl Into<String>) {
        self.view = self.view.with_search(search);
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn messages(&self) -> &[ClassifiedMessage] {
        &self.messages
    }

    /// Messages passing the current view
    pub fn visible(&self) -> Vec<ClassifiedMessage> {
        apply_view(&self.messages, &self.view)
    }

    pub fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.last_refreshed
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
