//! Inbox monitor - single control task for the ledger
//!
//! The task owns the `Ledger` and the `RefreshScheduler`. Intents from the
//! presentation layer and scheduler ticks are handled one at a time, and every
//! state change is published as a `Snapshot` on a watch channel.

use crate::classifier::ClassifiedMessage;
use crate::error::{Error, Result};
use crate::ledger::{Ledger, PermissionState};
use crate::messages::MessageSource;
use crate::scheduler::RefreshScheduler;
use crate::view::{DirectionFilter, ViewState};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const INTENT_QUEUE: usize = 32;

/// User actions coming from the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    SetDirectionFilter(DirectionFilter),
    SetSearchText(String),
    RequestRefresh,
    GrantPermission,
    RevokePermission,
}

impl FromStr for Intent {
    type Err = Error;

    /// Text commands: `filter <all|debited|credited>`, `search [text]`, `refresh`, `grant`, `revoke`
    fn from_str(s: &str) -> Result<Self> {
        let line = s.trim();
        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };

        match command.to_lowercase().as_str() {
            "filter" => Ok(Intent::SetDirectionFilter(rest.parse()?)),
            "search" => Ok(Intent::SetSearchText(rest.to_string())),
            "refresh" => Ok(Intent::RequestRefresh),
            "grant" => Ok(Intent::GrantPermission),
            "revoke" => Ok(Intent::RevokePermission),
            other => Err(Error::Parse(format!("unknown command: {}", other))),
        }
    }
}

/// What the presentation layer renders
#[derive(Debug, Clone, Default, Serialize)]
pub struct Snapshot {
    pub permission: PermissionState,
    pub view: ViewState,
    pub visible: Vec<ClassifiedMessage>,
    pub total: usize,
    pub last_refreshed: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl Snapshot {
    pub fn of<S: MessageSource>(ledger: &Ledger<S>) -> Self {
        Self {
            permission: ledger.permission(),
            view: ledger.view().clone(),
            visible: ledger.visible(),
            total: ledger.len(),
            last_refreshed: ledger.last_refreshed(),
            last_error: ledger.last_error().map(str::to_string),
        }
    }
}

/// Handle to a running monitor task
pub struct MonitorHandle {
    intents: mpsc::Sender<Intent>,
    snapshots: watch::Receiver<Snapshot>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Spawn the control task. Polling starts once permission is granted.
    pub fn spawn<S: MessageSource + 'static>(ledger: Ledger<S>, period: Duration) -> Self {
        let (intent_tx, intent_rx) = mpsc::channel(INTENT_QUEUE);
        let (snapshot_tx, snapshot_rx) = watch::channel(Snapshot::of(&ledger));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(run(
            ledger,
            RefreshScheduler::new(period),
            intent_rx,
            snapshot_tx,
            shutdown_rx,
        ));

        Self {
            intents: intent_tx,
            snapshots: snapshot_rx,
            shutdown: shutdown_tx,
            task,
        }
    }

    pub async fn send(&self, intent: Intent) -> Result<()> {
        self.intents
            .send(intent)
            .await
            .map_err(|_| Error::MonitorStopped)
    }

    /// Extra sender for input loops that outlive a borrow of the handle
    pub fn sender(&self) -> mpsc::Sender<Intent> {
        self.intents.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    /// Stop the scheduler and wait for the task to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            warn!("Inbox monitor task failed: {}", e);
        }
    }
}

async fn run<S: MessageSource + 'static>(
    mut ledger: Ledger<S>,
    mut scheduler: RefreshScheduler,
    mut intents: mpsc::Receiver<Intent>,
    snapshots: watch::Sender<Snapshot>,
    mut shutdown: oneshot::Receiver<()>,
) {
    info!(
        period_ms = scheduler.period().as_millis() as u64,
        "Inbox monitor started"
    );

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            intent = intents.recv() => match intent {
                Some(intent) => handle_intent(&mut ledger, &mut scheduler, intent).await,
                None => break,
            },
            _ = scheduler.tick() => {
                if ledger.is_permitted() {
                    refresh(&mut ledger).await;
                }
            }
        }

        snapshots.send_replace(Snapshot::of(&ledger));
    }

    scheduler.stop();
    info!("Inbox monitor stopped");
}

async fn handle_intent<S: MessageSource + 'static>(
    ledger: &mut Ledger<S>,
    scheduler: &mut RefreshScheduler,
    intent: Intent,
) {
    debug!(?intent, "Handling intent");

    match intent {
        Intent::SetDirectionFilter(direction) => ledger.set_direction_filter(direction),
        Intent::SetSearchText(search) => ledger.set_search_text(search),
        Intent::RequestRefresh => {
            if ledger.is_permitted() {
                refresh(ledger).await;
            } else {
                warn!("Refresh ignored: SMS permission not granted");
            }
        }
        Intent::GrantPermission => {
            if ledger.grant_permission() {
                refresh(ledger).await;
                scheduler.start();
            } else {
                scheduler.stop();
            }
        }
        Intent::RevokePermission => {
            ledger.revoke_permission();
            scheduler.stop();
        }
    }
}

/// Run one fetch off the async thread. The loop awaits it, so cycles never overlap.
async fn refresh<S: MessageSource + 'static>(ledger: &mut Ledger<S>) {
    let source = ledger.source();
    let filter = ledger.list_filter();

    let fetched = match tokio::task::spawn_blocking(move || source.list_messages(&filter)).await {
        Ok(result) => result,
        Err(e) => Err(Error::Io(std::io::Error::other(format!(
            "fetch task failed: {}",
            e
        )))),
    };

    // apply_fetch logs failures and keeps the previous collection
    let _ = ledger.apply_fetch(fetched, Utc::now());
}
