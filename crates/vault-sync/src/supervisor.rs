//! # Polling Supervisor
//!
//! Owns the set of active share channels and starts or stops them in
//! response to dispatched actions.
//!
//! ## Supervisor Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Supervisor Architecture                          │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                         Supervisor                               │  │
//! │  │                                                                  │  │
//! │  │  • StartEventPolling ──► one channel per share in the replica    │  │
//! │  │  • SharesSync        ──► channels for newly seen shares          │  │
//! │  │  • StopEventPolling  ──► close every channel                     │  │
//! │  │  • prunes channels that closed themselves                        │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────┐            │
//! │  │ ShareChannel A │  │ ShareChannel B │  │ ShareChannel C │            │
//! │  └────────────────┘  └────────────────┘  └────────────────┘            │
//! │                                                                         │
//! │  SupervisorHandle::wake() dispatches WakeupPolling, which every        │
//! │  channel's wakeup listener turns into an immediate poll.               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

use vault_core::selectors::select_share_ids;
use vault_core::{log_id, Action, ActionKind};

use crate::channel::{spawn_share_channel, ChannelHandle};
use crate::context::SyncContext;

// =============================================================================
// Supervisor Status
// =============================================================================

/// Current polling status for external queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupervisorStatus {
    /// Whether polling was started and not stopped since.
    pub polling: bool,

    /// Shares with an open channel.
    pub active_channels: Vec<String>,
}

// =============================================================================
// Supervisor
// =============================================================================

pub struct Supervisor {
    ctx: SyncContext,
    channels: BTreeMap<String, ChannelHandle>,
    polling: bool,
    status: Arc<RwLock<SupervisorStatus>>,
}

impl Supervisor {
    /// Spawns the supervisor task.
    pub fn spawn(ctx: SyncContext) -> SupervisorHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let status = Arc::new(RwLock::new(SupervisorStatus::default()));
        let rx = ctx.store.subscribe_kinds(&[
            ActionKind::StartEventPolling,
            ActionKind::StopEventPolling,
            ActionKind::SharesSync,
            ActionKind::ShareDeleteSync,
            ActionKind::VaultDeleteSuccess,
        ]);

        let supervisor = Supervisor {
            ctx: ctx.clone(),
            channels: BTreeMap::new(),
            polling: false,
            status: status.clone(),
        };
        let task = tokio::spawn(supervisor.run(rx, shutdown_rx));

        SupervisorHandle {
            ctx,
            shutdown_tx,
            status,
            task,
        }
    }

    async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<Action>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        info!("Polling supervisor started");

        loop {
            tokio::select! {
                action = rx.recv() => match action {
                    Some(Action::StartEventPolling) => self.start(),
                    Some(Action::StopEventPolling) => self.stop().await,
                    Some(Action::SharesSync { shares, .. }) if self.polling => {
                        for share_id in shares.keys() {
                            self.open(share_id);
                        }
                    }
                    Some(_) => {}
                    None => break,
                },

                _ = shutdown_rx.recv() => {
                    info!("Supervisor received shutdown");
                    break;
                }
            }

            self.prune();
            self.publish_status().await;
        }

        self.stop().await;
        self.publish_status().await;
        info!("Polling supervisor stopped");
    }

    fn start(&mut self) {
        self.polling = true;
        let share_ids = self.ctx.store.read(select_share_ids);
        info!(shares = share_ids.len(), "Start event polling");

        for share_id in &share_ids {
            self.open(share_id);
        }
    }

    /// Opens a channel for `share_id` unless one is already running.
    fn open(&mut self, share_id: &str) {
        if self.channels.get(share_id).is_some_and(|c| !c.is_closed()) {
            return;
        }

        debug!(share_id = %log_id(share_id), "Opening channel");
        let handle = spawn_share_channel(self.ctx.clone(), share_id);
        self.channels.insert(share_id.to_string(), handle);
    }

    async fn stop(&mut self) {
        self.polling = false;
        if self.channels.is_empty() {
            return;
        }

        info!(channels = self.channels.len(), "Stop event polling");
        let channels = std::mem::take(&mut self.channels);
        for handle in channels.values() {
            handle.close();
        }
        for (_, handle) in channels {
            handle.closed().await;
        }
    }

    /// Forgets channels that closed on their own (share disabled or deleted).
    fn prune(&mut self) {
        self.channels.retain(|_, handle| !handle.is_closed());
    }

    async fn publish_status(&self) {
        let mut status = self.status.write().await;
        status.polling = self.polling;
        status.active_channels = self.channels.keys().cloned().collect();
    }
}

// =============================================================================
// Supervisor Handle (for external control)
// =============================================================================

/// Handle for controlling a running [`Supervisor`].
pub struct SupervisorHandle {
    ctx: SyncContext,
    shutdown_tx: mpsc::Sender<()>,
    status: Arc<RwLock<SupervisorStatus>>,
    task: tokio::task::JoinHandle<()>,
}

impl SupervisorHandle {
    pub async fn status(&self) -> SupervisorStatus {
        self.status.read().await.clone()
    }

    /// Forces every open channel to poll now.
    pub fn wake(&self) {
        self.ctx.store.dispatch(Action::WakeupPolling);
    }

    /// Closes every channel and stops the supervisor.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.task.await;
    }
}
