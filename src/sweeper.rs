//! Background deadline sweep.
//!
//! Rescuers who never answer are not an error path, they are the common
//! case. The sweeper runs on a fixed interval and, each tick, expires every
//! pending request whose deadline has passed, then fails every active
//! session left with nothing pending and nothing accepted (which also
//! catches sessions that opened with zero candidates).
//!
//! Every transition is conditional on the row's current status, so a tick is
//! idempotent and never tramples a response that landed first. A failed tick
//! is logged and simply retried on the next one.

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DispatchConfig;
use crate::error::DispatchError;
use crate::notify::SharedNotifier;
use crate::session;
use crate::storage::Storage;

/// What one sweep pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepOutcome {
    /// Pending requests moved to `expired`.
    pub requests_expired: u64,
    /// Active sessions moved to `failed`.
    pub sessions_failed: u64,
}

/// Periodic expiry daemon.
pub struct Sweeper {
    storage: Storage,
    config: DispatchConfig,
    notifier: SharedNotifier,
}

impl Sweeper {
    pub fn new(storage: Storage, config: DispatchConfig, notifier: SharedNotifier) -> Self {
        Self {
            storage,
            config,
            notifier,
        }
    }

    /// Run one sweep pass against the given clock instant.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> Result<SweepOutcome, DispatchError> {
        let requests_expired = self.storage.expire_overdue_requests(now).await?;

        let mut sessions_failed = 0;
        for session in self.storage.exhausted_active_sessions().await? {
            if session::on_session_exhausted(
                &self.storage,
                &self.config,
                self.notifier.as_ref(),
                &session,
            )
            .await?
            {
                sessions_failed += 1;
            }
        }

        if requests_expired > 0 || sessions_failed > 0 {
            info!(requests_expired, sessions_failed, "sweep pass");
        } else {
            debug!("sweep pass found nothing overdue");
        }

        Ok(SweepOutcome {
            requests_expired,
            sessions_failed,
        })
    }

    /// Run until shutdown is signalled.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.config.sweep_interval.as_secs(),
            "expiry sweeper starting"
        );

        let mut interval = tokio::time::interval(self.config.sweep_interval);
        // Skip the first immediate tick
        interval.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("expiry sweeper shutting down");
                    break;
                }

                _ = interval.tick() => {
                    if let Err(e) = self.sweep_once(Utc::now()).await {
                        // Retried on the next tick; nothing is left stuck
                        warn!(error = %e, "sweep pass failed");
                    }
                }
            }
        }
    }
}
