use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::Result;
use tokio::{
    sync::{mpsc, Notify},
    task::JoinHandle,
    time::Instant,
};
use tokio_util::sync::CancellationToken;

use crate::db::{ChangeHub, Database, ReportState, Subscription};

use super::{
    diff::diff_snapshots,
    event::{ImageUrls, LiveEvent},
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Shortest quiet gap that ends a burst, whatever the configured debounce.
pub const MIN_QUIET_WINDOW: Duration = Duration::from_millis(20);
/// A pass runs at least this often while writes keep arriving.
pub const MAX_COALESCE_DELAY: Duration = Duration::from_secs(1);

/// Fans store changes out to dashboard connections as incremental events.
#[derive(Clone)]
pub struct LiveBroadcaster {
    db: Database,
    hub: ChangeHub,
    debounce: Duration,
    urls: Arc<ImageUrls>,
}

impl LiveBroadcaster {
    /// A pass runs once the store has been quiet for `debounce` (at least [`MIN_QUIET_WINDOW`]).
    pub fn new(db: Database, hub: ChangeHub, debounce: Duration, urls: ImageUrls) -> Self {
        Self {
            db,
            hub,
            debounce: debounce.max(MIN_QUIET_WINDOW),
            urls: Arc::new(urls),
        }
    }

    /// Open a connection. The client receives a full `reportData` first when the store has data.
    pub async fn connect(&self) -> Result<LiveConnection> {
        let dirty = Arc::new(AtomicBool::new(false));
        let wake = Arc::new(Notify::new());

        // Subscribe before the first read so no write slips between them.
        let subscription = {
            let dirty = Arc::clone(&dirty);
            let wake = Arc::clone(&wake);
            self.hub.subscribe(move || {
                dirty.store(true, Ordering::Release);
                wake.notify_one();
            })
        };

        let (sink, events) = mpsc::unbounded_channel();
        let initial = self.db.read_report_data().await?;
        if let Some(state) = &initial {
            let _ = sink.send(LiveEvent::ReportData(state.clone()).with_image_urls(&self.urls));
        }

        let cancel = CancellationToken::new();
        let worker = ConnectionWorker {
            db: self.db.clone(),
            hub: self.hub.clone(),
            debounce: self.debounce,
            urls: Arc::clone(&self.urls),
            dirty,
            wake,
            sink,
            last_sent: initial,
        };
        let task = tokio::spawn(worker.run(subscription, cancel.clone()));

        log_debug!("live connection opened");
        Ok(LiveConnection {
            events,
            cancel,
            task: Some(task),
        })
    }
}

/// Client side of one dashboard connection. Dropping it disconnects.
pub struct LiveConnection {
    events: mpsc::UnboundedReceiver<LiveEvent>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl LiveConnection {
    /// Next event, or `None` once the connection has ended.
    pub async fn recv(&mut self) -> Option<LiveEvent> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<LiveEvent> {
        self.events.try_recv().ok()
    }

    /// Release the store subscription and any pending pass, then wait for the worker to finish.
    pub async fn disconnect(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                log_warn!("live connection worker ended abnormally: {err}");
            }
        }
    }
}

impl Drop for LiveConnection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct ConnectionWorker {
    db: Database,
    hub: ChangeHub,
    debounce: Duration,
    urls: Arc<ImageUrls>,
    dirty: Arc<AtomicBool>,
    wake: Arc<Notify>,
    sink: mpsc::UnboundedSender<LiveEvent>,
    last_sent: Option<ReportState>,
}

impl ConnectionWorker {
    async fn run(mut self, subscription: Subscription, cancel: CancellationToken) {
        let store_closed = self.hub.closed_token();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = store_closed.cancelled() => break,
                _ = self.sink.closed() => break,
                _ = self.wake.notified() => {}
            }

            if !self.wait_for_quiet(&cancel).await {
                break;
            }
            if !self.dirty.swap(false, Ordering::AcqRel) {
                continue;
            }
            if let Err(err) = self.push_changes().await {
                log_warn!("live diff pass failed: {err:#}");
            }
        }

        subscription.unsubscribe();
        log_info!("live connection closed");
    }

    /// Sleep until no write has arrived for one debounce window, re-arming on every wake.
    /// Returns `false` if the connection was cancelled meanwhile.
    async fn wait_for_quiet(&self, cancel: &CancellationToken) -> bool {
        let deadline = Instant::now() + MAX_COALESCE_DELAY;
        loop {
            let quiet_until = (Instant::now() + self.debounce).min(deadline);
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = tokio::time::sleep_until(quiet_until) => return true,
                _ = self.wake.notified() => {
                    if Instant::now() >= deadline {
                        return true;
                    }
                }
            }
        }
    }

    async fn push_changes(&mut self) -> Result<()> {
        let current = self.db.read_report_data().await?;
        let events = diff_snapshots(self.last_sent.as_ref(), current.as_ref());
        if events.is_empty() {
            return Ok(());
        }

        log_debug!("pushing {} live event(s)", events.len());
        for event in events {
            // A closed connection makes this a no-op; the loop exits on its next turn.
            let _ = self.sink.send(event.with_image_urls(&self.urls));
        }
        self.last_sent = current;
        Ok(())
    }
}
