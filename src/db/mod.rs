use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use log::{error, info};
use rusqlite::Connection;
use tokio::sync::oneshot;

pub mod change_hub;
pub mod helpers;
mod legacy;
pub mod metadata_codec;
mod migrations;
pub mod models;
mod repositories;

pub use change_hub::{ChangeHub, Subscription};
pub use legacy::{LEGACY_DETAILS_FILE, LEGACY_REPORT_FILE};
pub use migrations::latest_version;
pub use models::{
    BoundingBox, Comparison, ComparisonDetails, ComparisonStatus, DiffDiagnostics,
    MetadataBundle, MetadataKey, Properties, ReportState, ReportSummary, Viewport,
};

pub const DB_FILE_NAME: &str = "vizcheck.db";

/// Readers in other processes wait this long for the writer's lock before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct DatabaseInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DatabaseInner {
    fn shutdown(&self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                error!("Failed to send shutdown to DB thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join DB thread: {join_err:?}");
            }
        }
    }
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Handle to the comparison store.
///
/// One worker thread owns the SQLite connection and runs every task in arrival order; clones
/// share that worker. Mutations signal the injected [`ChangeHub`] once they have committed.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
    hub: ChangeHub,
    db_path: Arc<PathBuf>,
    state_dir: Arc<PathBuf>,
    applied_on_open: Arc<Vec<u32>>,
}

impl Database {
    /// Open (or create) the store inside `state_dir`, migrate it, and run any pending legacy
    /// imports before returning.
    pub fn open(state_dir: impl Into<PathBuf>, hub: ChangeHub) -> Result<Self> {
        let state_dir = state_dir.into();
        std::fs::create_dir_all(&state_dir).with_context(|| {
            format!("failed to create state directory {}", state_dir.display())
        })?;
        let db_path = state_dir.join(DB_FILE_NAME);

        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<Vec<u32>>>();
        let path_for_thread = db_path.clone();
        let state_dir_for_thread = state_dir.clone();

        let worker = thread::Builder::new()
            .name("vizcheck-db".into())
            .spawn(move || {
                let mut conn = match open_connection(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };

                let init_result = migrations::run_migrations(&mut conn)
                    .context("failed to run database migrations")
                    .and_then(|applied| {
                        legacy::run_legacy_imports(&mut conn, &state_dir_for_thread)
                            .context("failed to record legacy import state")?;
                        Ok(applied)
                    });
                let failed = init_result.is_err();
                if ready_tx.send(init_result).is_err() {
                    error!("DB initialization receiver dropped before ready signal");
                    return;
                }
                if failed {
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => {
                            task(&mut conn);
                        }
                        DbCommand::Shutdown => break,
                    }
                }

                info!("Database thread shutting down");
            })
            .with_context(|| "failed to spawn database worker thread")?;

        let applied = match ready_rx.recv() {
            Ok(result) => result,
            Err(_) => Err(anyhow!("database worker exited before signaling readiness")),
        };
        let applied = match applied {
            Ok(applied) => applied,
            Err(err) => {
                let _ = worker.join();
                return Err(err);
            }
        };

        info!("Comparison store ready at {}", db_path.display());

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            hub,
            db_path: Arc::new(db_path),
            state_dir: Arc::new(state_dir),
            applied_on_open: Arc::new(applied),
        })
    }

    pub fn path(&self) -> &Path {
        self.db_path.as_path()
    }

    pub fn state_dir(&self) -> &Path {
        self.state_dir.as_path()
    }

    pub fn hub(&self) -> &ChangeHub {
        &self.hub
    }

    /// Migration versions this handle applied while opening; empty when the file was current.
    pub fn migrations_applied_on_open(&self) -> &[u32] {
        self.applied_on_open.as_slice()
    }

    /// Run a read-only task on the worker thread.
    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("DB caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to DB thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database thread terminated unexpectedly"))?
    }

    /// Like [`execute`](Self::execute), then signal subscribers once the task has returned `Ok`.
    pub(crate) async fn execute_write<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let result = self.execute(task).await?;
        self.hub.notify();
        Ok(result)
    }

    /// A delete-style write that only signals subscribers when it removed something.
    pub(crate) async fn execute_removal<F>(&self, task: F) -> Result<bool>
    where
        F: FnOnce(&mut Connection) -> Result<bool> + Send + 'static,
    {
        let removed = self.execute(task).await?;
        if removed {
            self.hub.notify();
        }
        Ok(removed)
    }

    /// Listener runs after every committed mutation, with no payload.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.hub.subscribe(listener)
    }

    pub async fn get_schema_version(&self) -> Result<u32> {
        self.execute(|conn| migrations::schema_version(conn)).await
    }

    /// Stop notifications, release subscribers, and stop the worker. Later calls fail.
    pub fn close(&self) {
        self.hub.close();
        self.inner.shutdown();
    }
}

fn open_connection(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("failed to open SQLite database {}", path.display()))?;

    conn.busy_timeout(BUSY_TIMEOUT)
        .context("failed to set busy timeout")?;
    if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
        error!("Failed to enable WAL mode: {err}");
    }
    if let Err(err) = conn.pragma_update(None, "synchronous", "NORMAL") {
        error!("Failed to relax synchronous mode: {err}");
    }
    if let Err(err) = conn.pragma_update(None, "foreign_keys", "ON") {
        error!("Failed to enable foreign keys: {err}");
    }

    Ok(conn)
}
