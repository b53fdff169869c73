pub mod cli;
pub mod comparison;
pub mod db;
pub mod error;
pub mod grouping;
pub mod live;
pub mod settings;
pub mod utils;

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;

use comparison::{ComparisonEngine, DiffCollaborator};
use db::{ChangeHub, Database};
use live::{ImageUrls, LiveBroadcaster};
use settings::SettingsStore;

/// Everything a process needs, wired around one state directory.
///
/// The [`ChangeHub`] is created here and handed to both the store and the broadcaster; nothing
/// else can signal or observe store changes.
pub struct App {
    pub hub: ChangeHub,
    pub db: Database,
    pub settings: SettingsStore,
    pub engine: ComparisonEngine,
    pub live: LiveBroadcaster,
}

impl App {
    pub fn open(state_dir: impl Into<PathBuf>, differ: Arc<dyn DiffCollaborator>) -> Result<Self> {
        let state_dir = state_dir.into();
        let settings = SettingsStore::in_state_dir(&state_dir)?;
        let current = settings.current();

        let hub = ChangeHub::new();
        let db = Database::open(&state_dir, hub.clone())?;
        let engine = ComparisonEngine::new(db.clone(), differ, &current);
        let live = LiveBroadcaster::new(
            db.clone(),
            hub.clone(),
            current.live_debounce(),
            ImageUrls::new(&state_dir, current.image_url_prefix.clone()),
        );

        Ok(Self {
            hub,
            db,
            settings,
            engine,
            live,
        })
    }

    /// Ends live connections and stops the store worker.
    pub fn close(&self) {
        self.db.close();
    }
}

/// Entry point for the `vizcheck` binary.
pub fn run() -> Result<()> {
    cli::run()
}
