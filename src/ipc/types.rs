use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use crate::booking::BookingWizard;
use crate::config::Config;
use crate::insights::InsightService;
use crate::model::User;
use crate::store::{MemoryStore, SqliteStore, Store};

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// The signed-in user. Handlers receive identity from here and never look it
/// up again on their own.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
}

#[derive(Debug, Clone)]
pub struct Subscription {
    pub conversation_id: String,
    pub user_id: String,
}

pub struct AppState {
    pub config: Config,
    pub workspace: Option<PathBuf>,
    pub store: Option<Box<dyn Store>>,
    pub session: Option<Session>,
    pub wizards: HashMap<String, BookingWizard>,
    pub subscriptions: HashMap<String, Subscription>,
    /// Push lines produced while handling the current request; the main loop
    /// writes them after the response and clears the queue.
    pub events: Vec<serde_json::Value>,
    pub insights: InsightService,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let insights = InsightService::from_config(&config.ai);
        Self {
            config,
            workspace: None,
            store: None,
            session: None,
            wizards: HashMap::new(),
            subscriptions: HashMap::new(),
            events: Vec::new(),
            insights,
        }
    }

    pub fn open_workspace(&mut self, path: &Path) -> anyhow::Result<()> {
        let store = SqliteStore::open(path)?;
        self.replace_store(Box::new(store));
        self.workspace = Some(path.to_path_buf());
        info!(workspace = %path.display(), "workspace opened");
        Ok(())
    }

    pub fn open_demo(&mut self) {
        self.replace_store(Box::new(MemoryStore::with_demo_users()));
        info!("demo store opened");
    }

    /// Everything tied to the previous store goes with it.
    fn replace_store(&mut self, store: Box<dyn Store>) {
        self.store = Some(store);
        self.workspace = None;
        self.session = None;
        self.wizards.clear();
        self.subscriptions.clear();
        self.events.clear();
    }
}
