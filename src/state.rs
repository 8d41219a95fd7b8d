//! Shared application state for all routes.

use crate::config::{LoanPolicy, Settings};
use crate::store::LibraryStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LibraryStore>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(store: Arc<dyn LibraryStore>, settings: Settings) -> Self {
        AppState {
            store,
            settings: Arc::new(settings),
        }
    }

    pub fn store(&self) -> &dyn LibraryStore {
        self.store.as_ref()
    }

    pub fn policy(&self) -> &LoanPolicy {
        &self.settings.policy
    }
}
