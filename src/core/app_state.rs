use std::sync::{Arc, RwLock};

use crate::core::config::TunerConfig;
use crate::core::registry::FlavorRegistry;
use crate::dom::browser::PortalSession;
use crate::events::EventBus;
use crate::manager::PortalContextManager;
use crate::prefs::Prefs;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<TunerConfig>,
    pub registry: Arc<FlavorRegistry>,
    pub bus: EventBus,
    pub prefs: Arc<RwLock<Prefs>>,
    /// Absent when no browser is installed or no portal URL is configured —
    /// the HTTP surface then serves offline snapshot detection only.
    pub manager: Option<Arc<PortalContextManager>>,
    /// The browser session backing `manager`, kept for shutdown.
    pub session: Option<Arc<PortalSession>>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("attached", &self.manager.is_some())
            .field("flavors", &self.registry.flavors().len())
            .finish()
    }
}

impl AppState {
    pub fn new(config: TunerConfig, registry: FlavorRegistry, bus: EventBus) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            bus,
            prefs: Arc::new(RwLock::new(crate::prefs::load())),
            manager: None,
            session: None,
        }
    }

    pub fn with_manager(mut self, manager: Arc<PortalContextManager>) -> Self {
        self.manager = Some(manager);
        self
    }

    pub fn with_session(mut self, session: Arc<PortalSession>) -> Self {
        self.session = Some(session);
        self
    }
}
