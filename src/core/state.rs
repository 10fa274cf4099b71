use std::sync::Arc;

use crate::broadcast::ExamBroadcaster;
use crate::core::clock::Clock;
use crate::core::config::Settings;
use crate::session::orchestrator::GradingPolicy;
use crate::session::{Orchestrator, SessionRegistry};
use crate::store::Stores;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    stores: Stores,
    registry: Arc<SessionRegistry>,
    orchestrator: Arc<Orchestrator>,
    broadcaster: ExamBroadcaster,
    clock: Clock,
}

impl AppState {
    pub(crate) fn new(settings: Settings, stores: Stores) -> Self {
        Self::with_clock(settings, stores, Clock::system())
    }

    pub(crate) fn with_clock(settings: Settings, stores: Stores, clock: Clock) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let broadcaster = ExamBroadcaster::new(settings.session().broadcast_buffer);
        let policy = GradingPolicy {
            scale_max: settings.grading().scale_max,
            strict_manual_grading: settings.grading().strict_manual_grading,
        };
        let orchestrator = Arc::new(Orchestrator::new(
            registry.clone(),
            stores.clone(),
            broadcaster.clone(),
            clock.clone(),
            policy,
        ));

        Self {
            inner: Arc::new(InnerState {
                settings,
                stores,
                registry,
                orchestrator,
                broadcaster,
                clock,
            }),
        }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn stores(&self) -> &Stores {
        &self.inner.stores
    }

    pub(crate) fn registry(&self) -> &SessionRegistry {
        &self.inner.registry
    }

    pub(crate) fn orchestrator(&self) -> &Orchestrator {
        &self.inner.orchestrator
    }

    pub(crate) fn broadcaster(&self) -> &ExamBroadcaster {
        &self.inner.broadcaster
    }

    pub(crate) fn clock(&self) -> &Clock {
        &self.inner.clock
    }
}
