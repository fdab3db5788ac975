use std::sync::Arc;

use anyhow::{Context, Result};
use shared::protocol::AuthEvent;
use storage::Storage;
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{info, warn};

pub mod config;
pub mod coordinator;
pub mod draft;
pub mod error;
pub mod migration;
pub mod trip_service;

pub use config::{load_settings, SyncSettings};
pub use coordinator::{merge_trips, TripStorage};
pub use draft::{insert_tour_days, DraftState, TripDraftController};
pub use error::{DraftError, MigrationError, TripServiceError};
pub use migration::{GuestMigration, MigrationOutcome};
pub use trip_service::{HttpTripService, MissingTripService, TripService};

const AUTH_EVENT_CAPACITY: usize = 16;

/// The trip list, the guest migration subscriber and the draft, wired to one store.
pub struct PlannerEngine {
    trips: Arc<TripStorage>,
    migration: Arc<GuestMigration>,
    draft: Arc<TripDraftController>,
    auth_events: broadcast::Sender<AuthEvent>,
    migration_task: JoinHandle<()>,
}

impl PlannerEngine {
    /// Opens the local store and picks the HTTP trip service when an API URL is configured.
    pub async fn initialize(settings: &SyncSettings) -> Result<Self> {
        let database_url = config::prepare_database_url(&settings.database_url)?;
        let store = Storage::new(&database_url)
            .await
            .with_context(|| format!("failed to open local trip store at {database_url}"))?;

        let service: Arc<dyn TripService> = match settings.api_base_url.as_deref() {
            Some(raw) => {
                let base_url = config::normalize_api_base_url(raw)?;
                info!(api = %base_url, "trips: remote sync enabled");
                Arc::new(HttpTripService::from_settings(&base_url, settings)?)
            }
            None => {
                info!("trips: no API configured, running local-only");
                Arc::new(MissingTripService)
            }
        };

        Ok(Self::new_with_dependencies(store, service, settings))
    }

    pub fn new_with_dependencies(
        store: Storage,
        service: Arc<dyn TripService>,
        settings: &SyncSettings,
    ) -> Self {
        let trips = TripStorage::new(store, service);
        let migration = GuestMigration::new(trips.clone());
        let draft = TripDraftController::with_migration_flag(
            trips.clone(),
            settings.autosave_delay(),
            migration.subscribe_migrating(),
        );
        let (auth_events, receiver) = broadcast::channel(AUTH_EVENT_CAPACITY);
        let migration_task = migration.spawn(receiver);

        Self {
            trips,
            migration,
            draft,
            auth_events,
            migration_task,
        }
    }

    pub fn trips(&self) -> &Arc<TripStorage> {
        &self.trips
    }

    pub fn migration(&self) -> &Arc<GuestMigration> {
        &self.migration
    }

    pub fn draft(&self) -> &Arc<TripDraftController> {
        &self.draft
    }

    /// Announces an auth transition to the migration subscriber.
    pub fn publish_auth_event(&self, event: AuthEvent) {
        if self.auth_events.send(event).is_err() {
            warn!("trips: auth event dropped, migration subscriber is gone");
        }
    }

    pub fn subscribe_auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.auth_events.subscribe()
    }
}

impl Drop for PlannerEngine {
    fn drop(&mut self) {
        self.migration_task.abort();
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod tests_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
