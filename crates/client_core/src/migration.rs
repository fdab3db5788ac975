//! One-shot upload of guest trips after an interactive sign-in.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use futures::future::join_all;
use shared::{
    domain::TripId,
    protocol::{AuthEvent, Session, TripPayload},
};
use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
};
use tracing::{error, info, warn};

use crate::{coordinator::TripStorage, error::MigrationError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    NothingToMigrate,
    AlreadyRunning,
    /// `remapped` maps each uploaded local id to the id the server assigned.
    Migrated {
        uploaded: usize,
        remapped: HashMap<TripId, TripId>,
    },
}

/// Resets the migrating flag however the migration ends.
struct MigratingGuard<'a>(&'a watch::Sender<bool>);

impl Drop for MigratingGuard<'_> {
    fn drop(&mut self) {
        self.0.send_replace(false);
    }
}

/// The single subscriber to authentication transitions.
pub struct GuestMigration {
    trips: Arc<TripStorage>,
    migrating: watch::Sender<bool>,
}

impl GuestMigration {
    pub fn new(trips: Arc<TripStorage>) -> Arc<Self> {
        let (migrating, _) = watch::channel(false);
        Arc::new(Self { trips, migrating })
    }

    pub fn is_migrating(&self) -> bool {
        *self.migrating.borrow()
    }

    /// Lets callers hold off creating trips while an upload batch is in flight.
    pub fn subscribe_migrating(&self) -> watch::Receiver<bool> {
        self.migrating.subscribe()
    }

    /// Uploads every locally stored trip and removes the uploaded ones from the local
    /// store only if all uploads succeeded. On any failure the local store is left untouched.
    /// Trips written locally while the batch is in flight are kept.
    pub async fn migrate(&self, session: &Session) -> Result<MigrationOutcome, MigrationError> {
        if self.migrating.send_replace(true) {
            return Ok(MigrationOutcome::AlreadyRunning);
        }
        let _guard = MigratingGuard(&self.migrating);

        let local = self.trips.store().load_trips().await;
        if local.is_empty() {
            return Ok(MigrationOutcome::NothingToMigrate);
        }

        let total = local.len();
        info!(count = total, "migration: uploading guest trips");

        let service = self.trips.service();
        let uploads = local.iter().map(|trip| {
            let service = service.clone();
            let payload = TripPayload::from(trip);
            async move { service.create_trip(session, &payload).await }
        });
        let results = join_all(uploads).await;

        let mut remapped = HashMap::with_capacity(total);
        let mut failed = 0;
        for (trip, result) in local.iter().zip(results) {
            match result {
                Ok(record) => {
                    remapped.insert(trip.id.clone(), record.id);
                }
                Err(err) => {
                    failed += 1;
                    warn!(trip_id = %trip.id, error = %err, "migration: upload failed");
                }
            }
        }
        if failed > 0 {
            return Err(MigrationError::Upload { failed, total });
        }

        self.trips.record_migrated_ids(&remapped).await;

        // TODO: track per-trip upload success so a retry after partial failure
        // does not create duplicate remote trips.
        let uploaded_ids: HashSet<TripId> = remapped.keys().cloned().collect();
        self.trips
            .store()
            .remove_trips(&uploaded_ids)
            .await
            .map_err(|error| MigrationError::ClearLocal {
                uploaded: total,
                error,
            })?;

        info!(uploaded = total, "migration: guest trips uploaded, local copies removed");
        Ok(MigrationOutcome::Migrated {
            uploaded: total,
            remapped,
        })
    }

    /// Applies one auth transition. Only `SignedIn` migrates; a restored session does not.
    pub async fn handle_event(
        &self,
        event: AuthEvent,
    ) -> Result<Option<MigrationOutcome>, MigrationError> {
        match event {
            AuthEvent::SignedIn(session) => {
                self.trips.set_session(Some(session.clone())).await;
                let outcome = self.migrate(&session).await;
                self.trips.fetch_trips().await;
                outcome.map(Some)
            }
            AuthEvent::SessionRestored(session) => {
                self.trips.set_session(Some(session)).await;
                self.trips.fetch_trips().await;
                Ok(None)
            }
            AuthEvent::SignedOut => {
                self.trips.set_session(None).await;
                self.trips.fetch_trips().await;
                Ok(None)
            }
        }
    }

    pub async fn run(self: Arc<Self>, mut events: broadcast::Receiver<AuthEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => match self.handle_event(event).await {
                    Ok(Some(outcome)) => info!(?outcome, "migration: auth event handled"),
                    Ok(None) => {}
                    Err(err) => error!(error = %err, "migration: auth event failed"),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "migration: auth events lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("migration: auth event source closed");
                    break;
                }
            }
        }
    }

    pub fn spawn(self: &Arc<Self>, events: broadcast::Receiver<AuthEvent>) -> JoinHandle<()> {
        tokio::spawn(self.clone().run(events))
    }
}

#[cfg(test)]
#[path = "tests/migration_tests.rs"]
mod tests;
