//! Unified trip list over the local store and the remote trip service.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use shared::{
    domain::{Trip, TripId},
    protocol::{Session, TripPayload},
};
use storage::Storage;
use tokio::sync::{watch, RwLock};
use tracing::{error, info, warn};

use crate::trip_service::{MissingTripService, TripService};

/// Remote wins for every id it returns; local entries with unknown ids are appended.
pub fn merge_trips(remote: Vec<Trip>, local: Vec<Trip>) -> Vec<Trip> {
    let remote_ids: HashSet<TripId> = remote.iter().map(|trip| trip.id.clone()).collect();
    let mut merged = remote;
    let mut seen_local = HashSet::new();
    for trip in local {
        if remote_ids.contains(&trip.id) || !seen_local.insert(trip.id.clone()) {
            continue;
        }
        merged.push(trip);
    }
    merged
}

pub struct TripStorage {
    store: Storage,
    service: Arc<dyn TripService>,
    session: RwLock<Option<Session>>,
    /// Local id -> server id for guest trips uploaded during this session.
    migrated_ids: RwLock<HashMap<TripId, TripId>>,
    published: watch::Sender<Vec<Trip>>,
}

impl TripStorage {
    pub fn new(store: Storage, service: Arc<dyn TripService>) -> Arc<Self> {
        let (published, _) = watch::channel(Vec::new());
        Arc::new(Self {
            store,
            service,
            session: RwLock::new(None),
            migrated_ids: RwLock::new(HashMap::new()),
            published,
        })
    }

    pub fn local_only(store: Storage) -> Arc<Self> {
        Self::new(store, Arc::new(MissingTripService))
    }

    pub fn store(&self) -> &Storage {
        &self.store
    }

    pub fn service(&self) -> Arc<dyn TripService> {
        self.service.clone()
    }

    pub async fn set_session(&self, session: Option<Session>) {
        if session.is_none() {
            self.migrated_ids.write().await.clear();
        }
        *self.session.write().await = session;
    }

    /// Remembers the server ids assigned to uploaded guest trips so saves that still
    /// carry the local id update the server copy instead of forking it.
    pub async fn record_migrated_ids(&self, ids: &HashMap<TripId, TripId>) {
        self.migrated_ids
            .write()
            .await
            .extend(ids.iter().map(|(local, server)| (local.clone(), server.clone())));
    }

    /// The server id a migrated guest trip now lives under, if any.
    pub async fn migrated_id(&self, local_id: &TripId) -> Option<TripId> {
        self.migrated_ids.read().await.get(local_id).cloned()
    }

    pub async fn session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.session.read().await.is_some()
    }

    /// Last published trip list.
    pub fn trips(&self) -> Vec<Trip> {
        self.published.borrow().clone()
    }

    pub fn subscribe_trips(&self) -> watch::Receiver<Vec<Trip>> {
        self.published.subscribe()
    }

    pub fn trip(&self, trip_id: &TripId) -> Option<Trip> {
        self.published
            .borrow()
            .iter()
            .find(|trip| &trip.id == trip_id)
            .cloned()
    }

    /// Reads local then (with a session) remote trips, publishes the merged list and returns it.
    /// Never fails: if neither source can be read, the previous list stays published.
    pub async fn fetch_trips(&self) -> Vec<Trip> {
        let local = match self.store.try_load_trips().await {
            Ok(trips) => Some(trips),
            Err(err) => {
                warn!(error = %err, "trips: local store unreadable");
                None
            }
        };

        let remote = match self.session().await {
            Some(session) => match self.service.list_trips(&session).await {
                Ok(trips) => Some(trips),
                Err(err) => {
                    warn!(error = %err, "trips: remote list failed, using local trips");
                    None
                }
            },
            None => None,
        };

        let merged = match (remote, local) {
            (Some(remote), Some(local)) => merge_trips(remote, local),
            (Some(remote), None) => remote,
            (None, Some(local)) => local,
            (None, None) => {
                error!("trips: no trip source readable, keeping previous list");
                return self.trips();
            }
        };

        info!(count = merged.len(), "trips: published trip list");
        self.published.send_replace(merged.clone());
        merged
    }

    /// Persists `draft` remotely when signed in, otherwise (or on remote failure) locally.
    /// Returns the id the trip is stored under, or `None` if nothing could be written.
    pub async fn save_trip(&self, draft: &Trip, existing_id: Option<&TripId>) -> Option<TripId> {
        let existing_id = match existing_id.filter(|id| !id.is_empty()) {
            Some(trip_id) => match self.migrated_id(trip_id).await {
                Some(server_id) => {
                    info!(local_id = %trip_id, trip_id = %server_id, "trips: saving migrated trip under its server id");
                    Some(server_id)
                }
                None => Some(trip_id.clone()),
            },
            None => None,
        };
        let existing_id = existing_id.as_ref();

        if let Some(session) = self.session().await {
            let payload = TripPayload::from(draft);
            let result = match existing_id {
                Some(trip_id) => self.service.update_trip(&session, trip_id, &payload).await,
                None => self.service.create_trip(&session, &payload).await,
            };

            match result {
                Ok(record) => {
                    if let Err(err) = self.store.upsert_trip(&record).await {
                        warn!(trip_id = %record.id, error = %err, "trips: failed to mirror saved trip locally");
                    }
                    info!(trip_id = %record.id, "trips: saved trip to remote service");
                    let trip_id = record.id.clone();
                    self.publish_upsert(record);
                    self.fetch_trips().await;
                    return Some(trip_id);
                }
                Err(err) => {
                    warn!(error = %err, "trips: remote save failed, saving locally");
                }
            }
        }

        let trip_id = existing_id.cloned().unwrap_or_else(TripId::generate);
        let mut record = draft.clone();
        record.id = trip_id.clone();
        record.days = draft.effective_days();

        match self.store.upsert_trip(&record).await {
            Ok(()) => {
                info!(trip_id = %trip_id, "trips: saved trip locally");
                self.publish_upsert(record);
                Some(trip_id)
            }
            Err(err) => {
                error!(trip_id = %trip_id, error = %err, "trips: local save failed");
                None
            }
        }
    }

    /// Best-effort remote delete, then unconditional local removal.
    pub async fn delete_trip(&self, trip_id: &TripId) -> bool {
        if let Some(session) = self.session().await {
            if let Err(err) = self.service.delete_trip(&session, trip_id).await {
                warn!(trip_id = %trip_id, error = %err, "trips: remote delete failed");
            }
        }

        let removed = match self.store.remove_trip(trip_id).await {
            Ok(_) => true,
            Err(err) => {
                error!(trip_id = %trip_id, error = %err, "trips: local delete failed");
                false
            }
        };

        self.published
            .send_modify(|trips| trips.retain(|trip| &trip.id != trip_id));
        self.fetch_trips().await;
        removed
    }

    fn publish_upsert(&self, record: Trip) {
        self.published.send_modify(|trips| {
            match trips.iter_mut().find(|trip| trip.id == record.id) {
                Some(existing) => *existing = record,
                None => trips.push(record),
            }
        });
    }
}

#[cfg(test)]
#[path = "tests/coordinator_tests.rs"]
mod tests;
