use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::{Trip, TripId},
    protocol::{Session, TripPayload},
};
use storage::Storage;

use crate::{coordinator::TripStorage, trip_service::TripService};

pub(crate) fn session() -> Session {
    Session {
        user_id: "user-1".into(),
        access_token: "token-1".into(),
    }
}

pub(crate) fn local_trip(id: &str, title: &str) -> Trip {
    Trip {
        id: TripId::from(id),
        title: title.to_string(),
        destination: "Kyoto".to_string(),
        ..Trip::default()
    }
}

pub(crate) async fn memory_storage() -> Storage {
    Storage::new("sqlite::memory:").await.expect("db")
}

/// In-memory stand-in for the remote trip service that records every call.
#[derive(Default)]
pub(crate) struct FakeTripService {
    pub remote: Mutex<Vec<Trip>>,
    pub created: Mutex<Vec<TripPayload>>,
    pub updated: Mutex<Vec<TripId>>,
    pub deleted: Mutex<Vec<TripId>>,
    pub list_calls: AtomicU64,
    pub offline: AtomicBool,
    pub fail_titles: Mutex<HashSet<String>>,
    pub create_delay: Mutex<Option<Duration>>,
    next_id: AtomicU64,
}

impl FakeTripService {
    pub fn with_remote(trips: Vec<Trip>) -> Self {
        let service = Self::default();
        *service.remote.lock().expect("remote") = trips;
        service
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn fail_title(&self, title: &str) {
        self.fail_titles
            .lock()
            .expect("fail titles")
            .insert(title.to_string());
    }

    pub fn created_titles(&self) -> Vec<String> {
        self.created
            .lock()
            .expect("created")
            .iter()
            .map(|payload| payload.title.clone())
            .collect()
    }

    pub fn remote_ids(&self) -> Vec<TripId> {
        self.remote
            .lock()
            .expect("remote")
            .iter()
            .map(|trip| trip.id.clone())
            .collect()
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(anyhow!("connection refused"));
        }
        Ok(())
    }

    fn record_from(&self, id: TripId, payload: &TripPayload) -> Trip {
        Trip {
            id,
            title: payload.title.clone(),
            destination: payload.destination.clone(),
            region: payload.region.clone(),
            start_date: payload.start_date,
            end_date: payload.end_date,
            status: payload.status,
            days: payload.days,
            items: payload.items.clone(),
            date_range: payload.date_range.clone(),
            date_created: Some("2024-05-01T10:00:00Z".parse().expect("timestamp")),
        }
    }
}

#[async_trait]
impl TripService for FakeTripService {
    async fn list_trips(&self, _session: &Session) -> Result<Vec<Trip>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        Ok(self.remote.lock().expect("remote").clone())
    }

    async fn create_trip(&self, _session: &Session, payload: &TripPayload) -> Result<Trip> {
        let delay = *self.create_delay.lock().expect("delay");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_online()?;
        if self
            .fail_titles
            .lock()
            .expect("fail titles")
            .contains(&payload.title)
        {
            return Err(anyhow!("trip service responded 500"));
        }

        self.created.lock().expect("created").push(payload.clone());
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let record = self.record_from(TripId(format!("srv-{n}")), payload);
        self.remote.lock().expect("remote").push(record.clone());
        Ok(record)
    }

    async fn update_trip(
        &self,
        _session: &Session,
        trip_id: &TripId,
        payload: &TripPayload,
    ) -> Result<Trip> {
        self.check_online()?;
        self.updated.lock().expect("updated").push(trip_id.clone());
        let record = self.record_from(trip_id.clone(), payload);
        let mut remote = self.remote.lock().expect("remote");
        match remote.iter_mut().find(|trip| &trip.id == trip_id) {
            Some(existing) => *existing = record.clone(),
            None => remote.push(record.clone()),
        }
        Ok(record)
    }

    async fn delete_trip(&self, _session: &Session, trip_id: &TripId) -> Result<()> {
        self.check_online()?;
        self.deleted.lock().expect("deleted").push(trip_id.clone());
        self.remote
            .lock()
            .expect("remote")
            .retain(|trip| &trip.id != trip_id);
        Ok(())
    }
}

pub(crate) async fn coordinator_with(service: Arc<FakeTripService>) -> Arc<TripStorage> {
    TripStorage::new(memory_storage().await, service)
}
