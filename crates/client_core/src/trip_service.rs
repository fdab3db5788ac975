use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use shared::{
    domain::{Trip, TripId},
    protocol::{ErrorBody, Session, TripPayload},
};
use tracing::debug;

use crate::{config::SyncSettings, error::TripServiceError};

/// Header carrying the fixed service credential on every request.
pub const API_KEY_HEADER: &str = "apikey";

/// Account-scoped CRUD against the remote trip store.
#[async_trait]
pub trait TripService: Send + Sync {
    async fn list_trips(&self, session: &Session) -> Result<Vec<Trip>>;
    async fn create_trip(&self, session: &Session, payload: &TripPayload) -> Result<Trip>;
    async fn update_trip(
        &self,
        session: &Session,
        trip_id: &TripId,
        payload: &TripPayload,
    ) -> Result<Trip>;
    async fn delete_trip(&self, session: &Session, trip_id: &TripId) -> Result<()>;
}

pub struct MissingTripService;

#[async_trait]
impl TripService for MissingTripService {
    async fn list_trips(&self, _session: &Session) -> Result<Vec<Trip>> {
        Err(TripServiceError::Unavailable.into())
    }

    async fn create_trip(&self, _session: &Session, _payload: &TripPayload) -> Result<Trip> {
        Err(TripServiceError::Unavailable.into())
    }

    async fn update_trip(
        &self,
        _session: &Session,
        _trip_id: &TripId,
        _payload: &TripPayload,
    ) -> Result<Trip> {
        Err(TripServiceError::Unavailable.into())
    }

    async fn delete_trip(&self, _session: &Session, _trip_id: &TripId) -> Result<()> {
        Err(TripServiceError::Unavailable.into())
    }
}

pub struct HttpTripService {
    http: Client,
    base_url: String,
    api_key: String,
}

impl HttpTripService {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url, api_key)
    }

    pub fn with_client(
        http: Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn from_settings(base_url: &str, settings: &SyncSettings) -> Result<Self> {
        let http = Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .context("failed to build trip service http client")?;
        Ok(Self::with_client(
            http,
            base_url,
            settings.service_api_key.clone(),
        ))
    }

    fn request(&self, method: Method, path: &str, session: &Session) -> RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.base_url))
            .header(API_KEY_HEADER, &self.api_key)
            .bearer_auth(&session.access_token)
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|parsed| parsed.error.message)
        .unwrap_or(body);
    Err(TripServiceError::from_status(status.as_u16(), message).into())
}

fn require_id(trip: Trip) -> Result<Trip> {
    if trip.id.is_empty() {
        return Err(TripServiceError::MissingRecordId.into());
    }
    Ok(trip)
}

#[async_trait]
impl TripService for HttpTripService {
    async fn list_trips(&self, session: &Session) -> Result<Vec<Trip>> {
        let response = self
            .request(Method::GET, "/trips", session)
            .send()
            .await
            .context("failed to reach trip service")?;
        let trips: Vec<Trip> = check_status(response)
            .await?
            .json()
            .await
            .context("invalid trip list from trip service")?;
        debug!(count = trips.len(), "trip service: listed trips");
        Ok(trips)
    }

    async fn create_trip(&self, session: &Session, payload: &TripPayload) -> Result<Trip> {
        let response = self
            .request(Method::POST, "/trips", session)
            .json(payload)
            .send()
            .await
            .context("failed to reach trip service")?;
        let trip: Trip = check_status(response)
            .await?
            .json()
            .await
            .context("invalid trip record from trip service")?;
        require_id(trip)
    }

    async fn update_trip(
        &self,
        session: &Session,
        trip_id: &TripId,
        payload: &TripPayload,
    ) -> Result<Trip> {
        let response = self
            .request(Method::PUT, &format!("/trips/{trip_id}"), session)
            .json(payload)
            .send()
            .await
            .context("failed to reach trip service")?;
        let trip: Trip = check_status(response)
            .await?
            .json()
            .await
            .context("invalid trip record from trip service")?;
        require_id(trip)
    }

    async fn delete_trip(&self, session: &Session, trip_id: &TripId) -> Result<()> {
        let response = self
            .request(Method::DELETE, &format!("/trips/{trip_id}"), session)
            .send()
            .await
            .context("failed to reach trip service")?;
        check_status(response).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/trip_service_tests.rs"]
mod tests;
