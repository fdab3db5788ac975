use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    domain::{ItineraryItem, Trip, TripStatus},
    error::ApiError,
};

/// Body of create and update requests against the trip service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripPayload {
    pub title: String,
    pub destination: String,
    #[serde(default)]
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub status: TripStatus,
    pub days: u32,
    #[serde(default)]
    pub items: Vec<ItineraryItem>,
    #[serde(default)]
    pub date_range: String,
}

impl From<&Trip> for TripPayload {
    fn from(trip: &Trip) -> Self {
        Self {
            title: trip.title.clone(),
            destination: trip.destination.clone(),
            region: trip.region.clone(),
            start_date: trip.start_date,
            end_date: trip.end_date,
            status: trip.status,
            days: trip.effective_days(),
            items: trip.items.clone(),
            date_range: trip.date_range.clone(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub access_token: String,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// Session transitions published by the authentication layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum AuthEvent {
    /// Interactive sign-in that just completed.
    SignedIn(Session),
    /// Session picked up from a previous run at startup.
    SessionRestored(Session),
    SignedOut,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ApiError,
}
