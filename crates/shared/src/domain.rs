use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Client-side identifier for something the remote service has not seen yet.
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

id_newtype!(TripId);
id_newtype!(ItemId);

pub const DEFAULT_TIME_SLOT: &str = "09:00";
pub const DEFAULT_TRIP_TITLE: &str = "Untitled trip";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Travel,
    Stay,
    #[default]
    Activity,
    Food,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    #[default]
    Planning,
    Confirmed,
    Completed,
}

fn default_day() -> u32 {
    1
}

fn default_time() -> String {
    DEFAULT_TIME_SLOT.to_string()
}

fn default_title() -> String {
    DEFAULT_TRIP_TITLE.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItineraryItem {
    #[serde(default)]
    pub id: ItemId,
    #[serde(default = "default_day")]
    pub day: u32,
    #[serde(default = "default_time")]
    pub time: String,
    #[serde(default)]
    pub activity: String,
    #[serde(rename = "type", default)]
    pub item_type: ItemType,
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl ItineraryItem {
    pub fn new(
        day: u32,
        time: impl Into<String>,
        activity: impl Into<String>,
        item_type: ItemType,
        cost: f64,
        location: impl Into<String>,
    ) -> Self {
        Self {
            id: ItemId::generate(),
            day: day.max(1),
            time: time.into(),
            activity: activity.into(),
            item_type,
            cost: cost.max(0.0),
            location: location.into(),
            notes: None,
            image: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    #[serde(default)]
    pub id: TripId,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub status: TripStatus,
    #[serde(default = "default_day")]
    pub days: u32,
    #[serde(default)]
    pub items: Vec<ItineraryItem>,
    #[serde(default)]
    pub date_range: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_created: Option<DateTime<Utc>>,
}

impl Default for Trip {
    fn default() -> Self {
        Self {
            id: TripId::default(),
            title: default_title(),
            destination: String::new(),
            region: String::new(),
            start_date: None,
            end_date: None,
            status: TripStatus::default(),
            days: 1,
            items: Vec::new(),
            date_range: String::new(),
            date_created: None,
        }
    }
}

impl Trip {
    /// A trip that has never been persisted anywhere.
    pub fn is_draft(&self) -> bool {
        self.id.is_empty()
    }

    pub fn max_item_day(&self) -> u32 {
        self.items.iter().map(|item| item.day).max().unwrap_or(0)
    }

    /// Visible span of the trip. The stored `days` value is never trusted on its own.
    pub fn effective_days(&self) -> u32 {
        self.days.max(self.max_item_day()).max(1)
    }

    pub fn total_cost(&self) -> f64 {
        self.items.iter().map(|item| item.cost).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TourDay {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// A packaged multi-day tour that can be merged into an itinerary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TourBundle {
    pub id: String,
    pub title: String,
    pub duration_days: u32,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub days: Vec<TourDay>,
}

impl TourBundle {
    /// Title and description for the 1-based day `k` of the tour.
    pub fn day_label(&self, k: u32) -> (String, Option<String>) {
        match k
            .checked_sub(1)
            .and_then(|index| self.days.get(index as usize))
        {
            Some(day) => {
                let description = if day.description.is_empty() {
                    None
                } else {
                    Some(day.description.clone())
                };
                (day.title.clone(), description)
            }
            None => (format!("{} - Day {k}", self.title), None),
        }
    }

    /// Per-day share of the tour price, rounded to a whole amount.
    pub fn cost_per_day(&self) -> f64 {
        if self.duration_days == 0 {
            return 0.0;
        }
        (self.price.max(0.0) / f64::from(self.duration_days)).round()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TripTarget {
    Current,
    CreateNew,
    Existing(TripId),
}
