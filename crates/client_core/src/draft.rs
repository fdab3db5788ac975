//! The trip currently being edited, its mutations and debounced autosave.

use std::{
    sync::{Arc, Mutex as StdMutex, MutexGuard, Weak},
    time::Duration,
};

use shared::domain::{
    ItemId, ItemType, ItineraryItem, TourBundle, Trip, TripId, TripTarget, DEFAULT_TIME_SLOT,
    DEFAULT_TRIP_TITLE,
};
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{coordinator::TripStorage, error::DraftError};

pub const DEFAULT_AUTOSAVE_DELAY: Duration = Duration::from_secs(3);
/// Longest tour accepted from a catalog bundle.
pub const MAX_TOUR_DAYS: u32 = 365;
/// Last day a tour may end on.
pub const MAX_TRIP_DAYS: u32 = 3650;

#[derive(Debug, Clone, PartialEq)]
pub struct DraftState {
    pub current_trip_id: Option<TripId>,
    pub title: String,
    pub destination: String,
    pub day_count: u32,
    pub itinerary: Vec<ItineraryItem>,
    /// Fields of the loaded trip the draft does not edit (region, dates, status).
    base: Option<Trip>,
    /// Bumped whenever the draft is replaced by another trip.
    generation: u64,
}

impl Default for DraftState {
    fn default() -> Self {
        Self {
            current_trip_id: None,
            title: String::new(),
            destination: String::new(),
            day_count: 1,
            itinerary: Vec::new(),
            base: None,
            generation: 0,
        }
    }
}

impl DraftState {
    pub fn current_trip(&self) -> Trip {
        let mut trip = self.base.clone().unwrap_or_default();
        trip.id = self.current_trip_id.clone().unwrap_or_default();
        trip.title = if self.title.trim().is_empty() {
            DEFAULT_TRIP_TITLE.to_string()
        } else {
            self.title.clone()
        };
        trip.destination = self.destination.clone();
        trip.days = self.day_count;
        trip.items = self.itinerary.clone();
        trip
    }

    /// Nothing worth persisting yet.
    pub fn is_blank(&self) -> bool {
        self.current_trip_id.is_none() && self.title.trim().is_empty() && self.itinerary.is_empty()
    }

    fn replace_with(&mut self, trip: &Trip) {
        let generation = self.generation + 1;
        *self = Self {
            current_trip_id: (!trip.is_draft()).then(|| trip.id.clone()),
            title: trip.title.clone(),
            destination: trip.destination.clone(),
            day_count: trip.effective_days(),
            itinerary: trip.items.clone(),
            base: Some(trip.clone()),
            generation,
        };
    }

    fn reset(&mut self) {
        let generation = self.generation + 1;
        *self = Self {
            generation,
            ..Self::default()
        };
    }
}

/// Inserts a `bundle.duration_days`-day block at `start_day`.
///
/// Items on or after `start_day` move back by the bundle length so the window
/// `[start_day, start_day + D - 1]` holds only the new items; earlier days are untouched.
/// Returns the new day count and the ids of the inserted items.
pub fn insert_tour_days(
    items: &mut Vec<ItineraryItem>,
    day_count: u32,
    bundle: &TourBundle,
    start_day: u32,
) -> (u32, Vec<ItemId>) {
    let duration = bundle.duration_days;
    let start_day = start_day.max(1);
    // An empty draft has no days worth keeping ahead of the tour.
    let previous_span = if items.is_empty() { 0 } else { day_count };

    for item in items.iter_mut() {
        if item.day >= start_day {
            item.day = item.day.saturating_add(duration);
        }
    }

    let cost = bundle.cost_per_day();
    let mut inserted = Vec::with_capacity(duration.min(MAX_TOUR_DAYS) as usize);
    for k in 1..=duration {
        let (activity, notes) = bundle.day_label(k);
        let mut item = ItineraryItem::new(
            start_day.saturating_add(k - 1),
            DEFAULT_TIME_SLOT,
            activity,
            ItemType::Activity,
            cost,
            bundle.location.clone(),
        );
        item.notes = notes;
        item.image = bundle.image.clone();
        inserted.push(item.id.clone());
        items.push(item);
    }

    let shifted_span = if previous_span >= start_day {
        previous_span.saturating_add(duration)
    } else {
        previous_span
    };
    let max_item_day = items.iter().map(|item| item.day).max().unwrap_or(0);
    let end_day = start_day.saturating_add(duration).saturating_sub(1);
    (shifted_span.max(max_item_day).max(end_day), inserted)
}

pub struct TripDraftController {
    this: Weak<TripDraftController>,
    trips: Arc<TripStorage>,
    state: Mutex<DraftState>,
    autosave_delay: Duration,
    autosave: StdMutex<PendingAutosave>,
    /// Raised while guest trips are uploaded; saves wait for it to drop.
    migrating: Option<watch::Receiver<bool>>,
}

#[derive(Default)]
struct PendingAutosave {
    seq: u64,
    task: Option<(u64, JoinHandle<()>)>,
}

impl TripDraftController {
    pub fn new(trips: Arc<TripStorage>, autosave_delay: Duration) -> Arc<Self> {
        Self::build(trips, autosave_delay, None)
    }

    /// Like [`TripDraftController::new`], but saves hold off while `migrating` is set.
    pub fn with_migration_flag(
        trips: Arc<TripStorage>,
        autosave_delay: Duration,
        migrating: watch::Receiver<bool>,
    ) -> Arc<Self> {
        Self::build(trips, autosave_delay, Some(migrating))
    }

    fn build(
        trips: Arc<TripStorage>,
        autosave_delay: Duration,
        migrating: Option<watch::Receiver<bool>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            trips,
            state: Mutex::new(DraftState::default()),
            autosave_delay,
            autosave: StdMutex::new(PendingAutosave::default()),
            migrating,
        })
    }

    pub async fn state(&self) -> DraftState {
        self.state.lock().await.clone()
    }

    pub async fn current_trip(&self) -> Trip {
        self.state.lock().await.current_trip()
    }

    pub async fn current_trip_id(&self) -> Option<TripId> {
        self.state.lock().await.current_trip_id.clone()
    }

    pub async fn day_count(&self) -> u32 {
        self.state.lock().await.day_count
    }

    pub async fn items_for_day(&self, day: u32) -> Vec<ItineraryItem> {
        let state = self.state.lock().await;
        let mut items: Vec<_> = state
            .itinerary
            .iter()
            .filter(|item| item.day == day)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.time.cmp(&b.time));
        items
    }

    pub async fn total_cost(&self) -> f64 {
        self.state.lock().await.current_trip().total_cost()
    }

    /// Replaces the draft with a saved trip. Pending edits of the previous draft are saved first.
    pub async fn load_trip(&self, trip: &Trip) {
        self.flush_autosave().await;
        let mut state = self.state.lock().await;
        state.replace_with(trip);
        info!(trip_id = %trip.id, day_count = state.day_count, "draft: loaded trip");
    }

    pub async fn create_new_trip(&self) {
        self.flush_autosave().await;
        self.state.lock().await.reset();
        debug!("draft: started new trip");
    }

    pub async fn set_title(&self, title: impl Into<String>) {
        self.state.lock().await.title = title.into();
        self.schedule_autosave();
    }

    pub async fn set_destination(&self, destination: impl Into<String>) {
        self.state.lock().await.destination = destination.into();
        self.schedule_autosave();
    }

    pub async fn add_item(&self, mut item: ItineraryItem) -> ItemId {
        item.day = item.day.max(1);
        let item_id = item.id.clone();
        {
            let mut state = self.state.lock().await;
            state.day_count = state.day_count.max(item.day);
            state.itinerary.push(item);
        }
        self.schedule_autosave();
        item_id
    }

    pub async fn update_item<F>(&self, item_id: &ItemId, update: F) -> bool
    where
        F: FnOnce(&mut ItineraryItem),
    {
        let updated = {
            let mut state = self.state.lock().await;
            match state.itinerary.iter_mut().find(|item| &item.id == item_id) {
                Some(item) => {
                    update(item);
                    item.day = item.day.max(1);
                    item.cost = item.cost.max(0.0);
                    let day = item.day;
                    state.day_count = state.day_count.max(day);
                    true
                }
                None => false,
            }
        };
        if updated {
            self.schedule_autosave();
        }
        updated
    }

    pub async fn remove_item(&self, item_id: &ItemId) -> bool {
        let removed = {
            let mut state = self.state.lock().await;
            let before = state.itinerary.len();
            state.itinerary.retain(|item| &item.id != item_id);
            state.itinerary.len() != before
        };
        if removed {
            self.schedule_autosave();
        }
        removed
    }

    pub async fn add_day(&self) -> u32 {
        let day_count = {
            let mut state = self.state.lock().await;
            state.day_count += 1;
            state.day_count
        };
        self.schedule_autosave();
        day_count
    }

    /// Drops one day and its items; later days move up by one.
    pub async fn remove_day(&self, day: u32) -> bool {
        {
            let mut state = self.state.lock().await;
            if day == 0 || day > state.day_count {
                return false;
            }
            state.itinerary.retain(|item| item.day != day);
            for item in state.itinerary.iter_mut() {
                if item.day > day {
                    item.day -= 1;
                }
            }
            state.day_count = state.day_count.saturating_sub(1).max(1);
        }
        self.schedule_autosave();
        true
    }

    /// Merges a multi-day bundle into the target trip starting at `start_day`.
    pub async fn add_tour_to_trip(
        &self,
        bundle: &TourBundle,
        start_day: u32,
        target: TripTarget,
    ) -> Result<Vec<ItemId>, DraftError> {
        if bundle.duration_days == 0 {
            return Err(DraftError::EmptyBundle);
        }
        let end_day = start_day
            .max(1)
            .checked_add(bundle.duration_days - 1)
            .filter(|end_day| *end_day <= MAX_TRIP_DAYS);
        if bundle.duration_days > MAX_TOUR_DAYS || end_day.is_none() {
            return Err(DraftError::TourOutOfRange {
                start_day,
                duration_days: bundle.duration_days,
            });
        }

        let current_id = self.current_trip_id().await;
        let switch_to = match target {
            TripTarget::Existing(trip_id) if current_id.as_ref() != Some(&trip_id) => {
                let trip = self
                    .trips
                    .trip(&trip_id)
                    .ok_or(DraftError::UnknownTrip(trip_id))?;
                Some(Some(trip))
            }
            TripTarget::CreateNew => Some(None),
            TripTarget::Existing(_) | TripTarget::Current => None,
        };
        if switch_to.is_some() {
            self.flush_autosave().await;
        }

        let inserted = {
            let mut state = self.state.lock().await;
            match switch_to {
                Some(Some(trip)) => state.replace_with(&trip),
                Some(None) => state.reset(),
                None => {}
            }

            let day_count = state.day_count;
            let (day_count, inserted) =
                insert_tour_days(&mut state.itinerary, day_count, bundle, start_day);
            state.day_count = day_count;
            info!(
                tour_id = %bundle.id,
                start_day,
                days = bundle.duration_days,
                day_count,
                "draft: inserted tour"
            );
            inserted
        };

        self.schedule_autosave();
        Ok(inserted)
    }

    /// Persists the draft as it is right now and adopts the stored id.
    pub async fn save_current_trip(&self) -> Option<TripId> {
        self.wait_for_migration().await;
        let (trip, existing_id, generation) = {
            let state = self.state.lock().await;
            (
                state.current_trip(),
                state.current_trip_id.clone(),
                state.generation,
            )
        };

        let Some(trip_id) = self.trips.save_trip(&trip, existing_id.as_ref()).await else {
            warn!("draft: save failed, draft kept in memory");
            return None;
        };

        let mut state = self.state.lock().await;
        if state.generation == generation {
            state.current_trip_id = Some(trip_id.clone());
        } else {
            info!(trip_id = %trip_id, "draft: trip switched during save, id not adopted");
        }
        Some(trip_id)
    }

    async fn wait_for_migration(&self) {
        let Some(mut migrating) = self.migrating.clone() else {
            return;
        };
        if *migrating.borrow_and_update() {
            debug!("draft: waiting for guest migration before saving");
        }
        while *migrating.borrow_and_update() {
            if migrating.changed().await.is_err() {
                break;
            }
        }
    }

    pub fn has_pending_autosave(&self) -> bool {
        self.pending_autosave().task.is_some()
    }

    pub fn cancel_autosave(&self) {
        if let Some((_, task)) = self.pending_autosave().task.take() {
            task.abort();
        }
    }

    /// Runs a pending autosave immediately instead of waiting for the timer.
    pub async fn flush_autosave(&self) -> Option<TripId> {
        let (_, task) = self.pending_autosave().task.take()?;
        task.abort();
        self.autosave_now().await
    }

    fn pending_autosave(&self) -> MutexGuard<'_, PendingAutosave> {
        self.autosave
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Trailing-edge debounce: each call restarts the timer.
    fn schedule_autosave(&self) {
        let mut pending = self.pending_autosave();
        pending.seq += 1;
        let seq = pending.seq;
        let this = self.this.clone();
        let delay = self.autosave_delay;

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(controller) = this.upgrade() else {
                return;
            };
            {
                let mut pending = controller.pending_autosave();
                if pending.task.as_ref().map(|(scheduled, _)| *scheduled) != Some(seq) {
                    return;
                }
                pending.task.take();
            }
            controller.autosave_now().await;
        });

        if let Some((_, previous)) = pending.task.replace((seq, task)) {
            previous.abort();
        }
    }

    async fn autosave_now(&self) -> Option<TripId> {
        // Read the draft at fire time; a snapshot taken when the timer was
        // scheduled would drop edits made during the delay.
        if self.state.lock().await.is_blank() {
            debug!("draft: nothing to autosave");
            return None;
        }
        let saved = self.save_current_trip().await;
        match &saved {
            Some(trip_id) => debug!(trip_id = %trip_id, "draft: autosaved"),
            None => warn!("draft: autosave failed"),
        }
        saved
    }
}

impl Drop for TripDraftController {
    fn drop(&mut self) {
        self.cancel_autosave();
    }
}

#[cfg(test)]
#[path = "tests/draft_tests.rs"]
mod tests;
