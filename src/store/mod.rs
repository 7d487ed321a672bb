//! Persistence boundary.
//!
//! Every store comes in two flavors: Postgres (`postgres`) and in-process
//! (`memory`). Reads never fail because the backend is missing; they come back
//! empty. Writes surface errors to the caller.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;

use crate::clock::Clock;
use crate::dto::CreateUserRequest;
use crate::error::AppResult;
use crate::models::medication::{DoseHistory, Medication};
use crate::models::mood::{MoodEntry, MoodType};
use crate::models::user::User;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait MoodEntryStore: Send + Sync {
    /// Insert a new entry. The caller mints the id; an existing id is a conflict,
    /// never an update.
    async fn save_mood_entry(&self, entry: &MoodEntry) -> AppResult<MoodEntry>;

    /// Insert or replace by id, refreshing `updated_at`. Only for explicit edits
    /// and client retries.
    async fn upsert_mood_entry(&self, entry: &MoodEntry) -> AppResult<MoodEntry>;

    /// Newest first; equal timestamps keep the latest-created first.
    async fn get_all_mood_entries(&self, user_id: &str) -> AppResult<Vec<MoodEntry>>;

    /// Newest-created first, at most `limit`.
    async fn get_recent_mood_entries(&self, user_id: &str, limit: i64)
        -> AppResult<Vec<MoodEntry>>;

    /// Inclusive on both ends.
    async fn get_mood_entries_for_date_range(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AppResult<Vec<MoodEntry>>;

    /// Most recent entry on `date`.
    async fn get_mood_entry_for_date(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> AppResult<Option<MoodEntry>>;

    async fn delete_mood_entry(&self, id: &str) -> AppResult<()>;

    async fn clear_mood_entries(&self, user_id: &str) -> AppResult<u64>;

    /// Built-in catalog merged with persisted overrides.
    async fn get_mood_types(&self) -> AppResult<Vec<MoodType>>;
}

#[async_trait]
pub trait MedicationStore: Send + Sync {
    async fn get_all(&self) -> AppResult<Vec<Medication>>;

    async fn get(&self, id: &str) -> AppResult<Option<Medication>>;

    async fn add(&self, medication: &Medication) -> AppResult<()>;

    /// Full-record replace keyed by id.
    async fn update(&self, medication: &Medication) -> AppResult<()>;

    /// Append a dose event. Does not touch the medication record.
    async fn record_dose(
        &self,
        medication_id: &str,
        taken: bool,
        timestamp: DateTime<Utc>,
    ) -> AppResult<DoseHistory>;

    /// Dose events in `[start, end)`.
    async fn get_doses_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<DoseHistory>>;

    async fn get_todays_doses(&self, clock: &dyn Clock) -> AppResult<Vec<DoseHistory>> {
        let (start, end) = clock.day_bounds(clock.today());
        self.get_doses_between(start, end).await
    }

    /// Wipe medications and dose history.
    async fn clear_all(&self) -> AppResult<()>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert or refresh the profile keyed by `clerk_id`.
    async fn upsert_user(&self, user: &CreateUserRequest) -> AppResult<User>;

    async fn get_user(&self, clerk_id: &str) -> AppResult<Option<User>>;
}

/// Survives restarts so the past-due sweep neither repeats reminders already
/// sent today nor runs again inside its interval.
#[async_trait]
pub trait ReminderLogStore: Send + Sync {
    async fn last_past_due_check(&self) -> AppResult<Option<DateTime<Utc>>>;

    async fn set_last_past_due_check(&self, at: DateTime<Utc>) -> AppResult<()>;

    /// Past-due reminder ids sent on `date`.
    async fn past_due_sent_on(&self, date: NaiveDate) -> AppResult<Vec<String>>;

    /// Record ids sent on `date`, dropping ids from earlier days.
    async fn record_past_due_sent(&self, ids: &[String], date: NaiveDate) -> AppResult<()>;
}

#[derive(Clone)]
pub struct Stores {
    pub mood: Arc<dyn MoodEntryStore>,
    pub medications: Arc<dyn MedicationStore>,
    pub users: Arc<dyn UserStore>,
    pub reminder_log: Arc<dyn ReminderLogStore>,
}

impl Stores {
    pub fn postgres(store: PgStore) -> Self {
        let store = Arc::new(store);
        Self {
            mood: store.clone(),
            medications: store.clone(),
            users: store.clone(),
            reminder_log: store,
        }
    }

    pub fn memory(store: MemoryStore) -> Self {
        let store = Arc::new(store);
        Self {
            mood: store.clone(),
            medications: store.clone(),
            users: store.clone(),
            reminder_log: store,
        }
    }
}
