use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;
use validator::Validate;

use crate::clock::Clock;
use crate::dto::CreateUserRequest;
use crate::error::{AppError, AppResult};
use crate::models::medication::{DoseHistory, Medication};
use crate::models::mood::{merge_mood_types, MoodEntry, MoodType};
use crate::models::user::User;

use super::{MedicationStore, MoodEntryStore, ReminderLogStore, UserStore};

/// In-process stores for single-instance local runs and tests.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryState>>,
    clock: Arc<dyn Clock>,
}

#[derive(Default)]
struct MemoryState {
    mood_entries: Vec<StoredMoodEntry>,
    mood_type_overrides: Vec<MoodType>,
    medications: Vec<Medication>,
    doses: Vec<DoseHistory>,
    users: HashMap<String, User>,
    last_past_due_check: Option<DateTime<Utc>>,
    past_due_sent: HashMap<String, NaiveDate>,
    next_seq: u64,
}

struct StoredMoodEntry {
    entry: MoodEntry,
    /// Insertion order, for tie-breaking equal timestamps.
    seq: u64,
}

impl MemoryState {
    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn entries_for<'a>(
        &'a self,
        user_id: &'a str,
    ) -> impl Iterator<Item = &'a StoredMoodEntry> + 'a {
        self.mood_entries.iter().filter(move |s| s.entry.user_id == user_id)
    }
}

/// Newest timestamp first; equal timestamps put the later insert first.
fn newest_first(mut entries: Vec<&StoredMoodEntry>) -> Vec<MoodEntry> {
    entries.sort_by(|a, b| {
        b.entry
            .timestamp
            .cmp(&a.entry.timestamp)
            .then(b.seq.cmp(&a.seq))
    });
    entries.into_iter().map(|s| s.entry.clone()).collect()
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryState::default())),
            clock,
        }
    }

    /// Persist a mood type override, keeping the first row written per id.
    pub async fn seed_mood_type(&self, mood_type: MoodType) {
        let mut state = self.inner.lock().await;
        if !state.mood_type_overrides.iter().any(|m| m.id == mood_type.id) {
            state.mood_type_overrides.push(mood_type);
        }
    }
}

#[async_trait]
impl MoodEntryStore for MemoryStore {
    async fn save_mood_entry(&self, entry: &MoodEntry) -> AppResult<MoodEntry> {
        entry.validate()?;
        let mut state = self.inner.lock().await;
        if state.mood_entries.iter().any(|s| s.entry.id == entry.id) {
            return Err(AppError::Conflict("Mood entry already exists".into()));
        }
        let seq = state.next_seq();
        state.mood_entries.push(StoredMoodEntry {
            entry: entry.clone(),
            seq,
        });
        Ok(entry.clone())
    }

    async fn upsert_mood_entry(&self, entry: &MoodEntry) -> AppResult<MoodEntry> {
        entry.validate()?;
        let mut state = self.inner.lock().await;
        let existing = state.mood_entries.iter().position(|s| s.entry.id == entry.id);
        match existing {
            // Another user's entry is invisible to this caller.
            Some(i) if state.mood_entries[i].entry.user_id != entry.user_id => {
                return Err(AppError::NotFound("Mood entry not found".into()));
            }
            Some(i) => state.mood_entries[i].entry = entry.clone(),
            None => {
                let seq = state.next_seq();
                state.mood_entries.push(StoredMoodEntry {
                    entry: entry.clone(),
                    seq,
                });
            }
        }
        Ok(entry.clone())
    }

    async fn get_all_mood_entries(&self, user_id: &str) -> AppResult<Vec<MoodEntry>> {
        let state = self.inner.lock().await;
        Ok(newest_first(state.entries_for(user_id).collect()))
    }

    async fn get_recent_mood_entries(
        &self,
        user_id: &str,
        limit: i64,
    ) -> AppResult<Vec<MoodEntry>> {
        let state = self.inner.lock().await;
        let mut entries: Vec<&StoredMoodEntry> = state.entries_for(user_id).collect();
        entries.sort_by(|a, b| b.seq.cmp(&a.seq));
        Ok(entries
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|s| s.entry.clone())
            .collect())
    }

    async fn get_mood_entries_for_date_range(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AppResult<Vec<MoodEntry>> {
        let state = self.inner.lock().await;
        Ok(newest_first(
            state
                .entries_for(user_id)
                .filter(|s| s.entry.date >= start && s.entry.date <= end)
                .collect(),
        ))
    }

    async fn get_mood_entry_for_date(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> AppResult<Option<MoodEntry>> {
        let state = self.inner.lock().await;
        Ok(newest_first(
            state
                .entries_for(user_id)
                .filter(|s| s.entry.date == date)
                .collect(),
        )
        .into_iter()
        .next())
    }

    async fn delete_mood_entry(&self, id: &str) -> AppResult<()> {
        let mut state = self.inner.lock().await;
        let before = state.mood_entries.len();
        state.mood_entries.retain(|s| s.entry.id != id);
        if state.mood_entries.len() == before {
            return Err(AppError::NotFound("Mood entry not found".into()));
        }
        Ok(())
    }

    async fn clear_mood_entries(&self, user_id: &str) -> AppResult<u64> {
        let mut state = self.inner.lock().await;
        let before = state.mood_entries.len();
        state.mood_entries.retain(|s| s.entry.user_id != user_id);
        Ok((before - state.mood_entries.len()) as u64)
    }

    async fn get_mood_types(&self) -> AppResult<Vec<MoodType>> {
        let state = self.inner.lock().await;
        Ok(merge_mood_types(state.mood_type_overrides.clone()))
    }
}

#[async_trait]
impl MedicationStore for MemoryStore {
    async fn get_all(&self) -> AppResult<Vec<Medication>> {
        Ok(self.inner.lock().await.medications.clone())
    }

    async fn get(&self, id: &str) -> AppResult<Option<Medication>> {
        let state = self.inner.lock().await;
        Ok(state.medications.iter().find(|m| m.id == id).cloned())
    }

    async fn add(&self, medication: &Medication) -> AppResult<()> {
        let mut state = self.inner.lock().await;
        if state.medications.iter().any(|m| m.id == medication.id) {
            return Err(AppError::Conflict("Medication already exists".into()));
        }
        state.medications.push(medication.clone());
        Ok(())
    }

    async fn update(&self, medication: &Medication) -> AppResult<()> {
        let mut state = self.inner.lock().await;
        let existing = state
            .medications
            .iter_mut()
            .find(|m| m.id == medication.id)
            .ok_or(AppError::NotFound("Medication not found".into()))?;
        *existing = medication.clone();
        Ok(())
    }

    async fn record_dose(
        &self,
        medication_id: &str,
        taken: bool,
        timestamp: DateTime<Utc>,
    ) -> AppResult<DoseHistory> {
        let dose = DoseHistory {
            id: Uuid::new_v4().to_string(),
            medication_id: medication_id.to_string(),
            taken,
            timestamp,
        };
        self.inner.lock().await.doses.push(dose.clone());
        Ok(dose)
    }

    async fn get_doses_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<DoseHistory>> {
        let state = self.inner.lock().await;
        Ok(state
            .doses
            .iter()
            .filter(|d| d.timestamp >= start && d.timestamp < end)
            .cloned()
            .collect())
    }

    async fn clear_all(&self) -> AppResult<()> {
        let mut state = self.inner.lock().await;
        state.medications.clear();
        state.doses.clear();
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn upsert_user(&self, req: &CreateUserRequest) -> AppResult<User> {
        let now = self.clock.now_utc();
        let mut state = self.inner.lock().await;
        let user = match state.users.get(&req.clerk_id) {
            Some(existing) => User {
                firstname: req.firstname.clone(),
                lastname: req.lastname.clone(),
                username: req.username.clone(),
                email: req.email.clone(),
                date_of_birth: req.date_of_birth.or(existing.date_of_birth),
                gender: req.gender.clone().or_else(|| existing.gender.clone()),
                updated_at: now,
                ..existing.clone()
            },
            None => User {
                clerk_id: req.clerk_id.clone(),
                firstname: req.firstname.clone(),
                lastname: req.lastname.clone(),
                username: req.username.clone(),
                email: req.email.clone(),
                date_of_birth: req.date_of_birth,
                gender: req.gender.clone(),
                created_at: now,
                updated_at: now,
            },
        };
        state.users.insert(user.clerk_id.clone(), user.clone());
        Ok(user)
    }

    async fn get_user(&self, clerk_id: &str) -> AppResult<Option<User>> {
        Ok(self.inner.lock().await.users.get(clerk_id).cloned())
    }
}

#[async_trait]
impl ReminderLogStore for MemoryStore {
    async fn last_past_due_check(&self) -> AppResult<Option<DateTime<Utc>>> {
        Ok(self.inner.lock().await.last_past_due_check)
    }

    async fn set_last_past_due_check(&self, at: DateTime<Utc>) -> AppResult<()> {
        self.inner.lock().await.last_past_due_check = Some(at);
        Ok(())
    }

    async fn past_due_sent_on(&self, date: NaiveDate) -> AppResult<Vec<String>> {
        let state = self.inner.lock().await;
        let mut ids: Vec<String> = state
            .past_due_sent
            .iter()
            .filter(|(_, d)| **d == date)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn record_past_due_sent(&self, ids: &[String], date: NaiveDate) -> AppResult<()> {
        let mut state = self.inner.lock().await;
        state.past_due_sent.retain(|_, d| *d >= date);
        for id in ids {
            state.past_due_sent.insert(id.clone(), date);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{at, FixedClock};
    use crate::models::mood::{default_mood_types, mint_entry_id};

    fn store() -> (MemoryStore, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(at("2026-02-10", "12:00")));
        (MemoryStore::new(clock.clone()), clock)
    }

    fn entry(user: &str, date: &str, timestamp: i64) -> MoodEntry {
        MoodEntry {
            id: mint_entry_id(user, timestamp),
            user_id: user.into(),
            mood: default_mood_types()[0].clone(),
            intensity: 4,
            note: None,
            timestamp,
            date: date.parse().unwrap(),
        }
    }

    #[tokio::test]
    async fn test_same_day_saves_are_distinct() {
        let (store, _) = store();
        let a = store.save_mood_entry(&entry("u1", "2026-02-10", 1000)).await.unwrap();
        let b = store.save_mood_entry(&entry("u1", "2026-02-10", 2000)).await.unwrap();
        assert_ne!(a.id, b.id);

        let all = store.get_all_mood_entries("u1").await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, b.id);
        assert_eq!(all[1].id, a.id);
    }

    #[tokio::test]
    async fn test_save_never_overwrites() {
        let (store, _) = store();
        let e = entry("u1", "2026-02-10", 1000);
        store.save_mood_entry(&e).await.unwrap();
        let again = store.save_mood_entry(&e).await;
        assert!(matches!(again, Err(AppError::Conflict(_))));
        assert_eq!(store.get_all_mood_entries("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_updates_in_place() {
        let (store, _) = store();
        let mut e = entry("u1", "2026-02-10", 1000);
        store.save_mood_entry(&e).await.unwrap();
        e.intensity = 2;
        e.note = Some("rough afternoon".into());
        store.upsert_mood_entry(&e).await.unwrap();

        let all = store.get_all_mood_entries("u1").await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].intensity, 2);
    }

    #[tokio::test]
    async fn test_upsert_cannot_take_over_another_users_entry() {
        let (store, _) = store();
        let original = store.save_mood_entry(&entry("alice", "2026-02-10", 1000)).await.unwrap();

        let mut hijack = original.clone();
        hijack.user_id = "mallory".into();
        hijack.intensity = 1;
        assert!(matches!(
            store.upsert_mood_entry(&hijack).await,
            Err(AppError::NotFound(_))
        ));

        let alice = store.get_all_mood_entries("alice").await.unwrap();
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].intensity, 4);
        assert!(store.get_all_mood_entries("mallory").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_past_due_log_keeps_only_current_day() {
        let (store, _) = store();
        let monday: NaiveDate = "2026-02-09".parse().unwrap();
        let tuesday: NaiveDate = "2026-02-10".parse().unwrap();
        store
            .record_past_due_sent(&["past-due:m1:09:00:2026-02-09".to_string()], monday)
            .await
            .unwrap();
        store
            .record_past_due_sent(&["past-due:m1:09:00:2026-02-10".to_string()], tuesday)
            .await
            .unwrap();

        assert!(store.past_due_sent_on(monday).await.unwrap().is_empty());
        assert_eq!(
            store.past_due_sent_on(tuesday).await.unwrap(),
            vec!["past-due:m1:09:00:2026-02-10"]
        );

        assert!(store.last_past_due_check().await.unwrap().is_none());
        let checked = Utc::now();
        store.set_last_past_due_check(checked).await.unwrap();
        assert_eq!(store.last_past_due_check().await.unwrap(), Some(checked));
    }

    #[tokio::test]
    async fn test_ties_broken_by_creation_order() {
        let (store, _) = store();
        let first = store.save_mood_entry(&entry("u1", "2026-02-10", 5000)).await.unwrap();
        let second = store.save_mood_entry(&entry("u1", "2026-02-10", 5000)).await.unwrap();
        let latest = store
            .get_mood_entry_for_date("u1", "2026-02-10".parse().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, second.id);
        assert_ne!(latest.id, first.id);
    }

    #[tokio::test]
    async fn test_date_range_inclusive_and_scoped() {
        let (store, _) = store();
        for (date, ts) in [("2026-02-07", 1), ("2026-02-08", 2), ("2026-02-10", 3), ("2026-02-11", 4)] {
            store.save_mood_entry(&entry("u1", date, ts)).await.unwrap();
        }
        store.save_mood_entry(&entry("u2", "2026-02-09", 5)).await.unwrap();

        let range = store
            .get_mood_entries_for_date_range(
                "u1",
                "2026-02-08".parse().unwrap(),
                "2026-02-10".parse().unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(range.len(), 2);
        assert!(range.iter().all(|e| e.user_id == "u1"));
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let (store, _) = store();
        let e = store.save_mood_entry(&entry("u1", "2026-02-10", 1)).await.unwrap();
        store.delete_mood_entry(&e.id).await.unwrap();
        assert!(matches!(
            store.delete_mood_entry(&e.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_bad_intensity_rejected_before_write() {
        let (store, _) = store();
        let mut e = entry("u1", "2026-02-10", 1);
        e.intensity = 9;
        assert!(matches!(
            store.save_mood_entry(&e).await,
            Err(AppError::Validation(_))
        ));
        assert!(store.get_all_mood_entries("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mood_type_seed_is_set_once() {
        let (store, _) = store();
        let mut custom = default_mood_types()[0].clone();
        custom.name = "Joyful".into();
        store.seed_mood_type(custom.clone()).await;
        custom.name = "Overwritten".into();
        store.seed_mood_type(custom).await;
        let types = store.get_mood_types().await.unwrap();
        assert_eq!(types.iter().find(|m| m.id == "happy").unwrap().name, "Joyful");
    }

    #[tokio::test]
    async fn test_todays_doses_respects_local_day() {
        let (store, clock) = store();
        // 23:30 UTC on the 9th is 01:30 on the 10th at +02:00
        let late = DateTime::parse_from_rfc3339("2026-02-09T23:30:00Z").unwrap().with_timezone(&Utc);
        let early = DateTime::parse_from_rfc3339("2026-02-09T21:30:00Z").unwrap().with_timezone(&Utc);
        store.record_dose("m1", true, late).await.unwrap();
        store.record_dose("m1", true, early).await.unwrap();

        let today = store.get_todays_doses(clock.as_ref()).await.unwrap();
        assert_eq!(today.len(), 1);
        assert_eq!(today[0].timestamp, late);
    }

    #[tokio::test]
    async fn test_update_missing_medication() {
        let (store, _) = store();
        let med = crate::models::medication::sample_medication("nope");
        assert!(matches!(store.update(&med).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_user_upsert_keeps_created_at() {
        let (store, clock) = store();
        let mut req = CreateUserRequest {
            firstname: "Ada".into(),
            lastname: "Lovelace".into(),
            username: "ada".into(),
            email: "ada@example.com".into(),
            clerk_id: "user_1".into(),
            date_of_birth: None,
            gender: Some("female".into()),
        };
        let first = store.upsert_user(&req).await.unwrap();
        clock.advance(chrono::Duration::hours(1));
        req.username = "countess".into();
        req.gender = None;
        let second = store.upsert_user(&req).await.unwrap();
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.username, "countess");
        assert_eq!(second.gender.as_deref(), Some("female"));
    }
}
