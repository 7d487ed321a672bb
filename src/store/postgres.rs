use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::db::Database;
use crate::dto::CreateUserRequest;
use crate::error::{AppError, AppResult};
use crate::models::medication::{DoseHistory, DoseHistoryRow, Medication, MedicationRow};
use crate::models::mood::{merge_mood_types, MoodEntry, MoodEntryRow, MoodType};
use crate::models::user::User;

use super::{MedicationStore, MoodEntryStore, ReminderLogStore, UserStore};

const MOOD_ENTRY_SELECT: &str = r#"
    SELECT e.id, e.user_id, e.intensity, e.note, e."date", e."timestamp",
           e.created_at, e.updated_at,
           t.id AS mood_type_id, t.name AS mood_name, t.emoji AS mood_emoji,
           t.color AS mood_color, t.value AS mood_value
    FROM mood_entries e
    JOIN mood_types t ON t.id = e.mood_type_id
"#;

#[derive(Clone)]
pub struct PgStore {
    db: Database,
}

impl PgStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

/// Reads degrade to the empty value when the backend is unreachable.
fn degrade<T: Default>(what: &str, result: Result<T, sqlx::Error>) -> T {
    result.unwrap_or_else(|e| {
        tracing::warn!(error = %e, read = what, "Read failed, returning empty result");
        T::default()
    })
}

async fn fetch_mood_entry(pool: &sqlx::PgPool, id: &str) -> AppResult<MoodEntry> {
    let row = sqlx::query_as::<_, MoodEntryRow>(&format!("{MOOD_ENTRY_SELECT} WHERE e.id = $1"))
        .bind(id)
        .fetch_one(pool)
        .await?;
    Ok(row.into())
}

#[async_trait]
impl MoodEntryStore for PgStore {
    async fn save_mood_entry(&self, entry: &MoodEntry) -> AppResult<MoodEntry> {
        validator::Validate::validate(entry)?;
        let pool = self.db.writer()?;

        sqlx::query(
            r#"
            INSERT INTO mood_entries (id, user_id, mood_type_id, intensity, note, "date", "timestamp")
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.user_id)
        .bind(&entry.mood.id)
        .bind(entry.intensity)
        .bind(&entry.note)
        .bind(entry.date)
        .bind(entry.timestamp)
        .execute(pool)
        .await
        .map_err(|e| AppError::from_write(e, "Mood entry"))?;

        fetch_mood_entry(pool, &entry.id).await
    }

    async fn upsert_mood_entry(&self, entry: &MoodEntry) -> AppResult<MoodEntry> {
        validator::Validate::validate(entry)?;
        let pool = self.db.writer()?;

        // An id owned by another user matches no row and is reported missing.
        let result = sqlx::query(
            r#"
            INSERT INTO mood_entries (id, user_id, mood_type_id, intensity, note, "date", "timestamp")
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                mood_type_id = EXCLUDED.mood_type_id,
                intensity = EXCLUDED.intensity,
                note = EXCLUDED.note,
                "date" = EXCLUDED."date",
                "timestamp" = EXCLUDED."timestamp",
                updated_at = NOW()
            WHERE mood_entries.user_id = EXCLUDED.user_id
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.user_id)
        .bind(&entry.mood.id)
        .bind(entry.intensity)
        .bind(&entry.note)
        .bind(entry.date)
        .bind(entry.timestamp)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Mood entry not found".into()));
        }
        fetch_mood_entry(pool, &entry.id).await
    }

    async fn get_all_mood_entries(&self, user_id: &str) -> AppResult<Vec<MoodEntry>> {
        let Some(pool) = self.db.reader() else {
            return Ok(Vec::new());
        };
        let rows = sqlx::query_as::<_, MoodEntryRow>(&format!(
            r#"{MOOD_ENTRY_SELECT}
            WHERE e.user_id = $1
            ORDER BY e."timestamp" DESC, e.created_at DESC"#
        ))
        .bind(user_id)
        .fetch_all(pool)
        .await;
        Ok(degrade("mood_entries", rows).into_iter().map(Into::into).collect())
    }

    async fn get_recent_mood_entries(
        &self,
        user_id: &str,
        limit: i64,
    ) -> AppResult<Vec<MoodEntry>> {
        let Some(pool) = self.db.reader() else {
            return Ok(Vec::new());
        };
        let rows = sqlx::query_as::<_, MoodEntryRow>(&format!(
            r#"{MOOD_ENTRY_SELECT}
            WHERE e.user_id = $1
            ORDER BY e.created_at DESC
            LIMIT $2"#
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(pool)
        .await;
        Ok(degrade("mood_entries", rows).into_iter().map(Into::into).collect())
    }

    async fn get_mood_entries_for_date_range(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AppResult<Vec<MoodEntry>> {
        let Some(pool) = self.db.reader() else {
            return Ok(Vec::new());
        };
        let rows = sqlx::query_as::<_, MoodEntryRow>(&format!(
            r#"{MOOD_ENTRY_SELECT}
            WHERE e.user_id = $1 AND e."date" BETWEEN $2 AND $3
            ORDER BY e."timestamp" DESC, e.created_at DESC"#
        ))
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_all(pool)
        .await;
        Ok(degrade("mood_entries", rows).into_iter().map(Into::into).collect())
    }

    async fn get_mood_entry_for_date(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> AppResult<Option<MoodEntry>> {
        let Some(pool) = self.db.reader() else {
            return Ok(None);
        };
        let row = sqlx::query_as::<_, MoodEntryRow>(&format!(
            r#"{MOOD_ENTRY_SELECT}
            WHERE e.user_id = $1 AND e."date" = $2
            ORDER BY e."timestamp" DESC, e.created_at DESC
            LIMIT 1"#
        ))
        .bind(user_id)
        .bind(date)
        .fetch_optional(pool)
        .await;
        Ok(degrade("mood_entries", row).map(Into::into))
    }

    async fn delete_mood_entry(&self, id: &str) -> AppResult<()> {
        let pool = self.db.writer()?;
        let result = sqlx::query("DELETE FROM mood_entries WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Mood entry not found".into()));
        }
        Ok(())
    }

    async fn clear_mood_entries(&self, user_id: &str) -> AppResult<u64> {
        let pool = self.db.writer()?;
        let result = sqlx::query("DELETE FROM mood_entries WHERE user_id = $1")
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn get_mood_types(&self) -> AppResult<Vec<MoodType>> {
        let Some(pool) = self.db.reader() else {
            return Ok(merge_mood_types(Vec::new()));
        };
        let rows = sqlx::query_as::<_, MoodType>(
            "SELECT id, name, emoji, color, value FROM mood_types ORDER BY value DESC, id ASC",
        )
        .fetch_all(pool)
        .await;
        Ok(merge_mood_types(degrade("mood_types", rows)))
    }
}

#[async_trait]
impl MedicationStore for PgStore {
    async fn get_all(&self) -> AppResult<Vec<Medication>> {
        let Some(pool) = self.db.reader() else {
            return Ok(Vec::new());
        };
        let rows = sqlx::query_as::<_, MedicationRow>(
            "SELECT * FROM medications ORDER BY start_date ASC, created_at ASC",
        )
        .fetch_all(pool)
        .await;
        Ok(degrade("medications", rows).into_iter().map(Into::into).collect())
    }

    async fn get(&self, id: &str) -> AppResult<Option<Medication>> {
        let Some(pool) = self.db.reader() else {
            return Ok(None);
        };
        let row = sqlx::query_as::<_, MedicationRow>("SELECT * FROM medications WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await;
        Ok(degrade("medications", row).map(Into::into))
    }

    async fn add(&self, medication: &Medication) -> AppResult<()> {
        let pool = self.db.writer()?;
        sqlx::query(
            r#"
            INSERT INTO medications (
                id, name, dosage, frequency, duration, start_date, times, notes,
                reminder_enabled, refill_reminder, current_supply, total_supply,
                refill_at, last_refill_date, color
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(&medication.id)
        .bind(&medication.name)
        .bind(&medication.dosage)
        .bind(&medication.frequency)
        .bind(&medication.duration)
        .bind(medication.start_date)
        .bind(&medication.times)
        .bind(&medication.notes)
        .bind(medication.reminder_enabled)
        .bind(medication.refill_reminder)
        .bind(medication.current_supply)
        .bind(medication.total_supply)
        .bind(medication.refill_at)
        .bind(medication.last_refill_date)
        .bind(&medication.color)
        .execute(pool)
        .await
        .map_err(|e| AppError::from_write(e, "Medication"))?;
        Ok(())
    }

    async fn update(&self, medication: &Medication) -> AppResult<()> {
        let pool = self.db.writer()?;
        let result = sqlx::query(
            r#"
            UPDATE medications SET
                name = $2,
                dosage = $3,
                frequency = $4,
                duration = $5,
                start_date = $6,
                times = $7,
                notes = $8,
                reminder_enabled = $9,
                refill_reminder = $10,
                current_supply = $11,
                total_supply = $12,
                refill_at = $13,
                last_refill_date = $14,
                color = $15,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(&medication.id)
        .bind(&medication.name)
        .bind(&medication.dosage)
        .bind(&medication.frequency)
        .bind(&medication.duration)
        .bind(medication.start_date)
        .bind(&medication.times)
        .bind(&medication.notes)
        .bind(medication.reminder_enabled)
        .bind(medication.refill_reminder)
        .bind(medication.current_supply)
        .bind(medication.total_supply)
        .bind(medication.refill_at)
        .bind(medication.last_refill_date)
        .bind(&medication.color)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Medication not found".into()));
        }
        Ok(())
    }

    async fn record_dose(
        &self,
        medication_id: &str,
        taken: bool,
        timestamp: DateTime<Utc>,
    ) -> AppResult<DoseHistory> {
        let pool = self.db.writer()?;
        let row = sqlx::query_as::<_, DoseHistoryRow>(
            r#"
            INSERT INTO dose_history (id, medication_id, taken, "timestamp")
            VALUES ($1, $2, $3, $4)
            RETURNING id, medication_id, taken, "timestamp"
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(medication_id)
        .bind(taken)
        .bind(timestamp)
        .fetch_one(pool)
        .await?;
        Ok(row.into())
    }

    async fn get_doses_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<DoseHistory>> {
        let Some(pool) = self.db.reader() else {
            return Ok(Vec::new());
        };
        let rows = sqlx::query_as::<_, DoseHistoryRow>(
            r#"
            SELECT id, medication_id, taken, "timestamp" FROM dose_history
            WHERE "timestamp" >= $1 AND "timestamp" < $2
            ORDER BY "timestamp" ASC
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(pool)
        .await;
        Ok(degrade("dose_history", rows).into_iter().map(Into::into).collect())
    }

    async fn clear_all(&self) -> AppResult<()> {
        let pool = self.db.writer()?;
        sqlx::query("DELETE FROM dose_history").execute(pool).await?;
        sqlx::query("DELETE FROM medications").execute(pool).await?;
        Ok(())
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn upsert_user(&self, user: &CreateUserRequest) -> AppResult<User> {
        let pool = self.db.writer()?;
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (clerk_id, firstname, lastname, username, email, date_of_birth, gender)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (clerk_id) DO UPDATE SET
                firstname = EXCLUDED.firstname,
                lastname = EXCLUDED.lastname,
                username = EXCLUDED.username,
                email = EXCLUDED.email,
                date_of_birth = COALESCE(EXCLUDED.date_of_birth, users.date_of_birth),
                gender = COALESCE(EXCLUDED.gender, users.gender),
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(&user.clerk_id)
        .bind(&user.firstname)
        .bind(&user.lastname)
        .bind(&user.username)
        .bind(&user.email)
        .bind(user.date_of_birth)
        .bind(&user.gender)
        .fetch_one(pool)
        .await?;
        Ok(user)
    }

    async fn get_user(&self, clerk_id: &str) -> AppResult<Option<User>> {
        let Some(pool) = self.db.reader() else {
            return Ok(None);
        };
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE clerk_id = $1")
            .bind(clerk_id)
            .fetch_optional(pool)
            .await;
        Ok(degrade("users", user))
    }
}

const PAST_DUE_CHECK: &str = "past_due";

#[async_trait]
impl ReminderLogStore for PgStore {
    async fn last_past_due_check(&self) -> AppResult<Option<DateTime<Utc>>> {
        let Some(pool) = self.db.reader() else {
            return Ok(None);
        };
        let checked_at = sqlx::query_scalar::<_, DateTime<Utc>>(
            "SELECT checked_at FROM reminder_checks WHERE name = $1",
        )
        .bind(PAST_DUE_CHECK)
        .fetch_optional(pool)
        .await;
        Ok(degrade("reminder_checks", checked_at))
    }

    async fn set_last_past_due_check(&self, at: DateTime<Utc>) -> AppResult<()> {
        let pool = self.db.writer()?;
        sqlx::query(
            r#"
            INSERT INTO reminder_checks (name, checked_at)
            VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE SET checked_at = EXCLUDED.checked_at
            "#,
        )
        .bind(PAST_DUE_CHECK)
        .bind(at)
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn past_due_sent_on(&self, date: NaiveDate) -> AppResult<Vec<String>> {
        let Some(pool) = self.db.reader() else {
            return Ok(Vec::new());
        };
        let ids = sqlx::query_scalar::<_, String>(
            r#"SELECT id FROM past_due_log WHERE "date" = $1 ORDER BY id"#,
        )
        .bind(date)
        .fetch_all(pool)
        .await;
        Ok(degrade("past_due_log", ids))
    }

    async fn record_past_due_sent(&self, ids: &[String], date: NaiveDate) -> AppResult<()> {
        let pool = self.db.writer()?;
        let mut tx = pool.begin().await?;
        sqlx::query(r#"DELETE FROM past_due_log WHERE "date" < $1"#)
            .bind(date)
            .execute(&mut *tx)
            .await?;
        for id in ids {
            sqlx::query(
                r#"
                INSERT INTO past_due_log (id, "date") VALUES ($1, $2)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(id)
            .bind(date)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::mood::default_mood_types;

    fn entry() -> MoodEntry {
        MoodEntry {
            id: "e1".into(),
            user_id: "u1".into(),
            mood: default_mood_types()[0].clone(),
            intensity: 3,
            note: None,
            timestamp: 0,
            date: NaiveDate::from_ymd_opt(2026, 2, 10).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_unavailable_reads_are_empty() {
        let store = PgStore::new(Database::unavailable());
        assert!(store.get_all_mood_entries("u1").await.unwrap().is_empty());
        assert!(store
            .get_mood_entry_for_date("u1", NaiveDate::from_ymd_opt(2026, 2, 10).unwrap())
            .await
            .unwrap()
            .is_none());
        assert!(MedicationStore::get_all(&store).await.unwrap().is_empty());
        assert_eq!(store.get_mood_types().await.unwrap().len(), 8);
        assert!(store.get_user("user_1").await.unwrap().is_none());
        assert!(store.last_past_due_check().await.unwrap().is_none());
        assert!(store
            .past_due_sent_on(NaiveDate::from_ymd_opt(2026, 2, 10).unwrap())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_writes_fail() {
        let store = PgStore::new(Database::unavailable());
        assert!(matches!(
            store.save_mood_entry(&entry()).await,
            Err(AppError::Unavailable)
        ));
        assert!(matches!(
            store.record_dose("m1", true, Utc::now()).await,
            Err(AppError::Unavailable)
        ));
        assert!(matches!(store.clear_all().await, Err(AppError::Unavailable)));
        assert!(matches!(
            store.set_last_past_due_check(Utc::now()).await,
            Err(AppError::Unavailable)
        ));
    }

    #[tokio::test]
    async fn test_validation_precedes_io() {
        let store = PgStore::new(Database::unavailable());
        let mut bad = entry();
        bad.intensity = 0;
        assert!(matches!(
            store.save_mood_entry(&bad).await,
            Err(AppError::Validation(_))
        ));
    }
}
