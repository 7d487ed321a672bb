//! # Mindful API: Request/Response DTOs
//!
//! All API contract types in one module.
//!
//! Conventions:
//! - `*Request`  → deserialized from client JSON body or query params
//! - `*Response` → serialized to client JSON
//! - Required text fields default to empty and are rejected by `validator`, so a
//!   missing field surfaces as a 400 rather than a body-parse rejection
//! - Field names are camelCase on the wire

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::medication::Medication;

// ============================================================================
// Common
// ============================================================================

/// Success envelope: `{ "data": ... }`
#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub data: T,
}

impl<T> DataResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Standard delete confirmation
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
    pub id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    pub user_id: Option<String>,
}

impl UserQuery {
    pub fn require_user_id(&self) -> Result<&str, crate::error::AppError> {
        self.user_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| crate::error::AppError::Validation("userId is required".into()))
    }
}

// ============================================================================
// Mood
// ============================================================================

/// POST /mood. Accepts the legacy free-form shape (`mood`, `label`, `color`)
/// and resolves it to a catalog mood type.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateMoodRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "userId is required"))]
    pub user_id: String,

    /// Mood type id, emoji, or display name
    #[serde(default)]
    #[validate(length(min = 1, message = "mood is required"))]
    pub mood: String,

    /// Fallback lookup key when `mood` does not resolve
    pub label: Option<String>,

    /// Ignored for storage; the catalog color wins
    pub color: Option<String>,

    /// Default: the mood type's value
    #[validate(range(min = 1, max = 5, message = "Intensity must be between 1 and 5"))]
    pub intensity: Option<i32>,

    #[validate(length(max = 200, message = "Note must be 200 characters or fewer"))]
    pub note: Option<String>,
}

/// PUT /mood/{id}: explicit update-by-id
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMoodRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "userId is required"))]
    pub user_id: String,

    #[serde(default)]
    #[validate(length(min = 1, message = "moodTypeId is required"))]
    pub mood_type_id: String,

    #[validate(range(min = 1, max = 5, message = "Intensity must be between 1 and 5"))]
    pub intensity: i32,

    #[validate(length(max = 200, message = "Note must be 200 characters or fewer"))]
    pub note: Option<String>,

    pub date: Option<NaiveDate>,

    /// Epoch milliseconds
    pub timestamp: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoodStatsQuery {
    pub user_id: Option<String>,
    /// "week" (default) or "month"
    pub period: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakResponse {
    pub user_id: String,
    pub streak: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoodContextResponse {
    pub user_id: String,
    pub context: String,
}

// ============================================================================
// Users
// ============================================================================

/// POST /user
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "firstname is required"))]
    pub firstname: String,

    #[serde(default)]
    #[validate(length(min = 1, message = "lastname is required"))]
    pub lastname: String,

    #[serde(default)]
    #[validate(length(min = 1, message = "username is required"))]
    pub username: String,

    #[serde(default)]
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[serde(default, rename = "clerkId")]
    #[validate(length(min = 1, message = "clerkId is required"))]
    pub clerk_id: String,

    pub date_of_birth: Option<NaiveDate>,

    pub gender: Option<String>,
}

// ============================================================================
// Medications
// ============================================================================

fn default_true() -> bool {
    true
}

fn default_color() -> String {
    "#4CAF50".into()
}

/// POST /medications
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewMedication {
    #[serde(default)]
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,

    #[serde(default)]
    #[validate(length(min = 1, message = "dosage is required"))]
    pub dosage: String,

    #[serde(default)]
    #[validate(length(min = 1, message = "frequency is required"))]
    pub frequency: String,

    /// e.g. "7 days", "30 days", "Ongoing"
    #[serde(default)]
    #[validate(length(min = 1, message = "duration is required"))]
    pub duration: String,

    /// Default: now
    pub start_date: Option<DateTime<Utc>>,

    #[serde(default)]
    pub times: Vec<String>,

    #[serde(default)]
    pub notes: String,

    #[serde(default = "default_true")]
    pub reminder_enabled: bool,

    #[serde(default)]
    pub refill_reminder: bool,

    #[serde(default)]
    #[validate(range(min = 0, message = "currentSupply cannot be negative"))]
    pub current_supply: i32,

    #[serde(default)]
    #[validate(range(min = 0, message = "totalSupply cannot be negative"))]
    pub total_supply: i32,

    #[serde(default)]
    #[validate(range(min = 0, max = 100, message = "refillAt must be a percentage"))]
    pub refill_at: i32,

    #[serde(default = "default_color")]
    pub color: String,
}

impl NewMedication {
    /// Trim the required labels so whitespace-only input fails validation.
    pub fn normalized(mut self) -> Self {
        self.name = self.name.trim().to_string();
        self.dosage = self.dosage.trim().to_string();
        self.frequency = self.frequency.trim().to_string();
        self.duration = self.duration.trim().to_string();
        self
    }

    pub fn into_medication(self, id: String, now: DateTime<Utc>) -> Medication {
        Medication {
            id,
            name: self.name,
            dosage: self.dosage,
            frequency: self.frequency,
            duration: self.duration,
            start_date: self.start_date.unwrap_or(now),
            times: self.times,
            notes: self.notes,
            reminder_enabled: self.reminder_enabled,
            refill_reminder: self.refill_reminder,
            current_supply: self.current_supply,
            total_supply: self.total_supply,
            refill_at: self.refill_at,
            last_refill_date: None,
            color: self.color,
        }
    }
}

/// POST /medications/{id}/doses
#[derive(Debug, Deserialize)]
pub struct RecordDoseRequest {
    /// Default: true
    pub taken: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodaysProgress {
    pub completed: usize,
    pub total: usize,
    pub ratio: f64,
}
