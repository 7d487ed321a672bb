use chrono::{DateTime, NaiveDate, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct MoodType {
    pub id: String,
    pub name: String,
    pub emoji: String,
    pub color: String,
    pub value: i32,
}

impl MoodType {
    fn builtin(id: &str, name: &str, emoji: &str, color: &str, value: i32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            emoji: emoji.into(),
            color: color.into(),
            value,
        }
    }
}

pub const NEUTRAL_MOOD_ID: &str = "neutral";

/// The eight mood types every install ships with.
pub fn default_mood_types() -> Vec<MoodType> {
    vec![
        MoodType::builtin("happy", "Happy", "😊", "#4CAF50", 5),
        MoodType::builtin("excited", "Excited", "🤩", "#FF9800", 5),
        MoodType::builtin("calm", "Calm", "😌", "#03A9F4", 4),
        MoodType::builtin(NEUTRAL_MOOD_ID, "Neutral", "😐", "#9E9E9E", 3),
        MoodType::builtin("tired", "Tired", "😴", "#795548", 2),
        MoodType::builtin("anxious", "Anxious", "😰", "#FF5722", 2),
        MoodType::builtin("sad", "Sad", "😢", "#2196F3", 1),
        MoodType::builtin("angry", "Angry", "😠", "#F44336", 1),
    ]
}

/// Overlay database rows onto the built-in catalog. Rows replace built-ins with the
/// same id; unknown ids are appended.
pub fn merge_mood_types(overrides: Vec<MoodType>) -> Vec<MoodType> {
    let mut catalog = default_mood_types();
    for row in overrides {
        match catalog.iter_mut().find(|m| m.id == row.id) {
            Some(existing) => *existing = row,
            None => catalog.push(row),
        }
    }
    catalog
}

/// Match a free-form mood (id, emoji, or display name) against the catalog.
pub fn resolve_mood_type<'a>(
    catalog: &'a [MoodType],
    mood: &str,
    label: Option<&str>,
) -> Option<&'a MoodType> {
    let mood = mood.trim();
    catalog
        .iter()
        .find(|m| m.id.eq_ignore_ascii_case(mood) || m.emoji == mood)
        .or_else(|| catalog.iter().find(|m| m.name.eq_ignore_ascii_case(mood)))
        .or_else(|| {
            let label = label?.trim();
            catalog.iter().find(|m| m.name.eq_ignore_ascii_case(label))
        })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MoodEntry {
    pub id: String,
    #[validate(length(min = 1, message = "userId is required"))]
    pub user_id: String,
    pub mood: MoodType,
    #[validate(range(min = 1, max = 5, message = "Intensity must be between 1 and 5"))]
    pub intensity: i32,
    #[validate(length(max = 200, message = "Note must be 200 characters or fewer"))]
    pub note: Option<String>,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub date: NaiveDate,
}

/// A fresh id for every saved entry: timestamp, random suffix, user id.
pub fn mint_entry_id(user_id: &str, timestamp_ms: i64) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!("{}-{}-{}", timestamp_ms, suffix, user_id)
}

/// `mood_entries` joined with `mood_types`.
#[derive(Debug, FromRow)]
pub struct MoodEntryRow {
    pub id: String,
    pub user_id: String,
    pub intensity: i32,
    pub note: Option<String>,
    pub date: NaiveDate,
    pub timestamp: i64,
    #[allow(dead_code)]
    pub created_at: DateTime<Utc>,
    #[allow(dead_code)]
    pub updated_at: DateTime<Utc>,
    pub mood_type_id: String,
    pub mood_name: String,
    pub mood_emoji: String,
    pub mood_color: String,
    pub mood_value: i32,
}

impl From<MoodEntryRow> for MoodEntry {
    fn from(row: MoodEntryRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            mood: MoodType {
                id: row.mood_type_id,
                name: row.mood_name,
                emoji: row.mood_emoji,
                color: row.mood_color,
                value: row.mood_value,
            },
            intensity: row.intensity,
            note: row.note,
            timestamp: row.timestamp,
            date: row.date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_shape() {
        let catalog = default_mood_types();
        assert_eq!(catalog.len(), 8);
        for m in &catalog {
            assert!((1..=5).contains(&m.value), "{} out of range", m.id);
            assert!(m.color.starts_with('#'));
        }
    }

    #[test]
    fn test_merge_overrides_and_appends() {
        let merged = merge_mood_types(vec![
            MoodType::builtin("happy", "Joyful", "😄", "#00FF00", 5),
            MoodType::builtin("hopeful", "Hopeful", "🌱", "#AED581", 4),
        ]);
        assert_eq!(merged.len(), 9);
        assert_eq!(merged.iter().find(|m| m.id == "happy").unwrap().name, "Joyful");
        assert!(merged.iter().any(|m| m.id == "hopeful"));
    }

    #[test]
    fn test_resolve_by_id_emoji_name_label() {
        let catalog = default_mood_types();
        assert_eq!(resolve_mood_type(&catalog, "calm", None).unwrap().id, "calm");
        assert_eq!(resolve_mood_type(&catalog, "😢", None).unwrap().id, "sad");
        assert_eq!(resolve_mood_type(&catalog, "Tired", None).unwrap().id, "tired");
        assert_eq!(
            resolve_mood_type(&catalog, "🫠", Some("anxious")).unwrap().id,
            "anxious"
        );
        assert!(resolve_mood_type(&catalog, "🫠", Some("melting")).is_none());
    }

    #[test]
    fn test_minted_ids_are_unique() {
        let a = mint_entry_id("user_1", 1_700_000_000_000);
        let b = mint_entry_id("user_1", 1_700_000_000_000);
        assert_ne!(a, b);
        assert!(a.starts_with("1700000000000-"));
        assert!(a.ends_with("-user_1"));
    }

    #[test]
    fn test_intensity_validation() {
        let mut entry = MoodEntry {
            id: "e1".into(),
            user_id: "u1".into(),
            mood: default_mood_types()[0].clone(),
            intensity: 6,
            note: None,
            timestamp: 0,
            date: NaiveDate::from_ymd_opt(2026, 2, 10).unwrap(),
        };
        assert!(entry.validate().is_err());
        entry.intensity = 5;
        assert!(entry.validate().is_ok());
        entry.note = Some("x".repeat(201));
        assert!(entry.validate().is_err());
    }
}
