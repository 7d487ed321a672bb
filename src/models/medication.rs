use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::clock::Clock;

/// A user-tracked wellness item (medication, supplement, habit).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Medication {
    pub id: String,
    pub name: String,
    pub dosage: String,
    pub frequency: String,
    /// Label whose first token is a day count, or "Ongoing".
    pub duration: String,
    pub start_date: DateTime<Utc>,
    /// "HH:MM" reminder times.
    pub times: Vec<String>,
    pub notes: String,
    pub reminder_enabled: bool,
    pub refill_reminder: bool,
    pub current_supply: i32,
    pub total_supply: i32,
    /// Supply percentage at or below which a refill reminder fires.
    pub refill_at: i32,
    pub last_refill_date: Option<DateTime<Utc>>,
    pub color: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CourseLength {
    Ongoing,
    Days(i64),
}

impl CourseLength {
    /// First whitespace-delimited token: an integer day count, `-1`, or "ongoing".
    pub fn parse(label: &str) -> Option<Self> {
        let token = label.split_whitespace().next()?;
        if token.eq_ignore_ascii_case("ongoing") {
            return Some(Self::Ongoing);
        }
        match token.parse::<i64>().ok()? {
            -1 => Some(Self::Ongoing),
            n if n >= 0 => Some(Self::Days(n)),
            _ => None,
        }
    }
}

impl Medication {
    pub fn course_length(&self) -> Option<CourseLength> {
        CourseLength::parse(&self.duration)
    }

    /// Ongoing items are always active; fixed courses run from the start date
    /// through start + N days inclusive. Unparseable durations are never active.
    /// A day count past the calendar's range has no end date.
    pub fn is_active_on(&self, today: NaiveDate, clock: &dyn Clock) -> bool {
        let start = clock.local_date(self.start_date);
        match self.course_length() {
            Some(CourseLength::Ongoing) => true,
            Some(CourseLength::Days(n)) => {
                let end = Duration::try_days(n).and_then(|d| start.checked_add_signed(d));
                start <= today && end.map_or(true, |end| today <= end)
            }
            None => false,
        }
    }

    pub fn supply_percentage(&self) -> Option<f64> {
        if self.total_supply <= 0 {
            return None;
        }
        Some(self.current_supply as f64 / self.total_supply as f64 * 100.0)
    }

    pub fn needs_refill(&self) -> bool {
        self.refill_reminder
            && self
                .supply_percentage()
                .map(|pct| pct <= self.refill_at as f64)
                .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoseHistory {
    pub id: String,
    pub medication_id: String,
    pub taken: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
pub struct MedicationRow {
    pub id: String,
    pub name: String,
    pub dosage: String,
    pub frequency: String,
    pub duration: String,
    pub start_date: DateTime<Utc>,
    pub times: Vec<String>,
    pub notes: String,
    pub reminder_enabled: bool,
    pub refill_reminder: bool,
    pub current_supply: i32,
    pub total_supply: i32,
    pub refill_at: i32,
    pub last_refill_date: Option<DateTime<Utc>>,
    pub color: String,
}

impl From<MedicationRow> for Medication {
    fn from(row: MedicationRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            dosage: row.dosage,
            frequency: row.frequency,
            duration: row.duration,
            start_date: row.start_date,
            times: row.times,
            notes: row.notes,
            reminder_enabled: row.reminder_enabled,
            refill_reminder: row.refill_reminder,
            current_supply: row.current_supply,
            total_supply: row.total_supply,
            refill_at: row.refill_at,
            last_refill_date: row.last_refill_date,
            color: row.color,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct DoseHistoryRow {
    pub id: String,
    pub medication_id: String,
    pub taken: bool,
    pub timestamp: DateTime<Utc>,
}

impl From<DoseHistoryRow> for DoseHistory {
    fn from(row: DoseHistoryRow) -> Self {
        Self {
            id: row.id,
            medication_id: row.medication_id,
            taken: row.taken,
            timestamp: row.timestamp,
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_medication(id: &str) -> Medication {
    Medication {
        id: id.into(),
        name: "Vitamin D".into(),
        dosage: "1 tablet".into(),
        frequency: "Once daily".into(),
        duration: "Ongoing".into(),
        start_date: DateTime::parse_from_rfc3339("2026-02-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc),
        times: vec!["09:00".into()],
        notes: String::new(),
        reminder_enabled: true,
        refill_reminder: false,
        current_supply: 0,
        total_supply: 0,
        refill_at: 0,
        last_refill_date: None,
        color: "#4CAF50".into(),
    }
}
