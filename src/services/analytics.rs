//! Mood analytics
//!
//! Pure functions over mood entries plus a thin store-backed wrapper. Nothing in
//! here returns an error: a failed read produces the empty statistics.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::str::FromStr;
use std::sync::Arc;

use crate::clock::Clock;
use crate::models::mood::{MoodEntry, MoodType};
use crate::store::MoodEntryStore;

/// Change in average mood value that counts as a real shift week over week.
const TREND_THRESHOLD: f64 = 0.5;
const MAX_INSIGHTS: usize = 2;
const MAX_CONTEXT_NOTES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsPeriod {
    Week,
    Month,
}

impl StatsPeriod {
    pub fn days(self) -> i64 {
        match self {
            StatsPeriod::Week => 7,
            StatsPeriod::Month => 30,
        }
    }

    /// Inclusive window ending today.
    pub fn window(self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        (today - Duration::days(self.days() - 1), today)
    }
}

impl FromStr for StatsPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "week" => Ok(StatsPeriod::Week),
            "month" => Ok(StatsPeriod::Month),
            other => Err(format!("Unknown period '{}'. Use 'week' or 'month'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoodStats {
    pub total_entries: usize,
    pub average_mood: f64,
    pub mood_distribution: BTreeMap<String, usize>,
    pub streak: u32,
    pub period: StatsPeriod,
}

impl MoodStats {
    /// Zero everything, with every catalog id present in the distribution.
    pub fn empty(period: StatsPeriod, catalog: &[MoodType]) -> Self {
        Self {
            total_entries: 0,
            average_mood: 0.0,
            mood_distribution: catalog.iter().map(|m| (m.id.clone(), 0)).collect(),
            streak: 0,
            period,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyMoodSummary {
    pub date: NaiveDate,
    pub count: usize,
    pub average_mood: Option<f64>,
}

/// Mean of the mood types' catalog values. Intensity is not weighted in.
pub fn average_mood(entries: &[MoodEntry]) -> f64 {
    if entries.is_empty() {
        return 0.0;
    }
    entries.iter().map(|e| e.mood.value as f64).sum::<f64>() / entries.len() as f64
}

pub fn calculate_stats(
    entries: &[MoodEntry],
    period: StatsPeriod,
    today: NaiveDate,
    catalog: &[MoodType],
) -> MoodStats {
    let mut stats = MoodStats::empty(period, catalog);
    if entries.is_empty() {
        return stats;
    }

    for entry in entries {
        *stats.mood_distribution.entry(entry.mood.id.clone()).or_insert(0) += 1;
    }
    stats.total_entries = entries.len();
    stats.average_mood = average_mood(entries);
    stats.streak = current_streak(entries.iter().map(|e| e.date), today);
    stats
}

/// Consecutive days with at least one entry, counting back from today. No entry
/// today means no streak.
pub fn current_streak(dates: impl IntoIterator<Item = NaiveDate>, today: NaiveDate) -> u32 {
    let distinct: BTreeSet<NaiveDate> = dates.into_iter().collect();

    let mut streak = 0u32;
    let mut check_date = today;
    for date in distinct.iter().rev() {
        if *date > check_date {
            continue;
        }
        if *date == check_date {
            streak += 1;
            check_date -= Duration::days(1);
        } else {
            break;
        }
    }
    streak
}

/// Most frequent mood; ties go to the most recent entry.
pub fn dominant_mood(entries: &[MoodEntry]) -> Option<&MoodType> {
    let mut counts: HashMap<&str, (usize, i64, &MoodType)> = HashMap::new();
    for entry in entries {
        let slot = counts
            .entry(entry.mood.id.as_str())
            .or_insert((0, entry.timestamp, &entry.mood));
        slot.0 += 1;
        if entry.timestamp > slot.1 {
            slot.1 = entry.timestamp;
        }
    }
    counts
        .into_values()
        .max_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)))
        .map(|(_, _, mood)| mood)
}

/// Per-day entry count and average for every date in `[start, end]`.
pub fn daily_mood_averages(
    entries: &[MoodEntry],
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<DailyMoodSummary> {
    let mut by_date: BTreeMap<NaiveDate, (usize, f64)> = BTreeMap::new();
    for entry in entries.iter().filter(|e| e.date >= start && e.date <= end) {
        let slot = by_date.entry(entry.date).or_insert((0, 0.0));
        slot.0 += 1;
        slot.1 += entry.mood.value as f64;
    }

    start
        .iter_days()
        .take_while(|d| *d <= end)
        .map(|date| match by_date.get(&date) {
            Some((count, sum)) => DailyMoodSummary {
                date,
                count: *count,
                average_mood: Some(sum / *count as f64),
            },
            None => DailyMoodSummary {
                date,
                count: 0,
                average_mood: None,
            },
        })
        .collect()
}

/// Up to two short observations about this week, compared with last week when
/// there is data for it.
pub fn weekly_insights(this_week: &[MoodEntry], last_week: &[MoodEntry]) -> Vec<String> {
    if this_week.is_empty() {
        return vec!["Log your mood this week to start seeing insights.".into()];
    }

    let mut insights = Vec::new();
    let current = average_mood(this_week);

    if last_week.is_empty() {
        insights.push(if current >= 4.0 {
            "You've had a positive week overall. Keep doing what's working!".to_string()
        } else if current <= 2.0 {
            "This week has been challenging. It's okay to reach out for support.".to_string()
        } else {
            "Your week has been fairly balanced, with a mix of ups and downs.".to_string()
        });
    } else {
        let delta = current - average_mood(last_week);
        insights.push(if delta > TREND_THRESHOLD {
            "Your mood has improved compared to last week. Nice progress!".to_string()
        } else if delta < -TREND_THRESHOLD {
            "Your mood has dipped compared to last week. Be gentle with yourself.".to_string()
        } else {
            "Your mood has stayed steady compared to last week.".to_string()
        });
    }

    let logged_days: BTreeSet<NaiveDate> = this_week.iter().map(|e| e.date).collect();
    if logged_days.len() >= 5 {
        insights.push(format!(
            "Great consistency! You checked in on {} of the last 7 days.",
            logged_days.len()
        ));
    }

    if let Some(mood) = dominant_mood(this_week) {
        insights.push(format!(
            "You felt {} {} most often this week.",
            mood.name.to_lowercase(),
            mood.emoji
        ));
    }

    insights.truncate(MAX_INSIGHTS);
    insights
}

fn latest_on(entries: &[MoodEntry], date: NaiveDate) -> Option<&MoodEntry> {
    entries
        .iter()
        .filter(|e| e.date == date)
        .max_by_key(|e| e.timestamp)
}

/// Free-text mood digest handed to the chat feature as prompt context. The
/// section order is relied on downstream.
pub fn detailed_mood_context(entries: &[MoodEntry], today: NaiveDate) -> String {
    let mut sections: Vec<String> = Vec::new();

    if entries.is_empty() {
        sections.push("MOOD CONTEXT:\nNo mood entries recorded yet.".into());
    } else {
        let mut current = String::from("MOOD CONTEXT:\n");
        match latest_on(entries, today) {
            Some(entry) => {
                current.push_str(&format!(
                    "Today's mood: {} {} (intensity {}/5)",
                    entry.mood.name, entry.mood.emoji, entry.intensity
                ));
                if let Some(prev) = latest_on(entries, today - Duration::days(1)) {
                    let diff = entry.mood.value - prev.mood.value;
                    let change = match diff {
                        d if d > 0 => format!("up {} from yesterday ({})", d, prev.mood.name),
                        d if d < 0 => format!("down {} from yesterday ({})", -d, prev.mood.name),
                        _ => format!("same as yesterday ({})", prev.mood.name),
                    };
                    current.push_str(&format!("\nChange: {}", change));
                }
            }
            None => current.push_str("Today's mood: not logged yet"),
        }
        sections.push(current);

        let week_start = today - Duration::days(6);
        let week: Vec<MoodEntry> = entries
            .iter()
            .filter(|e| e.date >= week_start && e.date <= today)
            .cloned()
            .collect();
        if !week.is_empty() {
            let mut summary = String::from("Last 7 days:");
            summary.push_str(&format!("\n- Entries logged: {}", week.len()));
            summary.push_str(&format!("\n- Average mood: {:.1}/5", average_mood(&week)));
            if let Some(mood) = dominant_mood(&week) {
                summary.push_str(&format!("\n- Most frequent mood: {} {}", mood.name, mood.emoji));
            }
            sections.push(summary);
        }

        let mut noted: Vec<&MoodEntry> = entries
            .iter()
            .filter(|e| e.note.as_deref().map(|n| !n.trim().is_empty()).unwrap_or(false))
            .collect();
        noted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if !noted.is_empty() {
            let mut notes = String::from("Recent notes:");
            for entry in noted.into_iter().take(MAX_CONTEXT_NOTES) {
                notes.push_str(&format!(
                    "\n- {} ({}): \"{}\"",
                    entry.date.format("%b %-d"),
                    entry.mood.name,
                    entry.note.as_deref().unwrap_or_default().trim()
                ));
            }
            sections.push(notes);
        }
    }

    sections.push(
        [
            "Conversation approach:",
            "- Acknowledge how they're feeling before offering suggestions",
            "- Keep the tone warm and non-judgmental",
            "- Reference their recent notes only if it feels natural",
            "- Encourage small, achievable steps",
            "- Suggest professional support if they describe persistent distress",
        ]
        .join("\n"),
    );

    sections.join("\n\n")
}

/// Store-backed analytics for one user.
#[derive(Clone)]
pub struct MoodAnalytics {
    store: Arc<dyn MoodEntryStore>,
    clock: Arc<dyn Clock>,
}

impl MoodAnalytics {
    pub fn new(store: Arc<dyn MoodEntryStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    async fn catalog(&self) -> Vec<MoodType> {
        self.store
            .get_mood_types()
            .await
            .unwrap_or_else(|_| crate::models::mood::default_mood_types())
    }

    async fn entries_between(&self, user_id: &str, start: NaiveDate, end: NaiveDate) -> Vec<MoodEntry> {
        match self.store.get_mood_entries_for_date_range(user_id, start, end).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Mood entries unavailable for analytics");
                Vec::new()
            }
        }
    }

    pub async fn stats(&self, user_id: &str, period: StatsPeriod) -> MoodStats {
        let today = self.clock.today();
        let (start, end) = period.window(today);
        let catalog = self.catalog().await;
        let entries = self.entries_between(user_id, start, end).await;

        let mut stats = calculate_stats(&entries, period, today, &catalog);
        if stats.total_entries > 0 {
            stats.streak = self.get_current_streak(user_id).await;
        }
        stats
    }

    pub async fn get_current_streak(&self, user_id: &str) -> u32 {
        let today = self.clock.today();
        match self.store.get_all_mood_entries(user_id).await {
            Ok(entries) => current_streak(entries.iter().map(|e| e.date), today),
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Streak unavailable");
                0
            }
        }
    }

    pub async fn daily_averages(&self, user_id: &str, period: StatsPeriod) -> Vec<DailyMoodSummary> {
        let (start, end) = period.window(self.clock.today());
        let entries = self.entries_between(user_id, start, end).await;
        daily_mood_averages(&entries, start, end)
    }

    pub async fn weekly_insights(&self, user_id: &str) -> Vec<String> {
        let today = self.clock.today();
        let entries = self
            .entries_between(user_id, today - Duration::days(13), today)
            .await;
        let this_week_start = today - Duration::days(6);
        let (this_week, last_week): (Vec<MoodEntry>, Vec<MoodEntry>) =
            entries.into_iter().partition(|e| e.date >= this_week_start);
        weekly_insights(&this_week, &last_week)
    }

    pub async fn detailed_context(&self, user_id: &str) -> String {
        let today = self.clock.today();
        let entries = self
            .entries_between(user_id, today - Duration::days(6), today)
            .await;
        detailed_mood_context(&entries, today)
    }
}
