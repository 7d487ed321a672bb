//! Reminder scheduler
//!
//! Owns one in-process timer per deterministic reminder id:
//!
//! - `medication:{id}:{HH:MM}` fires daily at each reminder time
//! - `refill:{id}` fires once, tomorrow at 09:00, when supply is at or below `refillAt`
//! - `past-due:{id}:{HH:MM}:{date}` fires once, 30 minutes after a sweep finds a
//!   missed dose
//!
//! Scheduling the same id twice cancels the first timer, so callers can re-run
//! scheduling freely. Fired one-shot records stay in the registry until cancelled
//! or pruned; the past-due sweep uses them to avoid repeating itself.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::broadcast;
use tokio::task::AbortHandle;

use crate::clock::Clock;
use crate::error::{AppError, AppResult};
use crate::models::medication::{DoseHistory, Medication};

const REFILL_REMINDER_TIME: (u32, u32) = (9, 0);
const PAST_DUE_DELAY_MINUTES: i64 = 30;
/// A time less than this far in the future rolls over to tomorrow.
const MIN_LEAD_SECONDS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    Medication,
    Refill,
    PastDue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderState {
    Scheduled,
    Fired,
    /// Pending timer stopped after the dose was taken; kept for de-duplication.
    Dismissed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderRecord {
    pub id: String,
    pub medication_id: String,
    pub kind: ReminderKind,
    /// "HH:MM" for medication and past-due reminders.
    pub time: Option<String>,
    pub fire_at: DateTime<FixedOffset>,
    pub state: ReminderState,
    pub repeats_daily: bool,
    pub fired_count: u32,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderNotification {
    pub reminder_id: String,
    pub medication_id: String,
    pub kind: ReminderKind,
    pub title: String,
    pub body: String,
    pub fired_at: DateTime<FixedOffset>,
}

/// Receives fired reminders. Called from timer tasks; implementations must not
/// assume any ordering between concurrent firings.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &ReminderNotification);
}

/// Logs each reminder and fans it out to WebSocket subscribers.
pub struct BroadcastNotifier {
    tx: broadcast::Sender<String>,
}

impl BroadcastNotifier {
    pub fn new(tx: broadcast::Sender<String>) -> Self {
        Self { tx }
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, notification: &ReminderNotification) {
        tracing::info!(
            reminder_id = %notification.reminder_id,
            medication_id = %notification.medication_id,
            kind = ?notification.kind,
            "Reminder fired"
        );
        let msg = serde_json::json!({
            "type": "reminder",
            "reminder": notification,
        });
        // No subscribers is fine.
        let _ = self.tx.send(msg.to_string());
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderUpdate {
    pub reminder_ids: Vec<String>,
    pub refill_reminder_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PastDueSweep {
    Skipped { last_check: DateTime<FixedOffset> },
    Completed { scheduled: Vec<String> },
}

pub fn medication_reminder_id(medication_id: &str, time: NaiveTime) -> String {
    format!("medication:{}:{}", medication_id, time.format("%H:%M"))
}

pub fn refill_reminder_id(medication_id: &str) -> String {
    format!("refill:{}", medication_id)
}

pub fn past_due_reminder_id(medication_id: &str, time: NaiveTime, date: NaiveDate) -> String {
    format!("past-due:{}:{}:{}", medication_id, time.format("%H:%M"), date)
}

pub fn parse_reminder_time(raw: &str) -> AppResult<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|e| AppError::Scheduling(format!("invalid reminder time {:?}: {}", raw, e)))
}

/// Today at `time` if that is more than a minute away, otherwise tomorrow.
pub fn next_occurrence(now: DateTime<FixedOffset>, time: NaiveTime) -> DateTime<FixedOffset> {
    let today_at = at_local(now, now.date_naive(), time);
    if today_at - now > Duration::seconds(MIN_LEAD_SECONDS) {
        today_at
    } else {
        at_local(now, now.date_naive() + Duration::days(1), time)
    }
}

fn at_local(now: DateTime<FixedOffset>, date: NaiveDate, time: NaiveTime) -> DateTime<FixedOffset> {
    // A fixed offset maps every local time to exactly one instant.
    let naive = date.and_time(time) - Duration::seconds(now.offset().local_minus_utc() as i64);
    DateTime::from_naive_utc_and_offset(naive, *now.offset())
}

fn delay_until(now: DateTime<FixedOffset>, at: DateTime<FixedOffset>) -> std::time::Duration {
    (at - now).to_std().unwrap_or_default()
}

/// Reminder times already passed today, earliest first. Malformed times are
/// logged and skipped.
fn passed_slots(medication: &Medication, now: DateTime<FixedOffset>) -> Vec<NaiveTime> {
    let today = now.date_naive();
    let mut passed: Vec<NaiveTime> = medication
        .times
        .iter()
        .filter_map(|raw| match parse_reminder_time(raw) {
            Ok(time) => Some(time),
            Err(e) => {
                tracing::warn!(medication_id = %medication.id, error = %e, "Skipping reminder time");
                None
            }
        })
        .filter(|time| at_local(now, today, *time) <= now)
        .collect();
    passed.sort();
    passed.dedup();
    passed
}

struct Entry {
    record: ReminderRecord,
    handle: Option<AbortHandle>,
    /// Identifies the timer task that owns this entry.
    generation: u64,
}

struct SchedulerInner {
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    registry: Mutex<HashMap<String, Entry>>,
    next_generation: AtomicU64,
    last_past_due_check: Mutex<Option<DateTime<FixedOffset>>>,
    /// Past-due ids already sent, including ones restored from storage.
    sent_past_due: Mutex<HashSet<String>>,
    past_due_interval: Duration,
}

impl SchedulerInner {
    fn registry(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sent_past_due(&self) -> MutexGuard<'_, HashSet<String>> {
        self.sent_past_due.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn last_past_due_check(&self) -> MutexGuard<'_, Option<DateTime<FixedOffset>>> {
        self.last_past_due_check
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark `id` fired and notify. Returns the delay to the next firing for
    /// daily reminders. A task whose entry was replaced or cancelled while it
    /// was waking up does nothing.
    fn fire(&self, id: &str, generation: u64) -> Option<std::time::Duration> {
        let now = self.clock.now();
        let (notification, next_delay) = {
            let mut registry = self.registry();
            let entry = registry
                .get_mut(id)
                .filter(|e| e.generation == generation)?;
            let record = &mut entry.record;
            record.state = ReminderState::Fired;
            record.fired_count += 1;

            let notification = ReminderNotification {
                reminder_id: record.id.clone(),
                medication_id: record.medication_id.clone(),
                kind: record.kind,
                title: record.title.clone(),
                body: record.body.clone(),
                fired_at: now,
            };

            let next_time = record
                .time
                .as_deref()
                .filter(|_| record.repeats_daily)
                .and_then(|t| parse_reminder_time(t).ok());
            let next_delay = match next_time {
                Some(time) => {
                    let base = std::cmp::max(now, record.fire_at);
                    record.fire_at = next_occurrence(base, time);
                    record.state = ReminderState::Scheduled;
                    Some(delay_until(now, record.fire_at))
                }
                None => {
                    entry.handle = None;
                    None
                }
            };
            (notification, next_delay)
        };

        self.notifier.notify(&notification);
        next_delay
    }
}

async fn run_timer(
    inner: Weak<SchedulerInner>,
    id: String,
    generation: u64,
    mut delay: std::time::Duration,
) {
    loop {
        tokio::time::sleep(delay).await;
        let Some(inner) = inner.upgrade() else {
            return;
        };
        match inner.fire(&id, generation) {
            Some(next) => delay = next,
            None => return,
        }
    }
}

/// Process-wide reminder timers. Create once at startup, `shutdown` on exit.
#[derive(Clone)]
pub struct ReminderScheduler {
    inner: Arc<SchedulerInner>,
}

impl ReminderScheduler {
    pub fn new(clock: Arc<dyn Clock>, notifier: Arc<dyn Notifier>, past_due_interval: Duration) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                clock,
                notifier,
                registry: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
                last_past_due_check: Mutex::new(None),
                sent_past_due: Mutex::new(HashSet::new()),
                past_due_interval,
            }),
        }
    }

    /// Replace whatever is registered under `record.id` with a fresh timer.
    fn register(&self, mut record: ReminderRecord) -> String {
        let id = record.id.clone();
        let delay = delay_until(self.inner.clock.now(), record.fire_at);
        record.state = ReminderState::Scheduled;

        let mut registry = self.inner.registry();
        if let Some(previous) = registry.remove(&id) {
            if let Some(handle) = previous.handle {
                handle.abort();
            }
        }
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let task = tokio::spawn(run_timer(
            Arc::downgrade(&self.inner),
            id.clone(),
            generation,
            delay,
        ));
        registry.insert(
            id.clone(),
            Entry {
                record,
                handle: Some(task.abort_handle()),
                generation,
            },
        );

        tracing::debug!(reminder_id = %id, delay_secs = delay.as_secs(), "Reminder scheduled");
        id
    }

    fn cancel_where(&self, mut matches: impl FnMut(&ReminderRecord) -> bool) -> usize {
        let mut registry = self.inner.registry();
        let ids: Vec<String> = registry
            .values()
            .filter(|e| matches(&e.record))
            .map(|e| e.record.id.clone())
            .collect();
        for id in &ids {
            if let Some(entry) = registry.remove(id) {
                if let Some(handle) = entry.handle {
                    handle.abort();
                }
            }
        }
        ids.len()
    }

    /// Daily timers for each of the medication's reminder times. Malformed times
    /// are logged and skipped.
    pub fn schedule_medication_reminder(&self, medication: &Medication) -> Vec<String> {
        if !medication.reminder_enabled || medication.times.is_empty() {
            return Vec::new();
        }

        self.cancel_where(|r| r.medication_id == medication.id && r.kind == ReminderKind::Medication);

        let now = self.inner.clock.now();
        let mut ids = Vec::with_capacity(medication.times.len());
        for raw in &medication.times {
            let time = match parse_reminder_time(raw) {
                Ok(time) => time,
                Err(e) => {
                    tracing::warn!(medication_id = %medication.id, error = %e, "Skipping reminder time");
                    continue;
                }
            };
            let record = ReminderRecord {
                id: medication_reminder_id(&medication.id, time),
                medication_id: medication.id.clone(),
                kind: ReminderKind::Medication,
                time: Some(time.format("%H:%M").to_string()),
                fire_at: next_occurrence(now, time),
                state: ReminderState::Scheduled,
                repeats_daily: true,
                fired_count: 0,
                title: "Medication Reminder".into(),
                body: format!("Time to take {} ({})", medication.name, medication.dosage),
            };
            let id = self.register(record);
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }

    /// One refill reminder for tomorrow at 09:00, only while supply is at or
    /// below the threshold.
    pub fn schedule_refill_reminder(&self, medication: &Medication) -> Option<String> {
        if !medication.needs_refill() {
            return None;
        }

        let now = self.inner.clock.now();
        let (hour, minute) = REFILL_REMINDER_TIME;
        let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
        let record = ReminderRecord {
            id: refill_reminder_id(&medication.id),
            medication_id: medication.id.clone(),
            kind: ReminderKind::Refill,
            time: None,
            fire_at: at_local(now, now.date_naive() + Duration::days(1), time),
            state: ReminderState::Scheduled,
            repeats_daily: false,
            fired_count: 0,
            title: "Refill Reminder".into(),
            body: format!(
                "Your {} supply is running low. Current supply: {}/{}",
                medication.name, medication.current_supply, medication.total_supply
            ),
        };
        Some(self.register(record))
    }

    /// Reschedule a medication from scratch: drop its daily and refill timers,
    /// then re-evaluate both.
    pub fn update_medication_reminders(&self, medication: &Medication) -> ReminderUpdate {
        self.cancel_where(|r| {
            r.medication_id == medication.id && r.kind != ReminderKind::PastDue
        });
        ReminderUpdate {
            reminder_ids: self.schedule_medication_reminder(medication),
            refill_reminder_id: self.schedule_refill_reminder(medication),
        }
    }

    /// Find doses whose time passed today without a taken dose and queue one
    /// reminder per (medication, time, day). Runs at most once per interval.
    pub fn check_for_past_due_medications(
        &self,
        medications: &[Medication],
        todays_doses: &[DoseHistory],
    ) -> PastDueSweep {
        let now = self.inner.clock.now();
        {
            let mut last = self.inner.last_past_due_check();
            if let Some(last_check) = *last {
                if now - last_check < self.inner.past_due_interval {
                    return PastDueSweep::Skipped { last_check };
                }
            }
            *last = Some(now);
        }

        let today = now.date_naive();
        self.prune_past_due_before(today);

        let mut scheduled = Vec::new();
        for medication in medications.iter().filter(|m| m.reminder_enabled) {
            let taken = todays_doses
                .iter()
                .filter(|d| d.medication_id == medication.id && d.taken)
                .count();

            for time in passed_slots(medication, now).into_iter().skip(taken) {
                let id = past_due_reminder_id(&medication.id, time, today);
                if self.inner.sent_past_due().contains(&id) {
                    continue;
                }
                let label = time.format("%H:%M").to_string();
                let record = ReminderRecord {
                    id,
                    medication_id: medication.id.clone(),
                    kind: ReminderKind::PastDue,
                    time: Some(label.clone()),
                    fire_at: now + Duration::minutes(PAST_DUE_DELAY_MINUTES),
                    state: ReminderState::Scheduled,
                    repeats_daily: false,
                    fired_count: 0,
                    title: "Missed Dose".into(),
                    body: format!(
                        "Did you take {} ({})? It was scheduled for {}.",
                        medication.name, medication.dosage, label
                    ),
                };
                let id = self.register(record);
                self.inner.sent_past_due().insert(id.clone());
                scheduled.push(id);
            }
        }

        if !scheduled.is_empty() {
            tracing::info!(count = scheduled.len(), "Past-due reminders scheduled");
        }
        PastDueSweep::Completed { scheduled }
    }

    fn prune_past_due_before(&self, today: NaiveDate) {
        let stale = format!("{}", today);
        let is_stale = |id: &str| id.rsplit(':').next().map(|d| d < stale.as_str()).unwrap_or(false);
        let pruned = self.cancel_where(|r| r.kind == ReminderKind::PastDue && is_stale(&r.id));
        self.inner.sent_past_due().retain(|id| !is_stale(id));
        if pruned > 0 {
            tracing::debug!(pruned, "Pruned past-due reminders from earlier days");
        }
    }

    /// Seed the sweep guard and the sent-id set from storage, typically at
    /// startup. An older `last_check` never replaces a newer one.
    pub fn restore_past_due(
        &self,
        last_check: Option<DateTime<FixedOffset>>,
        sent: impl IntoIterator<Item = String>,
    ) {
        {
            let mut last = self.inner.last_past_due_check();
            if let Some(restored) = last_check {
                if last.map_or(true, |current| restored > current) {
                    *last = Some(restored);
                }
            }
        }
        self.inner.sent_past_due().extend(sent);
    }

    /// Stop pending past-due timers for the slots that today's taken doses
    /// cover. Doses cover the earliest passed slots first, so one dose never
    /// silences a later missed slot.
    pub fn dismiss_past_due(&self, medication: &Medication, taken_today: usize) -> usize {
        let now = self.inner.clock.now();
        let today = now.date_naive();
        let covered: HashSet<String> = passed_slots(medication, now)
            .into_iter()
            .take(taken_today)
            .map(|time| past_due_reminder_id(&medication.id, time, today))
            .collect();

        let mut registry = self.inner.registry();
        let mut dismissed = 0;
        for entry in registry.values_mut().filter(|e| {
            covered.contains(&e.record.id) && e.record.state == ReminderState::Scheduled
        }) {
            if let Some(handle) = entry.handle.take() {
                handle.abort();
            }
            entry.record.state = ReminderState::Dismissed;
            dismissed += 1;
        }
        dismissed
    }

    /// Remove every timer and record for a medication, whatever its kind.
    pub fn cancel_medication_reminders(&self, medication_id: &str) -> usize {
        self.cancel_where(|r| r.medication_id == medication_id)
    }

    pub fn cancel_refill_reminders(&self, medication_id: &str) -> usize {
        self.cancel_where(|r| r.medication_id == medication_id && r.kind == ReminderKind::Refill)
    }

    pub fn cancel_all(&self) -> usize {
        self.cancel_where(|_| true)
    }

    /// All tracked reminders, soonest first.
    pub fn reminders(&self) -> Vec<ReminderRecord> {
        let mut records: Vec<ReminderRecord> = self
            .inner
            .registry()
            .values()
            .map(|e| e.record.clone())
            .collect();
        records.sort_by(|a, b| a.fire_at.cmp(&b.fire_at).then_with(|| a.id.cmp(&b.id)));
        records
    }

    pub fn shutdown(&self) {
        let cancelled = self.cancel_all();
        tracing::info!(cancelled, "Reminder scheduler stopped");
    }
}
