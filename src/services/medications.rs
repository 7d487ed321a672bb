use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::clock::Clock;
use crate::dto::{NewMedication, TodaysProgress};
use crate::error::{AppError, AppResult};
use crate::models::medication::{DoseHistory, Medication};
use crate::services::reminders::{PastDueSweep, ReminderScheduler, ReminderUpdate};
use crate::store::{MedicationStore, ReminderLogStore};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedMedication {
    pub medication: Medication,
    pub reminders: ReminderUpdate,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoseOutcome {
    pub dose: DoseHistory,
    pub medication: Medication,
}

/// Medication records, dose history and their reminder timers, kept in step.
#[derive(Clone)]
pub struct MedicationService {
    store: Arc<dyn MedicationStore>,
    log: Arc<dyn ReminderLogStore>,
    scheduler: ReminderScheduler,
    clock: Arc<dyn Clock>,
}

impl MedicationService {
    pub fn new(
        store: Arc<dyn MedicationStore>,
        log: Arc<dyn ReminderLogStore>,
        scheduler: ReminderScheduler,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            log,
            scheduler,
            clock,
        }
    }

    pub fn scheduler(&self) -> &ReminderScheduler {
        &self.scheduler
    }

    async fn require(&self, id: &str) -> AppResult<Medication> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Medication not found".into()))
    }

    pub async fn list(&self) -> AppResult<Vec<Medication>> {
        self.store.get_all().await
    }

    pub async fn add_medication(&self, req: NewMedication) -> AppResult<SavedMedication> {
        let req = req.normalized();
        req.validate()?;

        let medication = req.into_medication(Uuid::new_v4().to_string(), self.clock.now_utc());
        self.store.add(&medication).await?;

        let reminders = self.scheduler.update_medication_reminders(&medication);
        tracing::info!(
            medication_id = %medication.id,
            reminders = reminders.reminder_ids.len(),
            "Medication added"
        );

        Ok(SavedMedication {
            medication,
            reminders,
        })
    }

    /// Replace the editable fields. Start date and refill history survive when
    /// the request leaves them out.
    pub async fn update_medication(&self, id: &str, req: NewMedication) -> AppResult<SavedMedication> {
        let req = req.normalized();
        req.validate()?;

        let existing = self.require(id).await?;
        let mut medication = req.into_medication(existing.id.clone(), existing.start_date);
        medication.last_refill_date = existing.last_refill_date;

        self.store.update(&medication).await?;
        let reminders = self.scheduler.update_medication_reminders(&medication);

        Ok(SavedMedication {
            medication,
            reminders,
        })
    }

    pub async fn take_dose(&self, id: &str) -> AppResult<DoseOutcome> {
        let mut medication = self.require(id).await?;
        let dose = self.store.record_dose(id, true, self.clock.now_utc()).await?;

        medication.current_supply = (medication.current_supply - 1).max(0);
        self.store.update(&medication).await?;

        self.scheduler.update_medication_reminders(&medication);
        let taken_today = self
            .todays_doses()
            .await?
            .iter()
            .filter(|d| d.medication_id == id && d.taken)
            .count();
        let dismissed = self.scheduler.dismiss_past_due(&medication, taken_today);
        if dismissed > 0 {
            tracing::debug!(medication_id = %id, dismissed, "Past-due reminders dismissed");
        }

        Ok(DoseOutcome { dose, medication })
    }

    pub async fn record_missed_dose(&self, id: &str) -> AppResult<DoseHistory> {
        self.require(id).await?;
        self.store.record_dose(id, false, self.clock.now_utc()).await
    }

    pub async fn refill(&self, id: &str) -> AppResult<Medication> {
        let mut medication = self.require(id).await?;
        medication.current_supply = medication.total_supply;
        medication.last_refill_date = Some(self.clock.now_utc());
        self.store.update(&medication).await?;

        self.scheduler.cancel_refill_reminders(id);
        tracing::info!(medication_id = %id, supply = medication.current_supply, "Medication refilled");
        Ok(medication)
    }

    pub async fn todays_medications(&self) -> AppResult<Vec<Medication>> {
        let today = self.clock.today();
        let all = self.store.get_all().await?;
        Ok(all
            .into_iter()
            .filter(|m| m.is_active_on(today, self.clock.as_ref()))
            .collect())
    }

    pub async fn todays_doses(&self) -> AppResult<Vec<DoseHistory>> {
        self.store.get_todays_doses(self.clock.as_ref()).await
    }

    /// Scheduled slots across today's medications against taken doses. A
    /// medication's taken count is capped at its slot count.
    pub async fn todays_progress(&self) -> AppResult<TodaysProgress> {
        let medications = self.todays_medications().await?;
        let doses = self.todays_doses().await?;

        let mut taken: HashMap<&str, usize> = HashMap::new();
        for dose in doses.iter().filter(|d| d.taken) {
            *taken.entry(dose.medication_id.as_str()).or_insert(0) += 1;
        }

        let total: usize = medications.iter().map(|m| m.times.len()).sum();
        let completed: usize = medications
            .iter()
            .map(|m| taken.get(m.id.as_str()).copied().unwrap_or(0).min(m.times.len()))
            .sum();
        let ratio = if total == 0 {
            0.0
        } else {
            completed as f64 / total as f64
        };

        Ok(TodaysProgress {
            completed,
            total,
            ratio,
        })
    }

    pub async fn clear_all(&self) -> AppResult<()> {
        self.store.clear_all().await?;
        let cancelled = self.scheduler.cancel_all();
        tracing::info!(cancelled, "All medication data cleared");
        Ok(())
    }

    pub async fn run_past_due_sweep(&self) -> AppResult<PastDueSweep> {
        let medications = self.todays_medications().await?;
        let doses = self.todays_doses().await?;
        let sweep = self
            .scheduler
            .check_for_past_due_medications(&medications, &doses);
        if let PastDueSweep::Completed { scheduled } = &sweep {
            self.persist_past_due(scheduled).await;
        }
        Ok(sweep)
    }

    /// Timers already run in memory, so a failed write is logged and the
    /// sweep still counts.
    async fn persist_past_due(&self, scheduled: &[String]) {
        if let Err(e) = self.log.set_last_past_due_check(self.clock.now_utc()).await {
            tracing::warn!(error = %e, "Failed to persist past-due check time");
        }
        if scheduled.is_empty() {
            return;
        }
        if let Err(e) = self.log.record_past_due_sent(scheduled, self.clock.today()).await {
            tracing::warn!(error = %e, "Failed to persist past-due reminder ids");
        }
    }

    /// Load the last sweep time and today's sent past-due ids, so a restart
    /// neither sweeps early nor sends a slot's reminder twice.
    pub async fn restore_past_due_state(&self) -> AppResult<usize> {
        let last_check = self.log.last_past_due_check().await?;
        let sent = self.log.past_due_sent_on(self.clock.today()).await?;
        let restored = sent.len();

        let offset = *self.clock.now().offset();
        self.scheduler
            .restore_past_due(last_check.map(|at| at.with_timezone(&offset)), sent);
        tracing::info!(restored, "Past-due reminder state restored");
        Ok(restored)
    }

    /// Reschedule every stored medication. Returns how many were processed.
    pub async fn resync_reminders(&self) -> AppResult<usize> {
        let medications = self.store.get_all().await?;
        for medication in &medications {
            self.scheduler.update_medication_reminders(medication);
        }
        tracing::info!(count = medications.len(), "Medication reminders resynced");
        Ok(medications.len())
    }
}

/// Spawn a background task that attempts a past-due sweep every `tick`. The
/// scheduler's own guard decides whether a sweep actually runs.
pub fn spawn_past_due_worker(
    service: MedicationService,
    tick: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick);
        loop {
            interval.tick().await;
            match service.run_past_due_sweep().await {
                Ok(PastDueSweep::Completed { scheduled }) => {
                    if !scheduled.is_empty() {
                        tracing::info!(count = scheduled.len(), "Past-due reminders scheduled");
                    }
                }
                Ok(PastDueSweep::Skipped { .. }) => {}
                Err(e) => {
                    tracing::error!(error = %e, "Past-due sweep failed");
                }
            }
        }
    })
}
