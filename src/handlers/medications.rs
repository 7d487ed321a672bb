use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use crate::dto::{DataResponse, NewMedication, RecordDoseRequest, TodaysProgress};
use crate::error::AppResult;
use crate::models::medication::{DoseHistory, Medication};
use crate::services::medications::SavedMedication;
use crate::services::reminders::{PastDueSweep, ReminderRecord};
use crate::AppState;

pub async fn list_medications(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<Medication>>>> {
    let medications = state.medications.list().await?;
    Ok(Json(DataResponse::new(medications)))
}

pub async fn create_medication(
    State(state): State<AppState>,
    Json(body): Json<NewMedication>,
) -> AppResult<(StatusCode, Json<DataResponse<SavedMedication>>)> {
    let saved = state.medications.add_medication(body).await?;
    Ok((StatusCode::CREATED, Json(DataResponse::new(saved))))
}

pub async fn update_medication(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<NewMedication>,
) -> AppResult<Json<DataResponse<SavedMedication>>> {
    let saved = state.medications.update_medication(&id, body).await?;
    Ok(Json(DataResponse::new(saved)))
}

/// Wipes every medication, all dose history and every pending reminder.
pub async fn clear_medications(State(state): State<AppState>) -> AppResult<Json<Value>> {
    state.medications.clear_all().await?;
    Ok(Json(json!({ "data": { "cleared": true } })))
}

/// `taken` defaults to true; `false` records a missed dose.
pub async fn record_dose(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<RecordDoseRequest>>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let taken = body.and_then(|Json(b)| b.taken).unwrap_or(true);
    let data = if taken {
        serde_json::to_value(state.medications.take_dose(&id).await?)
    } else {
        serde_json::to_value(state.medications.record_missed_dose(&id).await?)
    }
    .map_err(anyhow::Error::from)?;
    Ok((StatusCode::CREATED, Json(json!({ "data": data }))))
}

pub async fn refill_medication(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<DataResponse<Medication>>> {
    let medication = state.medications.refill(&id).await?;
    Ok(Json(DataResponse::new(medication)))
}

pub async fn todays_medications(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<Medication>>>> {
    let medications = state.medications.todays_medications().await?;
    Ok(Json(DataResponse::new(medications)))
}

pub async fn todays_progress(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<TodaysProgress>>> {
    let progress = state.medications.todays_progress().await?;
    Ok(Json(DataResponse::new(progress)))
}

pub async fn todays_doses(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<DoseHistory>>>> {
    let doses = state.medications.todays_doses().await?;
    Ok(Json(DataResponse::new(doses)))
}

pub async fn list_reminders(State(state): State<AppState>) -> Json<DataResponse<Vec<ReminderRecord>>> {
    Json(DataResponse::new(state.medications.scheduler().reminders()))
}

/// Foreground hook: attempt a past-due sweep now. Still subject to the
/// once-per-interval guard.
pub async fn sweep_past_due(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<PastDueSweep>>> {
    let sweep = state.medications.run_past_due_sweep().await?;
    Ok(Json(DataResponse::new(sweep)))
}

pub async fn resync_reminders(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let count = state.medications.resync_reminders().await?;
    Ok(Json(json!({ "data": { "medications": count } })))
}
