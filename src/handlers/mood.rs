use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use validator::Validate;

use crate::dto::{
    CreateMoodRequest, DataResponse, DeleteResponse, MoodContextResponse, MoodStatsQuery,
    StreakResponse, UpdateMoodRequest, UserQuery,
};
use crate::error::{AppError, AppResult};
use crate::models::mood::{mint_entry_id, resolve_mood_type, MoodEntry, MoodType};
use crate::services::analytics::{DailyMoodSummary, MoodStats, StatsPeriod};
use crate::AppState;

/// Last 30 entries, newest-created first.
const RECENT_ENTRY_LIMIT: i64 = 30;

fn parse_period(raw: Option<&str>) -> AppResult<StatsPeriod> {
    match raw {
        None => Ok(StatsPeriod::Week),
        Some(p) => p.parse().map_err(AppError::Validation),
    }
}

fn stats_user(query: &MoodStatsQuery) -> AppResult<String> {
    UserQuery {
        user_id: query.user_id.clone(),
    }
    .require_user_id()
    .map(str::to_string)
}

/// Only `userId` and `mood` are required. `label` is a fallback used when
/// `mood` matches no catalog id, emoji or name; `color` is accepted for client
/// compatibility but the stored entry always carries the catalog color.
pub async fn create_mood(
    State(state): State<AppState>,
    Json(body): Json<CreateMoodRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<MoodEntry>>)> {
    body.validate()?;

    let catalog = state.stores.mood.get_mood_types().await?;
    let mood = resolve_mood_type(&catalog, &body.mood, body.label.as_deref())
        .cloned()
        .ok_or_else(|| AppError::Validation(format!("Unknown mood '{}'", body.mood.trim())))?;

    let now = state.clock.now();
    let timestamp = now.timestamp_millis();
    let user_id = body.user_id.trim().to_string();
    let entry = MoodEntry {
        id: mint_entry_id(&user_id, timestamp),
        user_id,
        intensity: body.intensity.unwrap_or(mood.value),
        mood,
        note: body.note.filter(|n| !n.trim().is_empty()),
        timestamp,
        date: now.date_naive(),
    };

    let saved = state.stores.mood.save_mood_entry(&entry).await?;
    tracing::debug!(entry_id = %saved.id, mood = %saved.mood.id, "Mood entry saved");

    Ok((StatusCode::CREATED, Json(DataResponse::new(saved))))
}

pub async fn list_mood(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<DataResponse<Vec<MoodEntry>>>> {
    let user_id = query.require_user_id()?;
    let entries = state
        .stores
        .mood
        .get_recent_mood_entries(user_id, RECENT_ENTRY_LIMIT)
        .await?;
    Ok(Json(DataResponse::new(entries)))
}

/// Explicit edit: insert or replace by id.
pub async fn update_mood(
    State(state): State<AppState>,
    Path(entry_id): Path<String>,
    Json(body): Json<UpdateMoodRequest>,
) -> AppResult<Json<DataResponse<MoodEntry>>> {
    body.validate()?;

    let catalog = state.stores.mood.get_mood_types().await?;
    let mood = catalog
        .into_iter()
        .find(|m| m.id == body.mood_type_id)
        .ok_or_else(|| AppError::Validation(format!("Unknown mood type '{}'", body.mood_type_id)))?;

    let timestamp = body
        .timestamp
        .unwrap_or_else(|| state.clock.now().timestamp_millis());
    let date = match body.date {
        Some(date) => date,
        None => {
            let instant = Utc
                .timestamp_millis_opt(timestamp)
                .single()
                .ok_or_else(|| AppError::Validation("timestamp is out of range".into()))?;
            state.clock.local_date(instant)
        }
    };

    let entry = MoodEntry {
        id: entry_id,
        user_id: body.user_id,
        mood,
        intensity: body.intensity,
        note: body.note,
        timestamp,
        date,
    };
    let saved = state.stores.mood.upsert_mood_entry(&entry).await?;
    Ok(Json(DataResponse::new(saved)))
}

pub async fn delete_mood(
    State(state): State<AppState>,
    Path(entry_id): Path<String>,
) -> AppResult<Json<DeleteResponse>> {
    state.stores.mood.delete_mood_entry(&entry_id).await?;
    Ok(Json(DeleteResponse {
        deleted: true,
        id: entry_id,
    }))
}

pub async fn clear_mood(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<Value>> {
    let user_id = query.require_user_id()?;
    let cleared = state.stores.mood.clear_mood_entries(user_id).await?;
    tracing::info!(user_id = %user_id, cleared, "Mood entries cleared");
    Ok(Json(json!({ "data": { "cleared": cleared } })))
}

pub async fn list_mood_types(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<MoodType>>>> {
    let types = state.stores.mood.get_mood_types().await?;
    Ok(Json(DataResponse::new(types)))
}

pub async fn mood_stats(
    State(state): State<AppState>,
    Query(query): Query<MoodStatsQuery>,
) -> AppResult<Json<DataResponse<MoodStats>>> {
    let user_id = stats_user(&query)?;
    let period = parse_period(query.period.as_deref())?;
    let stats = state.analytics.stats(&user_id, period).await;
    Ok(Json(DataResponse::new(stats)))
}

pub async fn mood_daily(
    State(state): State<AppState>,
    Query(query): Query<MoodStatsQuery>,
) -> AppResult<Json<DataResponse<Vec<DailyMoodSummary>>>> {
    let user_id = stats_user(&query)?;
    let period = parse_period(query.period.as_deref())?;
    let days = state.analytics.daily_averages(&user_id, period).await;
    Ok(Json(DataResponse::new(days)))
}

pub async fn mood_streak(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<DataResponse<StreakResponse>>> {
    let user_id = query.require_user_id()?;
    let streak = state.analytics.get_current_streak(user_id).await;
    Ok(Json(DataResponse::new(StreakResponse {
        user_id: user_id.to_string(),
        streak,
    })))
}

pub async fn mood_insights(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<DataResponse<Vec<String>>>> {
    let user_id = query.require_user_id()?;
    let insights = state.analytics.weekly_insights(user_id).await;
    Ok(Json(DataResponse::new(insights)))
}

pub async fn mood_context(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<DataResponse<MoodContextResponse>>> {
    let user_id = query.require_user_id()?;
    let context = state.analytics.detailed_context(user_id).await;
    Ok(Json(DataResponse::new(MoodContextResponse {
        user_id: user_id.to_string(),
        context,
    })))
}
