pub mod health;
pub mod medications;
pub mod mood;
pub mod users;
pub mod ws;

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        Router,
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    use crate::clock::{at, FixedClock};
    use crate::config::{Config, StorageBackend};
    use crate::db::Database;
    use crate::store::{MemoryStore, PgStore, Stores};
    use crate::{router, AppState};

    fn memory_app() -> Router {
        let clock = Arc::new(FixedClock::new(at("2026-02-10", "08:00")));
        let stores = Stores::memory(MemoryStore::new(clock.clone()));
        let config = Arc::new(Config::for_tests(StorageBackend::Memory));
        router(AppState::new(config, Database::unavailable(), stores, clock))
    }

    fn unavailable_app() -> Router {
        let clock = Arc::new(FixedClock::new(at("2026-02-10", "08:00")));
        let db = Database::unavailable();
        let stores = Stores::postgres(PgStore::new(db.clone()));
        let config = Arc::new(Config::for_tests(StorageBackend::Postgres));
        router(AppState::new(config, db, stores, clock))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let app = memory_app();
        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "mindful-api");

        let (status, body) = send(&app, "GET", "/readyz", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["checks"]["database"], "in_memory");
    }

    #[tokio::test]
    async fn test_create_and_list_mood() {
        let app = memory_app();
        let (status, body) = send(
            &app,
            "POST",
            "/mood",
            Some(json!({"userId": "u1", "mood": "😊", "label": "Happy", "color": "#4CAF50"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["mood"]["id"], "happy");
        assert_eq!(body["data"]["intensity"], 5);
        assert_eq!(body["data"]["date"], "2026-02-10");

        let (status, body) = send(
            &app,
            "POST",
            "/mood",
            Some(json!({"userId": "u1", "mood": "calm", "intensity": 2, "note": "Slow morning"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["intensity"], 2);

        let (status, body) = send(&app, "GET", "/mood?userId=u1", None).await;
        assert_eq!(status, StatusCode::OK);
        let entries = body["data"].as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["mood"]["id"], "calm");
    }

    #[tokio::test]
    async fn test_create_mood_requires_fields() {
        let app = memory_app();
        let (status, body) = send(&app, "POST", "/mood", Some(json!({"mood": "happy"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], 400);

        let (status, _) = send(&app, "POST", "/mood", Some(json!({"userId": "u1", "mood": "meh"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, "GET", "/mood", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_update_and_delete_mood() {
        let app = memory_app();
        let (_, body) = send(&app, "POST", "/mood", Some(json!({"userId": "u1", "mood": "sad"}))).await;
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            "PUT",
            &format!("/mood/{}", id),
            Some(json!({"userId": "u1", "moodTypeId": "happy", "intensity": 4})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["mood"]["id"], "happy");

        let (status, body) = send(&app, "DELETE", &format!("/mood/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted"], true);

        let (status, _) = send(&app, "DELETE", &format!("/mood/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_mood_label_and_color_optional() {
        let app = memory_app();
        let (status, body) = send(
            &app,
            "POST",
            "/mood",
            Some(json!({"userId": "u1", "mood": "happy", "color": "#000000"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["mood"]["color"], "#4CAF50");

        // An unknown mood resolves through the label.
        let (status, body) = send(
            &app,
            "POST",
            "/mood",
            Some(json!({"userId": "u1", "mood": "🙃", "label": "Calm"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["mood"]["id"], "calm");
    }

    #[tokio::test]
    async fn test_update_cannot_take_over_another_users_entry() {
        let app = memory_app();
        let (_, body) = send(&app, "POST", "/mood", Some(json!({"userId": "alice", "mood": "happy"}))).await;
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            "PUT",
            &format!("/mood/{}", id),
            Some(json!({"userId": "mallory", "moodTypeId": "sad", "intensity": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], 404);

        let (_, body) = send(&app, "GET", "/mood?userId=alice", None).await;
        let entries = body["data"].as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["mood"]["id"], "happy");

        let (_, body) = send(&app, "GET", "/mood?userId=mallory", None).await;
        assert!(body["data"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mood_analytics_routes() {
        let app = memory_app();
        send(&app, "POST", "/mood", Some(json!({"userId": "u1", "mood": "happy"}))).await;

        let (status, body) = send(&app, "GET", "/mood/stats?userId=u1&period=month", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["totalEntries"], 1);
        assert_eq!(body["data"]["period"], "month");
        assert_eq!(body["data"]["moodDistribution"]["sad"], 0);

        let (status, _) = send(&app, "GET", "/mood/stats?userId=u1&period=year", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, body) = send(&app, "GET", "/mood/streak?userId=u1", None).await;
        assert_eq!(body["data"]["streak"], 1);

        let (_, body) = send(&app, "GET", "/mood/context?userId=u1", None).await;
        assert!(body["data"]["context"].as_str().unwrap().contains("Today's mood: Happy"));

        let (_, body) = send(&app, "GET", "/mood/daily?userId=u1", None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 7);

        let (_, body) = send(&app, "GET", "/mood-types", None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_create_user() {
        let app = memory_app();
        let user = json!({
            "firstname": "Ada",
            "lastname": "Lovelace",
            "username": "ada",
            "email": "ada@example.com",
            "clerkId": "user_123",
            "date_of_birth": "1990-12-10",
            "gender": "female",
        });
        let (status, body) = send(&app, "POST", "/user", Some(user)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["clerkId"], "user_123");

        let (status, _) = send(&app, "GET", "/user/user_123", None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            &app,
            "POST",
            "/user",
            Some(json!({"firstname": "Ada", "email": "ada@example.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_medication_dose_flow() {
        let app = memory_app();
        let (status, body) = send(
            &app,
            "POST",
            "/medications",
            Some(json!({
                "name": "Vitamin D",
                "dosage": "1 tablet",
                "frequency": "Once daily",
                "times": ["09:00"],
                "duration": "Ongoing",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["data"]["medication"]["id"].as_str().unwrap().to_string();

        let (_, body) = send(&app, "GET", "/doses/today", None).await;
        assert!(body["data"].as_array().unwrap().is_empty());

        let (status, body) = send(&app, "POST", &format!("/medications/{}/doses", id), None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["dose"]["taken"], true);

        let (_, body) = send(&app, "GET", "/medications/progress", None).await;
        assert_eq!(body["data"]["completed"], 1);
        assert_eq!(body["data"]["total"], 1);
        assert_eq!(body["data"]["ratio"], 1.0);

        let (_, body) = send(&app, "GET", "/reminders", None).await;
        assert_eq!(body["data"][0]["id"], format!("medication:{}:09:00", id));

        let (status, _) = send(&app, "POST", "/medications/missing/refill", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_missed_dose_recorded() {
        let app = memory_app();
        let (_, body) = send(
            &app,
            "POST",
            "/medications",
            Some(json!({"name": "Iron", "dosage": "1", "frequency": "Daily", "duration": "7 days", "times": ["20:00"]})),
        )
        .await;
        let id = body["data"]["medication"]["id"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            "POST",
            &format!("/medications/{}/doses", id),
            Some(json!({"taken": false})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["taken"], false);
    }

    #[tokio::test]
    async fn test_unavailable_database_reads_empty_writes_fail() {
        let app = unavailable_app();
        let (status, body) = send(&app, "GET", "/mood?userId=u1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"].as_array().unwrap().is_empty());

        let (status, body) = send(&app, "POST", "/mood", Some(json!({"userId": "u1", "mood": "happy"}))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"]["code"], 503);

        let (status, _) = send(&app, "GET", "/mood/stats?userId=u1", None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, "GET", "/readyz", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["checks"]["database"], "unavailable");
    }
}
