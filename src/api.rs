use crate::featured::featured_videos;
use crate::session::SearchOutcome;
use crate::types::*;
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Header carrying the parent PIN on parent-only routes.
pub const PARENT_PIN_HEADER: &str = "x-parent-pin";

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .route("/search", post(search_handler))
        .route("/results", get(list_results).delete(clear_results))
        .route("/history", get(list_history))
        .route("/history/:term", delete(remove_history_entry))
        .route("/favorites", get(list_favorites))
        .route("/favorites/toggle", post(toggle_favorite))
        .route("/favorites/remove", post(remove_favorite))
        .route("/videos/featured", get(list_featured_videos))
        .route("/parent/unlock", post(unlock_parent))
        .route("/parent/history", delete(parent_clear_history))
        .route(
            "/parent/blocked-words",
            get(parent_list_blocked_words).post(parent_add_blocked_word),
        )
        .route("/parent/blocked-words/:word", delete(parent_remove_blocked_word))
        .with_state(state)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "tuebo",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn search_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SearchRequest>,
) -> Json<SearchOutcome> {
    Json(state.session.run_with(request.provider, &request.query).await)
}

async fn list_results(State(state): State<Arc<AppState>>) -> Json<Vec<ResultRecord>> {
    Json(state.repository.results().await)
}

async fn clear_results(State(state): State<Arc<AppState>>) -> StatusCode {
    state.repository.clear_results().await;
    StatusCode::NO_CONTENT
}

async fn list_history(State(state): State<Arc<AppState>>) -> Json<Vec<HistoryEntry>> {
    Json(state.repository.history().await)
}

async fn remove_history_entry(
    State(state): State<Arc<AppState>>,
    Path(term): Path<String>,
) -> Json<Vec<HistoryEntry>> {
    Json(state.repository.remove_history(&term).await)
}

async fn list_favorites(State(state): State<Arc<AppState>>) -> Json<Vec<ResultRecord>> {
    Json(state.repository.favorites().await)
}

async fn toggle_favorite(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ToggleFavoriteRequest>,
) -> Result<Json<ToggleFavoriteResponse>, ApiError> {
    let (toggle, favorites) = match (request.record, request.key) {
        (Some(record), _) => state.repository.toggle_favorite(record).await,
        (None, Some(key)) => state.repository.toggle_favorite_key(&key).await,
        (None, None) => {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "Missing required parameter: record or key",
            ))
        }
    };
    info!("Favorite toggle: {:?}", toggle);
    Ok(Json(ToggleFavoriteResponse { toggle, favorites }))
}

async fn remove_favorite(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RemoveFavoriteRequest>,
) -> Json<Vec<ResultRecord>> {
    Json(state.repository.remove_favorite(&request.key).await)
}

async fn list_featured_videos() -> Json<Vec<ResultRecord>> {
    Json(featured_videos())
}

async fn unlock_parent(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PinRequest>,
) -> Result<Json<UnlockResponse>, ApiError> {
    if state.parent_gate.verify(&request.pin) {
        Ok(Json(UnlockResponse { unlocked: true }))
    } else {
        Err(api_error(StatusCode::UNAUTHORIZED, "Incorrect PIN"))
    }
}

fn require_parent(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let pin = headers
        .get(PARENT_PIN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if state.parent_gate.verify(pin) {
        Ok(())
    } else {
        warn!("Parent route refused");
        Err(api_error(StatusCode::UNAUTHORIZED, "Parent PIN required"))
    }
}

async fn parent_clear_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    require_parent(&state, &headers)?;
    state.repository.clear_history().await;
    Ok(StatusCode::NO_CONTENT)
}

async fn parent_list_blocked_words(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<String>>, ApiError> {
    require_parent(&state, &headers)?;
    Ok(Json(state.repository.blocked_words().await))
}

async fn parent_add_blocked_word(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<BlockedWordRequest>,
) -> Result<Json<Vec<String>>, ApiError> {
    require_parent(&state, &headers)?;
    if request.word.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Blocked word must not be empty"));
    }
    state.repository.add_blocked_word(&request.word).await;
    Ok(Json(state.repository.blocked_words().await))
}

async fn parent_remove_blocked_word(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(word): Path<String>,
) -> Result<Json<Vec<String>>, ApiError> {
    require_parent(&state, &headers)?;
    state.repository.remove_blocked_word(&word).await;
    Ok(Json(state.repository.blocked_words().await))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parental::ParentGate;
    use crate::repository::{Repository, RepositoryLimits};
    use crate::search::{Gateway, SearchError, SearchProvider};
    use crate::storage::JsonStore;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use reqwest::Client;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    #[derive(Default)]
    struct EchoProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SearchProvider for EchoProvider {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Summary
        }

        fn name(&self) -> &'static str {
            "echo"
        }

        async fn fetch(&self, _client: &Client, query: &str) -> Result<Vec<ResultRecord>, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![ResultRecord {
                key: query.to_string(),
                title: query.to_string(),
                summary: format!("All about {}", query),
                image_url: None,
                kind: ResultKind::Summary,
            }])
        }
    }

    async fn test_app() -> (Router, Arc<AppState>, Arc<EchoProvider>) {
        let provider = Arc::new(EchoProvider::default());
        let repository = Arc::new(
            Repository::open(JsonStore::memory(), RepositoryLimits::default()).await,
        );
        let gateway = Arc::new(
            Gateway::new(Client::new(), ProviderKind::Summary).with_provider(provider.clone()),
        );
        let state = Arc::new(AppState::new(repository, gateway, ParentGate::new("1234")));
        (router(state.clone()), state, provider)
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn parent_request(method: &str, uri: &str, pin: &str, body: Option<serde_json::Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(PARENT_PIN_HEADER, pin);
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _, _) = test_app().await;
        let (status, body) = send(&app, Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_search_flow() {
        let (app, state, _) = test_app().await;
        let (status, body) = send(
            &app,
            json_request("POST", "/search", serde_json::json!({ "query": "Volcano" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "completed");
        assert_eq!(body["results"][0]["summary"], "All about Volcano");

        let (_, history) = send(&app, Request::get("/history").body(Body::empty()).unwrap()).await;
        assert_eq!(history[0]["term"], "Volcano");
        let (_, results) = send(&app, Request::get("/results").body(Body::empty()).unwrap()).await;
        assert_eq!(results.as_array().unwrap().len(), 1);

        let (status, _) = send(&app, Request::delete("/results").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(state.repository.results().await.is_empty());
    }

    #[tokio::test]
    async fn test_blank_search_is_rejected() {
        let (app, _, provider) = test_app().await;
        let (_, body) = send(
            &app,
            json_request("POST", "/search", serde_json::json!({ "query": "  " })),
        )
        .await;
        assert_eq!(body["outcome"], "rejected");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_blocked_search() {
        let (app, state, provider) = test_app().await;
        let (status, _) = send(
            &app,
            parent_request(
                "POST",
                "/parent/blocked-words",
                "1234",
                Some(serde_json::json!({ "word": "XYZ" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(
            &app,
            json_request("POST", "/search", serde_json::json!({ "query": "xyz" })),
        )
        .await;
        assert_eq!(body["outcome"], "blocked");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert!(state.repository.history().await.is_empty());

        let (_, words) = send(
            &app,
            parent_request("DELETE", "/parent/blocked-words/xyz", "1234", None),
        )
        .await;
        assert_eq!(words, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_favorite_toggle_and_remove() {
        let (app, state, _) = test_app().await;
        send(
            &app,
            json_request("POST", "/search", serde_json::json!({ "query": "Owls" })),
        )
        .await;

        let (status, body) = send(
            &app,
            json_request("POST", "/favorites/toggle", serde_json::json!({ "key": "Owls" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["toggle"], "added");
        assert_eq!(body["favorites"][0]["key"], "Owls");

        let (_, favorites) = send(
            &app,
            json_request("POST", "/favorites/remove", serde_json::json!({ "key": "Owls" })),
        )
        .await;
        assert_eq!(favorites, serde_json::json!([]));
        assert_eq!(state.repository.results().await.len(), 1);

        let (status, _) = send(
            &app,
            json_request("POST", "/favorites/toggle", serde_json::json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_favorite_toggle_with_record() {
        let (app, _, _) = test_app().await;
        let record = serde_json::json!({
            "title": "Bees", "snippet": "Buzz", "link": "https://example.org/bees"
        });
        let (_, body) = send(
            &app,
            json_request("POST", "/favorites/toggle", serde_json::json!({ "record": record })),
        )
        .await;
        assert_eq!(body["toggle"], "added");
        let (_, favorites) = send(&app, Request::get("/favorites").body(Body::empty()).unwrap()).await;
        assert_eq!(favorites[0]["key"], "https://example.org/bees");
        assert_eq!(favorites[0]["summary"], "Buzz");
    }

    #[tokio::test]
    async fn test_parent_routes_require_pin() {
        let (app, state, _) = test_app().await;
        state.repository.record_search("robots").await;

        let (status, body) = send(
            &app,
            json_request("POST", "/parent/unlock", serde_json::json!({ "pin": "0000" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Incorrect PIN");

        let (status, body) = send(
            &app,
            json_request("POST", "/parent/unlock", serde_json::json!({ "pin": "1234" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["unlocked"], true);

        let (status, _) = send(&app, parent_request("DELETE", "/parent/history", "9999", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(state.repository.history().await.len(), 1);

        let (status, _) = send(&app, parent_request("DELETE", "/parent/history", "1234", None)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(state.repository.history().await.is_empty());
    }

    #[tokio::test]
    async fn test_remove_history_entry() {
        let (app, state, _) = test_app().await;
        state.repository.record_search("space rocks").await;
        state.repository.record_search("moon").await;
        let (_, history) = send(
            &app,
            Request::delete("/history/space%20rocks").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(history.as_array().unwrap().len(), 1);
        assert_eq!(history[0]["term"], "moon");
    }

    #[tokio::test]
    async fn test_featured_videos() {
        let (app, _, _) = test_app().await;
        let (_, videos) = send(&app, Request::get("/videos/featured").body(Body::empty()).unwrap()).await;
        assert_eq!(videos.as_array().unwrap().len(), 3);
    }
}
