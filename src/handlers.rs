use crate::app_state::AppState;
use crate::auth;
use crate::embedded::serve_static;
use crate::error::{AppError, AppResult};
use crate::models::{CredentialsForm, HealthStatus, ListingEntry, ListingQuery, PostForm, SortOrder};
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use std::time::SystemTime;
use tera::Context;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/submit", post(submit_handler))
        .route("/delete/{id}", get(delete_handler))
        .route("/like/{id}", post(like_handler))
        .route("/clear", get(clear_handler))
        .route("/messages/{id}/comments", post(comment_handler))
        .route("/comments/{id}/delete", get(delete_comment_handler))
        .route("/register", get(register_page).post(register_handler))
        .route("/login", get(login_page).post(login_handler))
        .route("/logout", get(logout_handler))
        .route("/account/delete", post(delete_account_handler))
        .route(
            "/api/messages",
            get(api_messages_handler).layer(CorsLayer::permissive()),
        )
        .route("/health", get(health_check))
        .route("/static/{*path}", get(serve_static))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

fn render(state: &AppState, template: &str, context: &Context) -> AppResult<Html<String>> {
    Ok(Html(state.templates.render(template, context)?))
}

// Base context every page needs: the signed-in username, or "".
async fn page_context(state: &AppState, headers: &HeaderMap) -> AppResult<Context> {
    let user = auth::current_user(state.board.store(), headers).await?;
    let mut context = Context::new();
    context.insert("user", &user.map(|u| u.username).unwrap_or_default());
    context.insert("error", "");
    Ok(context)
}

// GET / : the board, newest first unless `?sort=asc`.
pub async fn index_handler(
    State(state): State<AppState>,
    Query(query): Query<ListingQuery>,
    headers: HeaderMap,
) -> AppResult<Html<String>> {
    let sort = SortOrder::parse_lenient(query.sort.as_deref());
    let messages = state.board.listing(sort).await?;

    let mut context = page_context(&state, &headers).await?;
    context.insert("messages", &messages);
    context.insert("sort", sort.as_str());
    render(&state, "index.html", &context)
}

pub async fn api_messages_handler(
    State(state): State<AppState>,
    Query(query): Query<ListingQuery>,
) -> AppResult<Json<Vec<ListingEntry>>> {
    let sort = SortOrder::parse_lenient(query.sort.as_deref());
    Ok(Json(state.board.listing(sort).await?))
}

pub async fn submit_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<PostForm>,
) -> AppResult<Redirect> {
    let author = auth::current_user(state.board.store(), &headers).await?;
    state
        .board
        .post_message(&form.name, &form.content, author.as_ref())
        .await?;
    Ok(Redirect::to("/"))
}

pub async fn delete_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Redirect> {
    state.board.delete_message(id).await?;
    Ok(Redirect::to("/"))
}

pub async fn like_handler(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Redirect> {
    state.board.like_message(id).await?;
    Ok(Redirect::to("/"))
}

pub async fn clear_handler(State(state): State<AppState>) -> AppResult<Redirect> {
    state.board.clear_messages().await?;
    Ok(Redirect::to("/"))
}

pub async fn comment_handler(
    State(state): State<AppState>,
    Path(message_id): Path<i64>,
    headers: HeaderMap,
    Form(form): Form<PostForm>,
) -> AppResult<Redirect> {
    let author = auth::current_user(state.board.store(), &headers).await?;
    state
        .board
        .add_comment(message_id, &form.name, &form.content, author.as_ref())
        .await?;
    Ok(Redirect::to("/"))
}

pub async fn delete_comment_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Redirect> {
    state.board.delete_comment(id).await?;
    Ok(Redirect::to("/"))
}

pub async fn register_page(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Html<String>> {
    let context = page_context(&state, &headers).await?;
    render(&state, "register.html", &context)
}

pub async fn register_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<CredentialsForm>,
) -> AppResult<Response> {
    match auth::register(state.board.store(), &form.username, &form.password).await {
        Ok(_) => Ok(Redirect::to("/login").into_response()),
        // Show the problem on the form instead of a bare error page.
        Err(e @ (AppError::Validation(_) | AppError::Conflict(_))) => {
            let status = if matches!(e, AppError::Conflict(_)) {
                StatusCode::CONFLICT
            } else {
                StatusCode::BAD_REQUEST
            };
            let mut context = page_context(&state, &headers).await?;
            context.insert("error", &e.to_string());
            Ok((status, render(&state, "register.html", &context)?).into_response())
        }
        Err(e) => Err(e),
    }
}

pub async fn login_page(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Html<String>> {
    let context = page_context(&state, &headers).await?;
    render(&state, "login.html", &context)
}

pub async fn login_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<CredentialsForm>,
) -> AppResult<Response> {
    match auth::login(state.board.store(), &form.username, &form.password).await? {
        Some(token) => Ok((
            [(header::SET_COOKIE, auth::session_cookie(&token))],
            Redirect::to("/"),
        )
            .into_response()),
        None => {
            let mut context = page_context(&state, &headers).await?;
            context.insert("error", "Invalid username or password");
            Ok((StatusCode::UNAUTHORIZED, render(&state, "login.html", &context)?).into_response())
        }
    }
}

pub async fn logout_handler(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    if let Some(token) = auth::session_token(&headers) {
        state.board.store().delete_session(token).await?;
    }
    Ok((
        [(header::SET_COOKIE, auth::expired_session_cookie())],
        Redirect::to("/"),
    )
        .into_response())
}

pub async fn delete_account_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let user = auth::current_user(state.board.store(), &headers)
        .await?
        .ok_or(AppError::Unauthorized)?;
    state.board.delete_user(user.id).await?;
    info!("Deleted account {}", user.username);
    Ok((
        [(header::SET_COOKIE, auth::expired_session_cookie())],
        Redirect::to("/"),
    )
        .into_response())
}

// GET /health : database reachability plus the cache state.
pub async fn health_check(State(state): State<AppState>) -> Result<Json<HealthStatus>, StatusCode> {
    match state.board.store().db().acquire().await {
        Ok(_) => Ok(Json(HealthStatus {
            status: "healthy".to_string(),
            cache: if state.board.cache().is_available() {
                "available".to_string()
            } else {
                "disabled".to_string()
            },
            timestamp: current_timestamp(),
        })),
        Err(e) => {
            tracing::error!("Health check failed: DB acquire error: {}", e);
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Board;
    use crate::cache::{testing::RecordingBackend, CacheLayer};
    use crate::database::init_database;
    use crate::embedded::load_templates;
    use crate::store::Store;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    async fn app() -> (Router, Arc<RecordingBackend>) {
        let backend = Arc::new(RecordingBackend::new());
        let store = Store::new(init_database(":memory:").await.unwrap());
        let cache = Arc::new(CacheLayer::connect(backend.clone(), Duration::from_millis(500)).await);
        let board = Arc::new(Board::new(store, cache, 60));
        let state = AppState::new(board, load_templates().unwrap());
        (router(state), backend)
    }

    fn form(uri: &str, body: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_req(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn api_listing(app: &Router, sort: &str) -> serde_json::Value {
        let response = app
            .clone()
            .oneshot(get_req(&format!("/api/messages?sort={sort}"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        serde_json::from_str(&body_string(response).await).unwrap()
    }

    #[tokio::test]
    async fn post_like_and_list() {
        let (app, _) = app().await;

        let response = app
            .clone()
            .oneshot(form("/submit", "name=Alice&content=hi", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/");

        let page = app.clone().oneshot(get_req("/", None)).await.unwrap();
        assert_eq!(page.status(), StatusCode::OK);
        let html = body_string(page).await;
        assert!(html.contains("Alice"));
        assert!(html.contains("just now"));

        let listing = api_listing(&app, "desc").await;
        assert_eq!(listing[0]["name"], "Alice");
        assert_eq!(listing[0]["likes"], 0);
        let id = listing[0]["id"].as_i64().unwrap();

        let response = app
            .clone()
            .oneshot(form(&format!("/like/{id}"), "", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(api_listing(&app, "desc").await[0]["likes"], 1);
    }

    #[tokio::test]
    async fn ascending_sort_lists_oldest_first() {
        let (app, _) = app().await;
        for body in ["name=a&content=first", "name=b&content=second"] {
            app.clone().oneshot(form("/submit", body, None)).await.unwrap();
        }
        assert_eq!(api_listing(&app, "asc").await[0]["content"], "first");
        assert_eq!(api_listing(&app, "desc").await[0]["content"], "second");
    }

    #[tokio::test]
    async fn listing_survives_cache_outage() {
        let (app, backend) = app().await;
        app.clone()
            .oneshot(form("/submit", "name=Alice&content=hi", None))
            .await
            .unwrap();
        backend.set_failing(true);

        assert_eq!(api_listing(&app, "desc").await[0]["name"], "Alice");

        let health = app.clone().oneshot(get_req("/health", None)).await.unwrap();
        let health: serde_json::Value = serde_json::from_str(&body_string(health).await).unwrap();
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["cache"], "disabled");
    }

    #[tokio::test]
    async fn comments_and_clear() {
        let (app, _) = app().await;
        app.clone()
            .oneshot(form("/submit", "name=Alice&content=hi", None))
            .await
            .unwrap();
        let id = api_listing(&app, "desc").await[0]["id"].as_i64().unwrap();

        let response = app
            .clone()
            .oneshot(form(&format!("/messages/{id}/comments"), "name=Bob&content=hello", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(api_listing(&app, "desc").await[0]["comments"][0]["name"], "Bob");

        let missing = app
            .clone()
            .oneshot(form("/messages/9999/comments", "name=Bob&content=hello", None))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        app.clone().oneshot(get_req("/clear", None)).await.unwrap();
        assert_eq!(api_listing(&app, "desc").await, serde_json::json!([]));
    }

    #[tokio::test]
    async fn register_login_post_logout() {
        let (app, _) = app().await;

        let response = app
            .clone()
            .oneshot(form("/register", "username=alice&password=secret1", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/login");

        let duplicate = app
            .clone()
            .oneshot(form("/register", "username=alice&password=secret1", None))
            .await
            .unwrap();
        assert_eq!(duplicate.status(), StatusCode::CONFLICT);

        let bad = app
            .clone()
            .oneshot(form("/login", "username=alice&password=nope", None))
            .await
            .unwrap();
        assert_eq!(bad.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .clone()
            .oneshot(form("/login", "username=alice&password=secret1", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        let cookie = set_cookie.split(';').next().unwrap().to_string();
        assert!(cookie.starts_with("session="));

        let page = app.clone().oneshot(get_req("/", Some(&cookie))).await.unwrap();
        assert!(body_string(page).await.contains("Signed in as <strong>alice</strong>"));

        let response = app.clone().oneshot(get_req("/logout", Some(&cookie))).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let page = app.clone().oneshot(get_req("/", Some(&cookie))).await.unwrap();
        assert!(!body_string(page).await.contains("Signed in as"));
    }

    #[tokio::test]
    async fn deleting_account_requires_login() {
        let (app, _) = app().await;
        let response = app
            .clone()
            .oneshot(form("/account/delete", "", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/login");
    }

    #[tokio::test]
    async fn overlong_name_is_rejected() {
        let (app, _) = app().await;
        let body = format!("name={}&content=hi", "x".repeat(51));
        let response = app.clone().oneshot(form("/submit", &body, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
