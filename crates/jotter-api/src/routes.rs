//! Router assembly.
//!
//! ```text
//! GET    /health
//! GET    /user                         DELETE /user
//! POST   /upload?kind=audio|image
//! GET    /note        POST /note        GET|PATCH|DELETE /note/:id
//! GET    /task        POST /task        GET|PATCH|DELETE /task/:id
//! GET    /task/:id/occurrence           POST /task/:id/occurrence
//! GET|PATCH|DELETE /occurrence/:id
//! GET|POST|PATCH|DELETE /task/:id/schedule
//! GET    /link        POST /link        GET|PATCH|DELETE /link/:id
//! GET    /metric      POST /metric      GET|PATCH|DELETE /metric/:id
//! GET    /metric/:id/data               POST /metric/:id/data
//! GET|PATCH|DELETE /data/:id
//! GET|POST|PATCH|DELETE /metric/:id/schedule
//! GET    /tag         POST /tag         GET|PATCH|DELETE /tag/:id
//! ```

use std::any::Any;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderName, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::handlers::{
    data, health, links, metrics, notes, occurrences, schedules, tags, tasks, upload, user,
};
use crate::{ApiError, AppState};

/// Generates time-ordered UUIDv7 request correlation IDs.
#[derive(Clone, Default)]
struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    let max_upload = state.config.max_upload_bytes;
    let cors = cors_layer(&state);

    Router::new()
        .route("/health", get(health::health_check))
        .route("/user", get(user::get_user).delete(user::delete_user))
        .route(
            "/upload",
            post(upload::upload).layer(DefaultBodyLimit::max(max_upload)),
        )
        // Notes
        .route("/note", get(notes::list_notes).post(notes::create_note))
        .route(
            "/note/:id",
            get(notes::get_note)
                .patch(notes::update_note)
                .delete(notes::delete_note),
        )
        // Tasks and occurrences
        .route("/task", get(tasks::list_tasks).post(tasks::create_task))
        .route(
            "/task/:id",
            get(tasks::get_task)
                .patch(tasks::update_task)
                .delete(tasks::delete_task),
        )
        .route(
            "/task/:id/occurrence",
            get(occurrences::list_occurrences).post(occurrences::create_occurrence),
        )
        .route(
            "/task/:id/schedule",
            get(schedules::get_occurrence_schedule)
                .post(schedules::create_occurrence_schedule)
                .patch(schedules::update_occurrence_schedule)
                .delete(schedules::delete_occurrence_schedule),
        )
        .route(
            "/occurrence/:id",
            get(occurrences::get_occurrence)
                .patch(occurrences::update_occurrence)
                .delete(occurrences::delete_occurrence),
        )
        // Links
        .route("/link", get(links::list_links).post(links::create_link))
        .route(
            "/link/:id",
            get(links::get_link)
                .patch(links::update_link)
                .delete(links::delete_link),
        )
        // Metrics and data
        .route("/metric", get(metrics::list_metrics).post(metrics::create_metric))
        .route(
            "/metric/:id",
            get(metrics::get_metric)
                .patch(metrics::update_metric)
                .delete(metrics::delete_metric),
        )
        .route(
            "/metric/:id/data",
            get(data::list_data).post(data::create_data),
        )
        .route(
            "/metric/:id/schedule",
            get(schedules::get_data_schedule)
                .post(schedules::create_data_schedule)
                .patch(schedules::update_data_schedule)
                .delete(schedules::delete_data_schedule),
        )
        .route(
            "/data/:id",
            get(data::get_data)
                .patch(data::update_data)
                .delete(data::delete_data),
        )
        // Tags
        .route("/tag", get(tags::list_tags).post(tags::create_tag))
        .route(
            "/tag/:id",
            get(tags::get_tag)
                .patch(tags::update_tag)
                .delete(tags::delete_tag),
        )
        .fallback(route_not_found)
        // Middleware
        .layer(axum::middleware::map_response(json_method_not_allowed))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_upload))
        .with_state(state)
}

fn cors_layer(state: &AppState) -> CorsLayer {
    let identity: HeaderName = state.config.identity_header.clone();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(state.config.allowed_origins.clone()))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            identity,
        ])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}

async fn route_not_found() -> ApiError {
    ApiError::NotFound("route not found".into())
}

/// Replace axum's empty 405 with the JSON error body, keeping the `Allow` header.
async fn json_method_not_allowed(response: Response) -> Response {
    if response.status() != StatusCode::METHOD_NOT_ALLOWED {
        return response;
    }
    let allow = response.headers().get(header::ALLOW).cloned();
    let mut json = ApiError::MethodNotAllowed.into_response();
    if let Some(allow) = allow {
        json.headers_mut().insert(header::ALLOW, allow);
    }
    json
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    ApiError::Internal(format!("handler panicked: {detail}")).into_response()
}
