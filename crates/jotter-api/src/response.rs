//! Response envelopes shared by the entity handlers.

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

use jotter_core::Page;

/// `{"status":"ok","data":[…],"pagination":{…}}` for a list page.
pub fn list<T: Serialize>(items: Vec<T>, total: i64, page: Page) -> Json<Value> {
    let has_more = page.offset + (items.len() as i64) < total;
    Json(json!({
        "status": "ok",
        "data": items,
        "pagination": {
            "total": total,
            "limit": page.limit,
            "offset": page.offset,
            "has_more": has_more,
        },
    }))
}

/// `{"status":"ok","data":{…}}` for a single resource.
pub fn item<T: Serialize>(item: T) -> Json<Value> {
    Json(json!({ "status": "ok", "data": item }))
}

/// `201 {"status":"created","id":…}`.
pub fn created(id: i64) -> (StatusCode, Json<Value>) {
    (
        StatusCode::CREATED,
        Json(json!({ "status": "created", "id": id })),
    )
}
