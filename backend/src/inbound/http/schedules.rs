//! Schedule API handlers.
//!
//! ```text
//! POST   /schedule?type=reminders {"webhook":"https://…","ttl":30,"data":{…}}
//! GET    /schedule/{key}
//! PATCH  /schedule/{key} {"ttl":60}
//! DELETE /schedule/{key}
//! GET    /schedules?type=reminders
//! DELETE /schedules
//! GET    /stats
//! ```
//!
//! `{key}` is the reference returned by create, or a bare id for schedules of
//! the default type. Successful responses are wrapped as
//! `{"status": 200, "data": …}`.

use actix_web::{HttpResponse, delete, get, patch, post, web};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::ApiResult;
use super::auth::Authorized;
use super::state::HttpState;
use crate::domain::{NewSchedule, SchedulePatch, ScheduleType, ScheduleView};

/// `?type=` query parameter.
#[derive(Debug, Default, Deserialize)]
pub struct TypeQuery {
    #[serde(rename = "type")]
    schedule_type: Option<String>,
}

impl TypeQuery {
    fn filter(self) -> ApiResult<Option<ScheduleType>> {
        match self.schedule_type.filter(|raw| !raw.is_empty()) {
            Some(raw) => Ok(Some(ScheduleType::new(raw)?)),
            None => Ok(None),
        }
    }
}

/// Body of `POST /schedule`.
#[derive(Debug, Deserialize)]
pub struct CreateScheduleBody {
    #[serde(default)]
    webhook: String,
    #[serde(default)]
    ttl: i64,
    data: Option<Value>,
}

/// Body of `PATCH /schedule/{key}`. Every field is optional.
#[derive(Debug, Default, Deserialize)]
pub struct PatchScheduleBody {
    webhook: Option<String>,
    ttl: Option<i64>,
    data: Option<Value>,
}

impl From<PatchScheduleBody> for SchedulePatch {
    fn from(body: PatchScheduleBody) -> Self {
        Self {
            webhook: body.webhook,
            ttl: body.ttl,
            data: body.data,
        }
    }
}

/// Metadata half of a rendered schedule.
#[derive(Debug, Serialize)]
pub struct ScheduleInfo {
    key: String,
    #[serde(rename = "type")]
    schedule_type: String,
    id: String,
    ttl: u64,
    retry: u32,
    webhook: String,
    expires: Option<DateTime<Utc>>,
}

/// Rendered schedule: `{"info": {…}, "data": <payload>}`.
#[derive(Debug, Serialize)]
pub struct ScheduleBody {
    info: ScheduleInfo,
    data: Value,
}

impl From<ScheduleView> for ScheduleBody {
    fn from(view: ScheduleView) -> Self {
        Self {
            info: ScheduleInfo {
                key: view.reference,
                schedule_type: view.identity.schedule_type().to_string(),
                id: view.identity.id().to_string(),
                ttl: view.record.ttl,
                retry: view.record.retry,
                webhook: view.record.webhook,
                expires: view.expires,
            },
            data: view.record.data,
        }
    }
}

fn ok<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(json!({"status": 200, "data": data}))
}

/// Create a schedule and return its reference key.
#[post("/schedule")]
pub async fn create_schedule(
    _auth: Authorized,
    state: web::Data<HttpState>,
    query: web::Query<TypeQuery>,
    body: web::Json<CreateScheduleBody>,
) -> ApiResult<HttpResponse> {
    let schedule_type = query.into_inner().filter()?.unwrap_or_default();
    let body = body.into_inner();
    let request = NewSchedule::new(schedule_type, body.webhook, body.ttl, body.data)?;
    let reference = state.schedules.create(request).await?;
    Ok(ok(reference))
}

/// Fetch one schedule.
#[get("/schedule/{key}")]
pub async fn get_schedule(
    _auth: Authorized,
    state: web::Data<HttpState>,
    key: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let view = state.schedules.get(&key).await?;
    Ok(ok(ScheduleBody::from(view)))
}

/// Update fields of one schedule and restart its timer.
#[patch("/schedule/{key}")]
pub async fn patch_schedule(
    _auth: Authorized,
    state: web::Data<HttpState>,
    key: web::Path<String>,
    body: web::Json<PatchScheduleBody>,
) -> ApiResult<HttpResponse> {
    let view = state
        .schedules
        .patch(&key, body.into_inner().into())
        .await?;
    Ok(ok(ScheduleBody::from(view)))
}

/// Remove one schedule.
#[delete("/schedule/{key}")]
pub async fn delete_schedule(
    _auth: Authorized,
    state: web::Data<HttpState>,
    key: web::Path<String>,
) -> ApiResult<HttpResponse> {
    state.schedules.delete(&key).await?;
    Ok(ok("Schedule deleted successfully."))
}

/// List schedules, optionally of one type.
#[get("/schedules")]
pub async fn list_schedules(
    _auth: Authorized,
    state: web::Data<HttpState>,
    query: web::Query<TypeQuery>,
) -> ApiResult<HttpResponse> {
    let views = state.schedules.list(query.into_inner().filter()?).await?;
    Ok(ok(views
        .into_iter()
        .map(ScheduleBody::from)
        .collect::<Vec<_>>()))
}

/// Remove every schedule.
#[delete("/schedules")]
pub async fn purge_schedules(
    _auth: Authorized,
    state: web::Data<HttpState>,
) -> ApiResult<HttpResponse> {
    let summary = state.schedules.purge().await?;
    Ok(ok(summary))
}

/// Store counts and uptime.
#[get("/stats")]
pub async fn stats(_auth: Authorized, state: web::Data<HttpState>) -> ApiResult<HttpResponse> {
    Ok(ok(state.schedules.stats().await?))
}

#[cfg(test)]
#[path = "schedules_tests.rs"]
mod tests;
