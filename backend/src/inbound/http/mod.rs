//! HTTP inbound adapter exposing the schedule REST endpoints.

pub mod auth;
pub mod error;
pub mod health;
pub mod schedules;
pub mod state;
#[cfg(test)]
pub mod test_utils;

use actix_web::{HttpResponse, web};
use serde_json::json;

pub use error::ApiResult;

use crate::domain::Error;

fn invalid_input(detail: impl std::fmt::Display) -> actix_web::Error {
    Error::invalid_request(format!("Invalid input: {detail}")).into()
}

/// Register every route plus extractor error handling.
///
/// Pair with [`route_not_found`] as the application's default service.
///
/// # Examples
/// ```
/// use actix_web::{App, web};
/// use webhook_scheduler::inbound::http::{configure, route_not_found};
///
/// let _app = App::new()
///     .configure(configure)
///     .default_service(web::to(route_not_found));
/// ```
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _| invalid_input(err)))
        .app_data(web::QueryConfig::default().error_handler(|err, _| invalid_input(err)))
        .app_data(web::PathConfig::default().error_handler(|err, _| invalid_input(err)))
        .service(health::info)
        .service(health::live)
        .service(health::ready)
        .service(schedules::stats)
        .service(schedules::list_schedules)
        .service(schedules::purge_schedules)
        .service(schedules::create_schedule)
        .service(schedules::get_schedule)
        .service(schedules::patch_schedule)
        .service(schedules::delete_schedule);
}

/// Fallback for unmatched routes.
pub async fn route_not_found() -> HttpResponse {
    HttpResponse::NotFound().json(json!({"status": 404, "error": "Route not found."}))
}
