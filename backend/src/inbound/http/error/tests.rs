//! Tests for HTTP error mapping.

use actix_web::ResponseError;
use actix_web::body::to_bytes;
use actix_web::http::StatusCode;
use rstest::rstest;
use serde_json::{Value, json};

use super::*;
use crate::domain::Error;

async fn body_of(error: &Error) -> Value {
    let response = ResponseError::error_response(error);
    let bytes = to_bytes(response.into_body())
        .await
        .expect("reading response body succeeds");
    serde_json::from_slice(&bytes).expect("error JSON deserialisation succeeds")
}

#[rstest]
#[case(Error::invalid_request("bad"), StatusCode::BAD_REQUEST)]
#[case(Error::unauthorized("no auth"), StatusCode::UNAUTHORIZED)]
#[case(Error::not_found("missing"), StatusCode::NOT_FOUND)]
#[case(Error::service_unavailable("down"), StatusCode::SERVICE_UNAVAILABLE)]
#[case(Error::internal("boom"), StatusCode::INTERNAL_SERVER_ERROR)]
fn status_code_matches_error_code(#[case] error: Error, #[case] status: StatusCode) {
    assert_eq!(ResponseError::status_code(&error), status);
}

#[rstest]
#[actix_web::test]
async fn client_errors_keep_their_message() {
    let body = body_of(&Error::not_found("Schedule not found.")).await;
    assert_eq!(
        body,
        json!({"status": 404, "code": "not_found", "error": "Schedule not found."})
    );
}

#[rstest]
#[actix_web::test]
async fn internal_errors_are_redacted() {
    let body = body_of(&Error::internal("redis said: WRONGTYPE at rsch:default:abc")).await;
    assert_eq!(
        body,
        json!({"status": 500, "code": "internal_error", "error": "Internal server error"})
    );
}

#[rstest]
#[actix_web::test]
async fn trace_id_is_included_when_in_scope() {
    let trace_id: TraceId = "00000000-0000-0000-0000-000000000000"
        .parse()
        .expect("valid UUID");
    let body = TraceId::scope(trace_id, body_of(&Error::unauthorized("Unauthorized."))).await;
    assert_eq!(body["trace_id"], json!(trace_id.to_string()));
    assert_eq!(body["status"], json!(401));
}
