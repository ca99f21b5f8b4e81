//! Reqwest-backed webhook sender.
//!
//! This adapter owns transport details only: the auth header, the fixed
//! timeout, and mapping the response onto success or a failure kind. Whether
//! to retry is decided by the caller.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, StatusCode};

use crate::domain::ports::{WebhookDelivery, WebhookSendError, WebhookSender};

/// Fixed per-call timeout for webhook delivery.
pub const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts schedule payloads as JSON with the shared token in `Authorization`.
pub struct HttpWebhookSender {
    client: Client,
    token: String,
}

impl HttpWebhookSender {
    /// Build a sender with an explicit request timeout.
    /// ```rust,ignore
    /// let sender = HttpWebhookSender::new("secret", WEBHOOK_TIMEOUT)?;
    /// ```
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(token: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            token: token.into(),
        })
    }
}

#[async_trait]
impl WebhookSender for HttpWebhookSender {
    async fn send(&self, delivery: &WebhookDelivery) -> Result<(), WebhookSendError> {
        let response = self
            .client
            .post(delivery.webhook.as_str())
            .header(AUTHORIZATION, self.token.as_str())
            .json(&delivery.data)
            .send()
            .await
            .map_err(map_transport_error)?;
        map_status(response.status())
    }
}

fn map_status(status: StatusCode) -> Result<(), WebhookSendError> {
    if status == StatusCode::OK {
        Ok(())
    } else {
        Err(WebhookSendError::rejected(status.as_u16()))
    }
}

fn map_transport_error(error: reqwest::Error) -> WebhookSendError {
    if error.is_timeout() {
        WebhookSendError::timeout(error.to_string())
    } else if error.is_builder() {
        WebhookSendError::encode(error.to_string())
    } else {
        WebhookSendError::transport(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    //! Status mapping plus a loopback server for the real request shape.

    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};

    use actix_web::{App, HttpRequest, HttpResponse, HttpServer, web};
    use rstest::rstest;
    use serde_json::{Value, json};

    use super::*;

    #[rstest]
    #[case::ok(StatusCode::OK, None)]
    #[case::created(StatusCode::CREATED, Some(201))]
    #[case::no_content(StatusCode::NO_CONTENT, Some(204))]
    #[case::redirect(StatusCode::FOUND, Some(302))]
    #[case::not_found(StatusCode::NOT_FOUND, Some(404))]
    #[case::server_error(StatusCode::INTERNAL_SERVER_ERROR, Some(500))]
    fn only_200_counts_as_delivered(#[case] status: StatusCode, #[case] rejected: Option<u16>) {
        let result = map_status(status);
        match rejected {
            None => assert!(result.is_ok()),
            Some(code) => assert_eq!(result, Err(WebhookSendError::rejected(code))),
        }
    }

    type Captured = Arc<Mutex<Vec<(Option<String>, Value)>>>;

    async fn capture(
        request: HttpRequest,
        body: web::Json<Value>,
        captured: web::Data<Captured>,
        status: web::Data<u16>,
    ) -> HttpResponse {
        let auth = request
            .headers()
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        captured
            .lock()
            .expect("capture lock")
            .push((auth, body.into_inner()));
        HttpResponse::build(
            actix_web::http::StatusCode::from_u16(*status.get_ref()).expect("status"),
        )
        .finish()
    }

    fn spawn_endpoint(status: u16) -> (SocketAddr, Captured) {
        let captured: Captured = Arc::default();
        let shared = captured.clone();
        let server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(shared.clone()))
                .app_data(web::Data::new(status))
                .route("/hook", web::post().to(capture))
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .expect("bind loopback");
        let addr = server.addrs()[0];
        actix_web::rt::spawn(server.run());
        (addr, captured)
    }

    #[actix_web::test]
    async fn posts_json_with_token_header() {
        let (addr, captured) = spawn_endpoint(200);
        let sender = HttpWebhookSender::new("s3cret", WEBHOOK_TIMEOUT).expect("client");

        sender
            .send(&WebhookDelivery {
                webhook: format!("http://{addr}/hook"),
                data: json!({"order": 7}),
            })
            .await
            .expect("delivered");

        let calls = captured.lock().expect("capture lock").clone();
        assert_eq!(
            calls,
            vec![(Some("s3cret".to_owned()), json!({"order": 7}))]
        );
    }

    #[actix_web::test]
    async fn non_200_response_is_rejected() {
        let (addr, _) = spawn_endpoint(500);
        let sender = HttpWebhookSender::new("s3cret", WEBHOOK_TIMEOUT).expect("client");

        let error = sender
            .send(&WebhookDelivery {
                webhook: format!("http://{addr}/hook"),
                data: json!([1, 2, 3]),
            })
            .await
            .expect_err("rejected");

        assert_eq!(error, WebhookSendError::rejected(500_u16));
    }

    #[actix_web::test]
    async fn unreachable_endpoint_is_a_transport_failure() {
        let sender = HttpWebhookSender::new("s3cret", WEBHOOK_TIMEOUT).expect("client");

        let error = sender
            .send(&WebhookDelivery {
                webhook: "http://127.0.0.1:9/hook".to_owned(),
                data: json!({}),
            })
            .await
            .expect_err("unreachable");

        assert!(matches!(error, WebhookSendError::Transport { .. }));
    }
}
