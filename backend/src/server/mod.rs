//! Process wiring: adapters, background dispatch and the HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use actix_web::dev::{Server, ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::{App, HttpServer, web};
use color_eyre::eyre::{Result, WrapErr};
use mockable::DefaultClock;
use tracing::info;

use webhook_scheduler::Trace;
use webhook_scheduler::config::SchedulerConfig;
use webhook_scheduler::domain::{
    DeliveryWorker, DeliveryWorkerPorts, DispatchLoop, InFlightDeliveries, ScheduleService,
};
use webhook_scheduler::inbound::http::health::HealthState;
use webhook_scheduler::inbound::http::state::HttpState;
use webhook_scheduler::inbound::http::{configure, route_not_found};
use webhook_scheduler::outbound::redis::RedisScheduleStore;
use webhook_scheduler::outbound::webhook::{HttpWebhookSender, WEBHOOK_TIMEOUT};

/// Everything `main` needs to run the service.
pub struct Components {
    pub http_state: web::Data<HttpState>,
    pub dispatch: DispatchLoop,
    pub bind_addr: SocketAddr,
}

/// Connect the adapters and assemble the domain services.
///
/// # Errors
/// Fails when the store is unreachable or the HTTP client cannot be built.
pub async fn build_components(config: SchedulerConfig) -> Result<Components> {
    let store = Arc::new(
        RedisScheduleStore::connect(&config.redis_url, config.codec.clone())
            .await
            .wrap_err("connect to redis")?,
    );
    let sender = Arc::new(
        HttpWebhookSender::new(config.api_token.clone(), WEBHOOK_TIMEOUT)
            .wrap_err("build webhook client")?,
    );

    let worker = Arc::new(DeliveryWorker::new(
        DeliveryWorkerPorts::new(store.clone(), store.clone(), sender),
        config.retry_policy,
    ));
    let in_flight = InFlightDeliveries::new();
    let dispatch = DispatchLoop::new(config.codec.clone(), store.clone(), worker)
        .with_concurrency_limit(config.max_concurrent_deliveries)
        .with_orphan_recovery(config.recover_orphans)
        .with_in_flight(in_flight.clone());
    let schedules = ScheduleService::new(
        store.clone(),
        store,
        config.codec,
        Arc::new(DefaultClock),
    )
    .with_in_flight(in_flight);

    info!(
        retries = %config.retry_policy.limit(),
        retry_interval_secs = config.retry_policy.interval().as_secs(),
        "scheduler components ready"
    );

    Ok(Components {
        http_state: web::Data::new(HttpState::new(Arc::new(schedules), config.api_token)),
        dispatch,
        bind_addr: SocketAddr::from(([0, 0, 0, 0], config.port)),
    })
}

fn build_app(
    health_state: web::Data<HealthState>,
    http_state: web::Data<HttpState>,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    App::new()
        .app_data(health_state)
        .app_data(http_state)
        .wrap(Trace)
        .configure(configure)
        .default_service(web::to(route_not_found))
}

/// Construct the HTTP server and mark the service ready.
///
/// # Errors
/// Propagates [`std::io::Error`] when binding the socket fails.
pub fn create_server(
    health_state: web::Data<HealthState>,
    http_state: web::Data<HttpState>,
    bind_addr: SocketAddr,
) -> std::io::Result<Server> {
    let server_health_state = health_state.clone();
    let server = HttpServer::new(move || {
        build_app(server_health_state.clone(), http_state.clone())
    })
    .disable_signals()
    .bind(bind_addr)?
    .run();

    health_state.mark_ready();
    Ok(server)
}
