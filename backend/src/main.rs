//! Scheduler entry-point: loads settings, starts the dispatch loop and serves
//! the REST API until interrupted.

mod server;

use actix_web::web;
use color_eyre::eyre::{Result, WrapErr, eyre};
use ortho_config::OrthoConfig;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use webhook_scheduler::config::SchedulerSettings;
use webhook_scheduler::inbound::http::health::HealthState;

use server::{Components, build_components, create_server};

fn init_tracing() {
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }
}

/// Application bootstrap.
#[actix_web::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let config = SchedulerSettings::load()
        .map_err(|err| eyre!("failed to load settings: {err}"))?
        .into_runtime()
        .wrap_err("invalid settings")?;
    let Components {
        http_state,
        dispatch,
        bind_addr,
    } = build_components(config).await?;

    let (stop_tx, mut stop_rx) = watch::channel(false);
    let dispatch_task = tokio::spawn(dispatch.run(async move {
        // A dropped sender also means stop.
        let _ = stop_rx.wait_for(|stop| *stop).await;
    }));

    let health_state = web::Data::new(HealthState::new());
    let server = create_server(health_state.clone(), http_state, bind_addr)
        .wrap_err_with(|| format!("bind {bind_addr}"))?;
    let handle = server.handle();
    actix_web::rt::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        info!("shutdown requested");
        health_state.mark_unhealthy();
        handle.stop(true).await;
    });
    info!(%bind_addr, "scheduler listening");

    let served = server.await;
    stop_tx.send_replace(true);
    if let Err(e) = dispatch_task.await {
        error!(error = %e, "dispatch loop panicked");
    }
    served.wrap_err("http server")?;
    info!("scheduler stopped");
    Ok(())
}
