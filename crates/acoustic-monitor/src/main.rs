use std::sync::Arc;

use acoustic_core::MonitorEvent;
use acoustic_monitor::{
    CommandCapture, CommandClassifier, DaemonConfig, FieldMonitor, MonitorConfig, RegisterRequest,
};
use acoustic_redis::StateMirror;
use anyhow::Context;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "acoustic_monitor=info,acoustic_redis=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = MonitorConfig::from_env()?;
    let daemon = DaemonConfig::default();
    tracing::info!(
        sample_interval_secs = config.sample_interval.as_secs(),
        capture = %daemon.capture_command,
        classifier = %daemon.classifier_command,
        "starting acoustic monitor"
    );

    let monitor = FieldMonitor::new(
        config.clone(),
        Arc::new(CommandCapture::new(daemon.capture_command.clone())),
        Arc::new(CommandClassifier::new(
            daemon.classifier_command.clone(),
            daemon.classifier_args.clone(),
        )),
    )?;

    let mut subscription = monitor.subscribe().await;
    let mirror = match &daemon.redis_url {
        Some(url) => Some(spawn_mirror(url, &config)?),
        None => {
            tracing::info!("REDIS_URL not set, state mirror disabled");
            None
        }
    };

    if let Some(path) = &daemon.sensors_file {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading sensors file {}", path.display()))?;
        let requests: Vec<RegisterRequest> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing sensors file {}", path.display()))?;
        for request in requests {
            match monitor.register(request).await {
                Ok(sensor) => tracing::info!(sensor_id = %sensor.id, name = %sensor.name, "sensor loaded"),
                Err(e) => tracing::warn!(error = %e, "skipping sensor entry"),
            }
        }
    }

    monitor.start().await;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else { break };
                log_event(&event);
                if let Some(tx) = &mirror {
                    if tx.send(event).is_err() {
                        tracing::warn!("state mirror stopped");
                    }
                }
            }
            result = &mut shutdown => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "failed to listen for shutdown signal");
                }
                break;
            }
        }
    }

    tracing::info!("shutting down");
    monitor.shutdown().await;
    Ok(())
}

/// Forwards events to Redis on a blocking thread; the redis connection is
/// synchronous.
fn spawn_mirror(
    url: &str,
    config: &MonitorConfig,
) -> anyhow::Result<mpsc::UnboundedSender<MonitorEvent>> {
    let reading_ttl = (config.sample_interval.as_secs() as usize).saturating_mul(3).max(1);
    let mut mirror = StateMirror::connect(url, config.alert_capacity, reading_ttl)
        .with_context(|| format!("connecting to redis at {url}"))?;
    tracing::info!(url, "state mirror connected");

    let (tx, mut rx) = mpsc::unbounded_channel::<MonitorEvent>();
    tokio::task::spawn_blocking(move || {
        while let Some(event) = rx.blocking_recv() {
            if let Err(e) = mirror.apply(&event) {
                tracing::warn!(error = %e, event_type = event.event_type(), "state mirror write failed");
            }
        }
    });
    Ok(tx)
}

fn log_event(event: &MonitorEvent) {
    match event {
        MonitorEvent::NewAlert(alert) => tracing::warn!(
            alert_id = alert.id,
            sensor_id = %alert.sensor_id,
            severity = alert.severity,
            "pest activity detected"
        ),
        other => tracing::debug!(
            event_type = other.event_type(),
            sensor_id = other.sensor_id().unwrap_or("-"),
            "event"
        ),
    }
}
