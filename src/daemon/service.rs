use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::audit::{AuditSink, FileAuditSink, NullAuditSink};
use crate::config::Settings;
use crate::dns::create_provider;
use crate::error::{ConfigError, CycleError};
use crate::ip::IpDiscovery;
use crate::reconcile::{CycleReport, Reconciler, ReconcilerConfig};
use crate::secrets::CredentialStore;

/// Inline credential from the config file, else the credential store.
pub fn resolve_credential(settings: &Settings, store: &CredentialStore) -> Result<String, ConfigError> {
    if let Some(token) = settings.inline_credential() {
        return Ok(token.to_string());
    }

    store.get(&settings.provider.name).map_err(|e| {
        ConfigError::Invalid(format!(
            "no credential configured for {}: {:#}",
            settings.provider.name, e
        ))
    })
}

pub fn build_reconciler(settings: &Settings, token: &str) -> Result<Reconciler, ConfigError> {
    let timeout = settings.request_timeout()?;
    let provider = create_provider(
        &settings.provider.name,
        token,
        settings.provider.api_base.as_deref(),
        timeout,
    )?;
    let discovery = IpDiscovery::from_config(&settings.ip_sources, timeout)?;
    let config = ReconcilerConfig::from_settings(settings)?;

    info!(
        "Using {} for zone {} with IP sources: {}",
        provider.provider_name(),
        config.zone,
        discovery.sources().collect::<Vec<_>>().join(", ")
    );

    Ok(Reconciler::new(config, provider, discovery))
}

pub fn open_audit_sink(settings: &Settings) -> Result<Box<dyn AuditSink>> {
    match &settings.audit_log {
        Some(path) => {
            let sink = FileAuditSink::open(path)
                .with_context(|| format!("Failed to open audit log: {}", path.display()))?;
            info!("Writing audit events to {}", sink.path().display());
            Ok(Box::new(sink))
        }
        None => Ok(Box::new(NullAuditSink)),
    }
}

pub async fn run(settings: Settings) -> Result<()> {
    settings.validate()?;
    let token = resolve_credential(&settings, &CredentialStore::default())?;
    let reconciler = build_reconciler(&settings, &token)?;
    let mut audit = open_audit_sink(&settings)?;
    let interval = settings.interval()?;

    let shutdown_rx = spawn_shutdown_listener();

    info!(
        "Daemon started. Maintaining {} hostname(s) every {}",
        reconciler.config().records.len(),
        humantime::format_duration(interval)
    );

    run_loop(
        &reconciler,
        audit.as_mut(),
        interval,
        settings.run_on_start,
        shutdown_rx,
    )
    .await;

    if let Err(e) = audit.close() {
        warn!("Failed to close audit log: {}", e);
    }
    info!("Daemon stopped");
    Ok(())
}

/// Run exactly one cycle. Returns whether every hostname converged.
pub async fn run_once(settings: Settings) -> Result<bool> {
    settings.validate()?;
    let token = resolve_credential(&settings, &CredentialStore::default())?;
    let reconciler = build_reconciler(&settings, &token)?;
    let mut audit = open_audit_sink(&settings)?;

    let mut shutdown_rx = spawn_shutdown_listener();
    let result = run_cycle_until(&reconciler, audit.as_mut(), &mut shutdown_rx).await;

    if let Err(e) = audit.close() {
        warn!("Failed to close audit log: {}", e);
    }

    match result {
        Ok(report) => Ok(report.is_success()),
        Err(e) => Err(e.into()),
    }
}

/// Tick every `interval` until `shutdown` flips to true. Cycles run inline,
/// so a tick that comes due while a cycle is still running is dropped rather
/// than queued.
pub async fn run_loop(
    reconciler: &Reconciler,
    audit: &mut dyn AuditSink,
    interval: Duration,
    run_on_start: bool,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    if !run_on_start {
        // the first tick completes immediately
        ticker.tick().await;
    }

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            _ = ticker.tick() => {
                match run_cycle_until(reconciler, audit, &mut shutdown).await {
                    Err(CycleError::Cancelled) => break,
                    // already logged and audited by the reconciler
                    Ok(_) | Err(_) => {}
                }
            }
            _ = wait_for_flag(&mut shutdown) => break,
        }
    }

    info!("Shutdown signal received, stopping");
}

/// Run one cycle, abandoning it at its next await point if shutdown is
/// signalled. Writes already acknowledged by the provider stay in place.
async fn run_cycle_until(
    reconciler: &Reconciler,
    audit: &mut dyn AuditSink,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<CycleReport, CycleError> {
    tokio::select! {
        result = reconciler.run_cycle(audit) => result,
        _ = wait_for_flag(shutdown) => {
            warn!("Cycle cancelled by shutdown");
            Err(CycleError::Cancelled)
        }
    }
}

async fn wait_for_flag(shutdown: &mut watch::Receiver<bool>) {
    // a dropped sender means nobody can ask us to stop
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn spawn_shutdown_listener() -> watch::Receiver<bool> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown().await {
            error!("Error waiting for shutdown signal: {}", e);
            return;
        }
        let _ = shutdown_tx.send(true);
    });

    shutdown_rx
}

async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(windows)]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
