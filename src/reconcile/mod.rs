//! One convergence cycle: discover the public address, resolve the zone,
//! then bring every configured hostname in line with that address.

mod outcome;

pub use outcome::{CycleReport, HostOutcome, Outcome, Plan, PlannedAction};

use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::audit::{AuditEvent, AuditSink};
use crate::config::{RetryPolicy, Settings};
use crate::dns::{DesiredRecord, DnsProvider, ObservedRecord, RecordType, Zone};
use crate::error::{ConfigError, CycleError, ProviderError, RecordFailure};
use crate::ip::IpDiscovery;

/// The parts of [`Settings`] a cycle needs, already validated.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub zone: String,
    pub record_type: RecordType,
    pub records: Vec<DesiredRecord>,
    pub retry: RetryPolicy,
}

impl ReconcilerConfig {
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            zone: settings.zone_name()?,
            record_type: settings.record_type,
            records: settings.desired_records()?,
            retry: settings.retry_policy()?,
        })
    }
}

pub struct Reconciler {
    config: ReconcilerConfig,
    provider: Arc<dyn DnsProvider>,
    discovery: IpDiscovery,
}

impl Reconciler {
    pub fn new(config: ReconcilerConfig, provider: Arc<dyn DnsProvider>, discovery: IpDiscovery) -> Self {
        Self {
            config,
            provider,
            discovery,
        }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Run one cycle. Per-hostname failures are reported in the returned
    /// [`CycleReport`]; only shared-setup failures come back as `Err`.
    pub async fn run_cycle(&self, audit: &mut dyn AuditSink) -> Result<CycleReport, CycleError> {
        info!(
            "Starting reconciliation cycle for {} hostname(s) in {}",
            self.config.records.len(),
            self.config.zone
        );
        record(
            audit,
            &AuditEvent::CycleStarted {
                zone: &self.config.zone,
                hostnames: self.config.records.len(),
            },
        );

        match self.converge(audit).await {
            Ok(report) => {
                let failed = report.failed().count();
                if failed == 0 {
                    info!(
                        "Cycle finished: {} hostname(s) at {}, {} write(s)",
                        report.outcomes.len(),
                        report.ip,
                        report.writes()
                    );
                } else {
                    warn!(
                        "Cycle finished with {} of {} hostname(s) failed",
                        failed,
                        report.outcomes.len()
                    );
                }
                record(
                    audit,
                    &AuditEvent::CycleFinished {
                        ip: report.ip,
                        succeeded: report.outcomes.len() - failed,
                        failed,
                    },
                );
                Ok(report)
            }
            Err(e) => {
                error!("Cycle aborted: {}", e);
                record(
                    audit,
                    &AuditEvent::CycleAborted {
                        reason: e.to_string(),
                    },
                );
                Err(e)
            }
        }
    }

    async fn converge(&self, audit: &mut dyn AuditSink) -> Result<CycleReport, CycleError> {
        let ip = self.discovery.discover(self.config.record_type).await?;
        info!("Current public IP is {}", ip);

        let zone = self.resolve_zone().await?;

        let mut outcomes = Vec::with_capacity(self.config.records.len());
        for desired in &self.config.records {
            let outcome = match self.reconcile_host(&zone, desired, ip).await {
                Ok(outcome) => outcome,
                Err(failure) if failure.provider_error().is_auth() => {
                    return Err(CycleError::Auth(failure.provider_error().to_string()));
                }
                Err(failure) => Outcome::Failed(failure),
            };

            match &outcome {
                Outcome::Unchanged => info!("{} already points to {}", desired.hostname, ip),
                Outcome::Created => info!("Created {} -> {}", desired.hostname, ip),
                Outcome::Updated { previous } => {
                    info!("Updated {} from {} to {}", desired.hostname, previous, ip)
                }
                Outcome::Failed(reason) => error!("Failed to reconcile {}: {}", desired.hostname, reason),
            }
            record(
                audit,
                &AuditEvent::HostReconciled {
                    hostname: &desired.hostname,
                    ip,
                    outcome: &outcome,
                },
            );

            outcomes.push(HostOutcome {
                hostname: desired.hostname.clone(),
                outcome,
            });
        }

        Ok(CycleReport { ip, zone, outcomes })
    }

    /// Compute what a cycle would do, without writing anything.
    pub async fn plan(&self) -> Result<Plan, CycleError> {
        let ip = self.discovery.discover(self.config.record_type).await?;
        let zone = self.resolve_zone().await?;

        let mut actions = Vec::with_capacity(self.config.records.len());
        for desired in &self.config.records {
            let action = match self.lookup(&zone, desired).await {
                Ok(None) => PlannedAction::Create,
                Ok(Some(current)) if current.points_to(&ip) => PlannedAction::Keep { current },
                Ok(Some(current)) => PlannedAction::Update { current },
                Err(e) if e.is_auth() => return Err(CycleError::Auth(e.to_string())),
                Err(e) => PlannedAction::Unknown(e),
            };
            actions.push((desired.hostname.clone(), action));
        }

        Ok(Plan { ip, zone, actions })
    }

    async fn resolve_zone(&self) -> Result<Zone, CycleError> {
        let provider = self.provider.as_ref();
        let name = self.config.zone.as_str();

        self.with_retry("zone lookup", move || provider.resolve_zone(name))
            .await
            .map_err(|e| {
                if e.is_auth() {
                    CycleError::Auth(e.to_string())
                } else {
                    CycleError::ZoneResolutionFailed(e)
                }
            })
    }

    async fn lookup(
        &self,
        zone: &Zone,
        desired: &DesiredRecord,
    ) -> Result<Option<ObservedRecord>, ProviderError> {
        let provider = self.provider.as_ref();
        let hostname = desired.hostname.as_str();
        let record_type = desired.record_type;

        self.with_retry("record lookup", move || {
            provider.find_record(zone, hostname, record_type)
        })
        .await
    }

    async fn reconcile_host(
        &self,
        zone: &Zone,
        desired: &DesiredRecord,
        ip: IpAddr,
    ) -> Result<Outcome, RecordFailure> {
        let provider = self.provider.as_ref();

        match self.lookup(zone, desired).await.map_err(RecordFailure::LookupFailed)? {
            Some(current) => self.converge_existing(zone, desired, current, ip).await,
            None => {
                debug!("No {} record for {}, creating", desired.record_type, desired.hostname);
                let created = self
                    .with_retry("record create", move || provider.create_record(zone, desired, ip))
                    .await;

                match created {
                    Ok(_) => Ok(Outcome::Created),
                    Err(ProviderError::Conflict(reason)) => {
                        // Another writer created it between our lookup and create.
                        warn!(
                            "Create of {} conflicted ({}), looking it up again",
                            desired.hostname, reason
                        );
                        match self.lookup(zone, desired).await.map_err(RecordFailure::LookupFailed)? {
                            Some(current) => self.converge_existing(zone, desired, current, ip).await,
                            None => Err(RecordFailure::WriteFailed(ProviderError::Conflict(reason))),
                        }
                    }
                    Err(e) => Err(RecordFailure::WriteFailed(e)),
                }
            }
        }
    }

    async fn converge_existing(
        &self,
        zone: &Zone,
        desired: &DesiredRecord,
        current: ObservedRecord,
        ip: IpAddr,
    ) -> Result<Outcome, RecordFailure> {
        if current.points_to(&ip) {
            return Ok(Outcome::Unchanged);
        }

        let provider = self.provider.as_ref();
        let record_id = current.id.as_str();

        self.with_retry("record update", move || {
            provider.update_record(zone, record_id, desired, ip)
        })
        .await
        .map_err(RecordFailure::WriteFailed)?;

        Ok(Outcome::Updated {
            previous: current.content,
        })
    }

    /// Retry transient provider failures with exponential backoff.
    async fn with_retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let policy = &self.config.retry;
        let mut attempt = 1;

        loop {
            match op().await {
                Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                    let delay = policy.backoff(attempt);
                    warn!(
                        "{} attempt {}/{} failed: {}; retrying in {:?}",
                        what, attempt, policy.max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

fn record(audit: &mut dyn AuditSink, event: &AuditEvent<'_>) {
    if let Err(e) = audit.record(event) {
        warn!("Failed to write audit event: {}", e);
    }
}
