//! Append-only audit trail of reconciliation events.
//!
//! One line per event: `<RFC 3339 timestamp> <event> key=value ...`.

use std::fmt::Write as _;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::reconcile::Outcome;

#[derive(Debug)]
pub enum AuditEvent<'a> {
    CycleStarted {
        zone: &'a str,
        hostnames: usize,
    },
    HostReconciled {
        hostname: &'a str,
        ip: IpAddr,
        outcome: &'a Outcome,
    },
    CycleFinished {
        ip: IpAddr,
        succeeded: usize,
        failed: usize,
    },
    CycleAborted {
        reason: String,
    },
}

impl AuditEvent<'_> {
    /// The event rendered without its timestamp.
    pub fn to_line(&self) -> String {
        match self {
            AuditEvent::CycleStarted { zone, hostnames } => {
                format!("cycle_started zone={} hostnames={}", zone, hostnames)
            }
            AuditEvent::HostReconciled {
                hostname,
                ip,
                outcome,
            } => {
                let mut line = format!(
                    "host_reconciled hostname={} outcome={}",
                    hostname,
                    outcome.label()
                );
                match outcome {
                    Outcome::Unchanged | Outcome::Created => {
                        let _ = write!(line, " value={}", ip);
                    }
                    Outcome::Updated { previous } => {
                        let _ = write!(line, " previous={} value={}", previous, ip);
                    }
                    Outcome::Failed(reason) => {
                        let _ = write!(line, " reason={:?}", reason.to_string());
                    }
                }
                line
            }
            AuditEvent::CycleFinished {
                ip,
                succeeded,
                failed,
            } => format!(
                "cycle_finished ip={} status={} succeeded={} failed={}",
                ip,
                if *failed == 0 { "ok" } else { "partial" },
                succeeded,
                failed
            ),
            AuditEvent::CycleAborted { reason } => {
                format!("cycle_aborted reason={:?}", reason)
            }
        }
    }
}

pub trait AuditSink: Send {
    fn record(&mut self, event: &AuditEvent<'_>) -> io::Result<()>;

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Used when no audit file is configured; tracing still carries every event.
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&mut self, _event: &AuditEvent<'_>) -> io::Result<()> {
        Ok(())
    }
}

/// Keeps timestamp-free lines in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    pub lines: Vec<String>,
}

impl AuditSink for MemoryAuditSink {
    fn record(&mut self, event: &AuditEvent<'_>) -> io::Result<()> {
        self.lines.push(event.to_line());
        Ok(())
    }
}

pub struct FileAuditSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl FileAuditSink {
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for FileAuditSink {
    fn record(&mut self, event: &AuditEvent<'_>) -> io::Result<()> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            io::Error::new(io::ErrorKind::BrokenPipe, "audit log already closed")
        })?;

        writeln!(
            writer,
            "{} {}",
            humantime::format_rfc3339_seconds(SystemTime::now()),
            event.to_line()
        )?;
        writer.flush()
    }

    fn close(&mut self) -> io::Result<()> {
        match self.writer.take() {
            Some(mut writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for FileAuditSink {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
