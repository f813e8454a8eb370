mod service;

pub use service::{build_reconciler, open_audit_sink, resolve_credential, run, run_loop, run_once};
