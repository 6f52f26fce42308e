//! Process memory snapshots taken around each sync run.

use sysinfo::{ProcessesToUpdate, System};

/// Resident memory of this process in bytes, if the platform reports it.
/// Refreshes only this process.
pub fn resident_bytes() -> Option<u64> {
    let pid = sysinfo::get_current_pid().ok()?;
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    sys.process(pid).map(|p| p.memory())
}

/// [`resident_bytes`] off the async workers.
pub async fn snapshot() -> Option<u64> {
    tokio::task::spawn_blocking(resident_bytes)
        .await
        .ok()
        .flatten()
}

/// Signed difference between two snapshots, in MiB. Unknown snapshots give 0.
pub fn delta_mb(before: Option<u64>, after: Option<u64>) -> f64 {
    match (before, after) {
        (Some(b), Some(a)) => (a as f64 - b as f64) / (1024.0 * 1024.0),
        _ => 0.0,
    }
}
