//! Integration tests for producer execution
//!
//! Runs every scope against a mock session, writes the records into an
//! archive, and checks the resulting tree and zip.

use super::common::{read, small_system};
use std::collections::BTreeSet;
use std::fs::File;
use tempfile::TempDir;
use vmcore_report::archive::{Archive, Compression};
use vmcore_report::emitters::writer::write_records;
use vmcore_report::emitters::{Engine, OutputRecord, Scope};
use vmcore_report::session::mock::MockSession;

fn run_all(engine: &Engine, session: &MockSession) -> Vec<OutputRecord> {
    Scope::all()
        .iter()
        .flat_map(|scope| engine.run(*scope, session))
        .collect()
}

fn find<'a>(records: &'a [OutputRecord], path: &str) -> &'a OutputRecord {
    records
        .iter()
        .find(|r| r.path == path)
        .unwrap_or_else(|| panic!("no record for {path}"))
}

#[test]
fn test_small_system_produces_real_artifacts() {
    let records = run_all(&Engine::default(), &small_system());

    let stubs: Vec<&str> = records
        .iter()
        .filter(|r| r.is_stub())
        .map(|r| r.path.as_str())
        .collect();
    assert!(stubs.is_empty(), "unexpected stubs: {stubs:?}");

    assert_eq!(
        find(&records, "proc/cmdline").text,
        "BOOT_IMAGE=/vmlinuz root=/dev/vda1 ro\n"
    );
    assert_eq!(find(&records, "proc/modules").text, "ext4 1003520 2\n");
    assert!(find(&records, "proc/42/status").text.starts_with("Name:\tbash\n"));
    assert_eq!(
        find(&records, "proc/1/stack").text,
        "Stack trace not available\n"
    );
    assert_eq!(
        find(&records, "proc/42/stack").text,
        "[<0>] do_sys_poll+0x3c0/0x560\n"
    );
    assert_eq!(find(&records, "sys/devices/system/cpu/possible").text, "0-3\n");
    assert!(find(&records, "sos_commands/kernel/uname_-a")
        .text
        .starts_with("Linux crashbox 6.8.0-test"));
}

#[test]
fn test_empty_session_yields_stubs_not_errors() {
    let records = run_all(&Engine::default(), &MockSession::new());

    for path in ["proc/cmdline", "proc/modules", "sos_commands/kernel/lsmod"] {
        let record = find(&records, path);
        assert!(record.is_stub(), "{path} should be a stub: {:?}", record.text);
        assert!(record.text.ends_with('\n'));
    }
    // No tasks, so no per-pid files at all.
    assert!(!records.iter().any(|r| r.path.starts_with("proc/1/")));
}

#[test]
fn test_record_paths_are_unique_per_run() {
    let records = run_all(&Engine::default(), &small_system());
    let unique: BTreeSet<&str> = records.iter().map(|r| r.path.as_str()).collect();
    assert_eq!(unique.len(), records.len());
}

#[test]
fn test_records_land_in_zip_under_report_name() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let mut archive = Archive::create(dir.path(), "vmcore-report-test").unwrap();
    let records = run_all(&Engine::default(), &small_system());

    let summary = write_records(&mut archive, &records).unwrap();
    assert_eq!(summary.written, records.len());
    assert_eq!(summary.stubs, 0);
    assert_eq!(summary.rejected, 0);
    assert_eq!(
        read(archive.archive_path(), "proc/42/oom_adj"),
        "0\n"
    );

    let zip_path = archive.finalize(Compression::Stored).unwrap();
    let mut zip = zip::ZipArchive::new(File::open(&zip_path).unwrap()).unwrap();
    let names: Vec<String> = zip.file_names().map(str::to_string).collect();
    assert!(names.iter().all(|n| n.starts_with("vmcore-report-test/")));
    assert!(names.contains(&"vmcore-report-test/proc/cmdline".to_string()));

    let entry = zip.by_name("vmcore-report-test/proc/modules").unwrap();
    assert_eq!(entry.unix_mode().map(|m| m & 0o777), Some(0o644));
}

#[test]
fn test_cancelled_engine_produces_nothing() {
    let token = tokio_util::sync::CancellationToken::new();
    token.cancel();
    let engine = Engine::default().with_cancellation(token);
    assert!(run_all(&engine, &small_system()).is_empty());
}
