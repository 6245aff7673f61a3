//! Puts engine output records into the archive.

use serde::Serialize;

use super::engine::OutputRecord;
use crate::archive::{Archive, ArchiveError, DEFAULT_FILE_MODE};

/// Counts from one batch of writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteSummary {
    pub written: usize,
    pub stubs: usize,
    pub rejected: usize,
}

/// Write records at their exact paths.
///
/// Rejected paths and duplicates are logged and skipped. A fatal filesystem
/// error stops the batch and is returned.
pub fn write_records(
    archive: &mut Archive,
    records: &[OutputRecord],
) -> Result<WriteSummary, ArchiveError> {
    let mut summary = WriteSummary::default();
    for record in records {
        match archive.add_string(&record.text, &record.path, DEFAULT_FILE_MODE) {
            Ok(_) => {
                summary.written += 1;
                if record.is_stub() {
                    summary.stubs += 1;
                }
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                summary.rejected += 1;
                tracing::warn!(path = %record.path, error = %e, "Skipping output record");
            }
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitters::format_stub;
    use tempfile::tempdir;

    #[test]
    fn writes_records_and_counts_rejects() {
        let dir = tempdir().unwrap();
        let mut archive = Archive::create(dir.path(), "r").unwrap();
        let records = vec![
            OutputRecord::new("proc/cmdline", "ro quiet\n"),
            OutputRecord::new("proc/cpuinfo", format_stub("no cpus")),
            OutputRecord::new("proc/cmdline", "again\n"),
            OutputRecord::new("../escape", "x"),
        ];
        let summary = write_records(&mut archive, &records).unwrap();
        assert_eq!(
            summary,
            WriteSummary {
                written: 2,
                stubs: 1,
                rejected: 2
            }
        );
        let text = std::fs::read_to_string(archive.archive_path().join("proc/cmdline")).unwrap();
        assert_eq!(text, "ro quiet\n");
    }
}
