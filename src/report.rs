use crate::audit::Mismatch;
use crate::catalog::CatalogResult;
use crate::pipeline::StageTally;
use crate::store::{ExistenceStatus, FileRecord, RootPath, Summary, VerificationStatus};

pub fn print_tally(stage: &str, tally: &StageTally) {
    println!("{}", format_tally(stage, tally));
}

fn format_tally(stage: &str, tally: &StageTally) -> String {
    let counts = [
        (tally.present, "present"),
        (tally.absent, "absent"),
        (tally.measured, "measured"),
        (tally.computed, "computed"),
        (tally.intact, "intact"),
        (tally.corrupted, "corrupted"),
        (tally.skipped, "deferred"),
    ];
    let parts: Vec<String> = counts
        .iter()
        .filter(|(count, _)| *count > 0)
        .map(|(count, label)| format!("{} {}", count, label))
        .collect();

    let mut line = if tally.processed() == 0 && tally.skipped == 0 {
        format!("{}: nothing to do", stage)
    } else {
        format!("{}: {}", stage, parts.join(", "))
    };
    if tally.cancelled {
        line.push_str(" (interrupted)");
    }
    line
}

pub fn print_catalog(result: &CatalogResult) {
    let mut line = format!(
        "catalog: {} new, {} already known",
        result.inserted, result.skipped
    );
    if result.cancelled {
        line.push_str(" (interrupted)");
    }
    println!("{}", line);
}

pub fn print_mismatch(mismatch: &Mismatch) {
    for line in format_mismatch_lines(mismatch) {
        println!("{}", line);
    }
}

fn format_mismatch_lines(mismatch: &Mismatch) -> Vec<String> {
    let mut lines = vec![format!("{:<2} {}", "C", mismatch.path.display())];

    if mismatch.stored_size != Some(mismatch.observed_size) {
        let stored = mismatch
            .stored_size
            .map(format_size)
            .unwrap_or_else(|| "unknown".to_string());
        lines.push(format!(
            "   size: {} -> {}",
            stored,
            format_size(mismatch.observed_size)
        ));
    }
    lines.push(format!(
        "   sha256: {} -> {}",
        mismatch.stored_checksum, mismatch.observed_checksum
    ));

    lines
}

pub fn print_records(records: &[FileRecord]) {
    for record in records {
        println!("{}", format_record(record));
    }
}

fn format_record(record: &FileRecord) -> String {
    let code = match (record.existence, record.verification) {
        (ExistenceStatus::Absent, _) => "A",
        (_, VerificationStatus::Corrupted) => "C",
        (_, VerificationStatus::Intact) => ".",
        _ => "?",
    };
    let size = record
        .size_bytes
        .map(format_size)
        .unwrap_or_else(|| "-".to_string());
    let mtime = record
        .mtime_nanos
        .map(format_mtime)
        .unwrap_or_else(|| "-".to_string());
    let checksum = record
        .checksum
        .as_deref()
        .map(truncate_sha256)
        .unwrap_or_else(|| "-".to_string());

    format!(
        "{:<2} {:>10}  {:<19}  {:<15}  {}",
        code,
        size,
        mtime,
        checksum,
        record.relative_path.display()
    )
}

pub fn print_summary(root: &RootPath, summary: &Summary) {
    for line in format_summary(root, summary) {
        println!("{}", line);
    }
}

fn format_summary(root: &RootPath, summary: &Summary) -> Vec<String> {
    vec![
        format!("Root #{}: {}", root.id, root.path.display()),
        format!("  files:       {}", summary.files),
        format!(
            "  existence:   {} present, {} absent, {} unknown",
            summary.present, summary.absent, summary.unknown
        ),
        format!(
            "  sizes:       {} recorded ({})",
            summary.sized,
            format_size(summary.total_bytes)
        ),
        format!("  checksums:   {} recorded", summary.checksummed),
        format!(
            "  verification: {} intact, {} corrupted, {} awaiting",
            summary.intact, summary.corrupted, summary.awaiting_verification
        ),
    ]
}

pub fn print_roots(roots: &[RootPath]) {
    for root in roots {
        println!("{:>4}  {}", root.id, root.path.display());
    }
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    const GB: u64 = 1024 * 1024 * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

fn format_mtime(nanos: u64) -> String {
    use std::time::{Duration, UNIX_EPOCH};

    let system_time = UNIX_EPOCH + Duration::from_nanos(nanos);
    let datetime: chrono::DateTime<chrono::Local> = system_time.into();
    datetime.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn truncate_sha256(sha256: &str) -> String {
    match sha256.get(..12) {
        Some(prefix) if sha256.len() > 12 => format!("{}...", prefix),
        _ => sha256.to_string(),
    }
}
