//! `strongbox sweep|check|backup`.
//!
//! `check` prints a report with `[ok]`, `[warn]` or `[fail]` per item and
//! exits non-zero when any record is unrecoverable.

use std::path::PathBuf;

use {
    anyhow::{Result, bail},
    strongbox_vault::{IntegrityReport, Vault},
};

// ── ANSI helpers ────────────────────────────────────────────────────────────

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Ok,
    Warn,
    Fail,
}

impl Status {
    fn label(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Warn => "warn",
            Self::Fail => "fail",
        }
    }

    fn color(self) -> &'static str {
        match self {
            Self::Ok => GREEN,
            Self::Warn => YELLOW,
            Self::Fail => RED,
        }
    }
}

fn report_lines(report: &IntegrityReport) -> Vec<(Status, String)> {
    let mut lines = vec![(
        Status::Ok,
        format!("{} record(s), {} key file(s)", report.records, report.keys),
    )];

    for id in &report.missing_keys {
        lines.push((
            Status::Fail,
            format!("record {id} has no key; its secret is unrecoverable"),
        ));
    }
    for (id, error) in &report.unreadable {
        lines.push((Status::Fail, format!("record {id} does not decrypt: {error}")));
    }
    for id in &report.orphan_keys {
        lines.push((
            Status::Warn,
            format!("key {id} has no record (run `strongbox sweep`)"),
        ));
    }
    lines
}

pub async fn check(vault: &Vault) -> Result<()> {
    let report = vault.check().await?;

    eprintln!("{BOLD}strongbox check{RESET}");
    let lines = report_lines(&report);
    for (status, message) in &lines {
        eprintln!("  [{}{}{RESET}]  {message}", status.color(), status.label());
    }

    let errors = lines.iter().filter(|(s, _)| *s == Status::Fail).count();
    let warnings = lines.iter().filter(|(s, _)| *s == Status::Warn).count();
    eprintln!("\n{BOLD}Summary:{RESET} {errors} error(s), {warnings} warning(s)");

    if errors > 0 {
        std::process::exit(1);
    }
    Ok(())
}

pub async fn sweep(vault: &Vault) -> Result<()> {
    let swept = vault.sweep_orphan_keys().await?;
    if swept.is_empty() {
        println!("No orphan keys.");
    } else {
        for id in &swept {
            println!("Removed orphan key {id}");
        }
    }
    Ok(())
}

pub async fn backup(vault: &Vault, dest: Option<PathBuf>) -> Result<()> {
    if let Some(dest) = dest {
        let manifest = vault.snapshot(&dest).await?;
        println!(
            "Wrote {} record(s) and {} key(s) to {}",
            manifest.records,
            manifest.keys,
            manifest.dir.display()
        );
        return Ok(());
    }

    let Some(daily) = vault.daily_backup() else {
        bail!("backups are disabled in the config; pass --dest to write a snapshot");
    };
    match vault.backup_today().await? {
        Some(dir) => println!("Wrote {}", dir.display()),
        None => println!("Today's backup already exists in {}", daily.dir().display()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use {super::*, strongbox_vault::RowError};

    #[test]
    fn healthy_report_is_one_ok_line() {
        let report = IntegrityReport {
            records: 2,
            keys: 2,
            ..Default::default()
        };
        let lines = report_lines(&report);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].0, Status::Ok);
    }

    #[test]
    fn problems_are_classified() {
        use strongbox_vault::RecordId;

        let report = IntegrityReport {
            records: 2,
            keys: 2,
            orphan_keys: vec![RecordId::new(9)],
            missing_keys: vec![RecordId::new(1)],
            unreadable: vec![(RecordId::new(2), RowError::Tampered)],
        };
        let statuses: Vec<Status> = report_lines(&report).into_iter().map(|(s, _)| s).collect();
        assert_eq!(statuses, vec![
            Status::Ok,
            Status::Fail,
            Status::Fail,
            Status::Warn
        ]);
    }
}
