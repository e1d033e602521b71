use std::path::Path;

use strata_db::{MigrationState, StatusReport};

/// Print the migration status table for `strata status`.
pub fn print_status(report: &StatusReport, db_path: &Path) {
    for line in render_status(report, db_path) {
        println!("{line}");
    }
}

fn render_status(report: &StatusReport, db_path: &Path) -> Vec<String> {
    let version_w = report
        .entries
        .iter()
        .map(|e| e.version.to_string().len())
        .chain(report.orphaned.iter().map(|r| r.version.to_string().len()))
        .chain(["Version".len()])
        .max()
        .unwrap_or(7);
    let applied_w = 19; // "YYYY-MM-DD HH:MM:SS"
    let name_w = report
        .entries
        .iter()
        .map(|e| e.name.len())
        .chain(["Name".len(), 24])
        .max()
        .unwrap_or(24);
    let width = version_w + applied_w + name_w + 10;

    let title = format!("strata status · {}", db_path.display());
    let title_dashes = width.saturating_sub(title.chars().count() + 7);
    let top = format!("╭─── {title} {}╮", "─".repeat(title_dashes));
    let bottom = format!("╰{}╯", "─".repeat(width - 2));

    let row = |v: &str, a: &str, n: &str| {
        format!("│ {v:>version_w$}   {a:<applied_w$}   {n:<name_w$} │")
    };

    let mut lines = vec![top, row("Version", "Applied at", "Name")];
    lines.push(row(
        &"─".repeat(version_w),
        &"─".repeat(applied_w),
        &"─".repeat(name_w),
    ));

    for entry in &report.entries {
        let applied = match &entry.state {
            MigrationState::Applied { at: Some(at) } => at.format("%Y-%m-%d %H:%M:%S").to_string(),
            MigrationState::Applied { at: None } => "applied".to_string(),
            MigrationState::Pending => "pending".to_string(),
        };
        lines.push(row(&entry.version.to_string(), &applied, &entry.name));
    }
    for record in &report.orphaned {
        let applied = record
            .applied_at
            .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "applied".to_string());
        lines.push(row(&record.version.to_string(), &applied, "(no migration file)"));
    }

    let pending = report.pending().count();
    let summary = format!(
        "current version {} · {} pending",
        report.current_version, pending
    );
    lines.push(row("", "", ""));
    lines.push(format!("│ {summary:<inner$} │", inner = width - 4));
    lines.push(bottom);
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_db::{StatusEntry, VersionRecord};

    fn report() -> StatusReport {
        StatusReport {
            current_version: 2,
            entries: vec![
                StatusEntry {
                    version: 1,
                    name: "init".into(),
                    state: MigrationState::Applied { at: None },
                },
                StatusEntry {
                    version: 3,
                    name: "add_tags".into(),
                    state: MigrationState::Pending,
                },
            ],
            orphaned: vec![VersionRecord {
                version: 2,
                is_applied: true,
                applied_at: None,
            }],
        }
    }

    #[test]
    fn rows_share_one_width() {
        let lines = render_status(&report(), Path::new("app.db"));
        let widths: Vec<_> = lines.iter().map(|l| l.chars().count()).collect();
        assert!(widths.windows(2).all(|w| w[0] == w[1]), "{widths:?}");
    }

    #[test]
    fn lists_pending_and_orphaned_rows() {
        let text = render_status(&report(), Path::new("app.db")).join("\n");
        assert!(text.contains("pending"));
        assert!(text.contains("add_tags"));
        assert!(text.contains("(no migration file)"));
        assert!(text.contains("current version 2 · 1 pending"));
    }
}
