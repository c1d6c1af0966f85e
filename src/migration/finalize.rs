use super::DEBUG_LOGS_LIST_PREFIX;
use super::queries::StatusReader;
use crate::context::Context;
use crate::error::{AppError, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Warnings beyond this count are summarised instead of listed.
const MAX_LISTED_WARNINGS: usize = 5;

#[derive(Debug, Default)]
pub struct FinalizeSummary {
    /// Set when a report was written.
    pub report_path: Option<PathBuf>,
    pub warnings: Vec<String>,
}

pub fn report_path(output_dir: &Path, migration_id: &str) -> PathBuf {
    output_dir.join(format!("migration_report_{}.txt", migration_id))
}

/// Pulls member logs, saves the report and collects warnings, regardless of
/// how the pipeline ended.
pub async fn finalize(
    ctx: &Context,
    reader: &StatusReader,
    output_dir: &Path,
) -> Result<FinalizeSummary> {
    save_member_logs(ctx, reader).await?;

    let path = report_path(output_dir, reader.migration_id());
    let written = save_report(ctx, reader, &path)
        .await
        .map_err(|err| err.context("saving report to file"))?;

    let warnings = match reader.fetch_warnings(ctx).await {
        Ok(warnings) => warnings,
        Err(err) => {
            tracing::error!(migration_id = %reader.migration_id(), error = %err, "reading migration warnings");
            Vec::new()
        }
    };

    Ok(FinalizeSummary {
        report_path: written.then_some(path),
        warnings,
    })
}

async fn save_member_logs(ctx: &Context, reader: &StatusReader) -> Result<()> {
    let cluster = reader.cluster();
    let members = ctx.run(cluster.members()).await??;
    for member in members {
        let list_name = format!("{}{}", DEBUG_LOGS_LIST_PREFIX, member.uuid);
        let lines = ctx.run(cluster.list(&list_name)).await??;
        for line in lines {
            tracing::info!(
                migration_id = %reader.migration_id(),
                member = %member.uuid,
                "{}",
                line
            );
        }
    }
    Ok(())
}

/// Returns whether a report was written; an empty report is skipped.
async fn save_report(ctx: &Context, reader: &StatusReader, path: &Path) -> Result<bool> {
    let report = reader.fetch_report(ctx).await?;
    if report.is_empty() {
        return Ok(false);
    }
    let dir = path
        .parent()
        .ok_or_else(|| AppError::InvalidInput(format!("invalid report path {}", path.display())))?;
    let dir = if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    };
    fs::create_dir_all(dir)?;

    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(report.as_bytes())?;
    file.persist(path).map_err(|err| AppError::Io(err.error))?;
    tracing::info!(path = %path.display(), "migration report saved");
    Ok(true)
}

/// Lines telling the user about the migration's warnings.
pub fn warning_lines(warnings: &[String], report_path: Option<&Path>) -> Vec<String> {
    if warnings.is_empty() {
        return Vec::new();
    }
    if warnings.len() <= MAX_LISTED_WARNINGS {
        return warnings.iter().map(|warning| format!("* {}", warning)).collect();
    }
    let summary = match report_path {
        Some(path) => format!(
            "You have {} warnings that you can find in your migration report {}.",
            warnings.len(),
            path.display()
        ),
        None => format!(
            "You have {} warnings that you can find in your migration report.",
            warnings.len()
        ),
    };
    vec![summary]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn warnings(count: usize) -> Vec<String> {
        (1..=count).map(|i| format!("w{}", i)).collect()
    }

    #[test]
    fn few_warnings_are_listed() {
        assert_eq!(
            warning_lines(&warnings(2), None),
            vec!["* w1".to_string(), "* w2".to_string()]
        );
        assert_eq!(warning_lines(&warnings(5), None).len(), 5);
        assert!(warning_lines(&[], None).is_empty());
    }

    #[test]
    fn many_warnings_are_counted() {
        let path = PathBuf::from("out/migration_report_x.txt");
        assert_eq!(
            warning_lines(&warnings(6), Some(&path)),
            vec![
                "You have 6 warnings that you can find in your migration report out/migration_report_x.txt."
                    .to_string()
            ]
        );
    }

    #[test]
    fn report_file_name() {
        assert_eq!(
            report_path(Path::new("/tmp/out"), "abc"),
            PathBuf::from("/tmp/out/migration_report_abc.txt")
        );
    }
}
