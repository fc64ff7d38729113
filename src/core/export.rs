use crate::models::MatchResult;
use std::path::{Path, PathBuf};

/// Column order of the CSV export
pub const CSV_HEADERS: [&str; 11] = [
    "Rank",
    "Name",
    "Title",
    "Department",
    "University",
    "Email",
    "Match Score",
    "Research Areas",
    "h-index",
    "Citations",
    "Recommendation",
];

/// Export file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv",
            ExportFormat::Json => "application/json",
        }
    }
}

fn quote(cell: &str) -> String {
    format!("\"{}\"", cell.replace('"', "\"\""))
}

/// Render matches as a quoted CSV table, one row per match in rank order
pub fn export_to_csv(matches: &[MatchResult]) -> String {
    let mut lines = Vec::with_capacity(matches.len() + 1);
    lines.push(CSV_HEADERS.join(","));

    for (index, m) in matches.iter().enumerate() {
        let professor = &m.professor;
        let cells = [
            (index + 1).to_string(),
            professor.name.clone(),
            professor.title.clone(),
            professor.department.clone(),
            professor.university.clone(),
            professor.email.clone().unwrap_or_default(),
            format!("{}%", m.match_score),
            professor.research_areas.join("; "),
            professor.h_index().map(|h| h.to_string()).unwrap_or_default(),
            professor.total_citations().map(|c| c.to_string()).unwrap_or_default(),
            m.recommendation_text.clone(),
        ];
        lines.push(cells.iter().map(|c| quote(c)).collect::<Vec<_>>().join(","));
    }

    lines.join("\n")
}

/// Render matches as a pretty-printed JSON array
pub fn export_to_json(matches: &[MatchResult]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(matches)
}

pub fn export(matches: &[MatchResult], format: ExportFormat) -> Result<String, serde_json::Error> {
    match format {
        ExportFormat::Csv => Ok(export_to_csv(matches)),
        ExportFormat::Json => export_to_json(matches),
    }
}

/// Dated download filename, e.g. `profmatch-results-2024-01-15.csv`
pub fn export_filename(format: ExportFormat, date: chrono::NaiveDate) -> String {
    format!("profmatch-results-{}.{}", date.format("%Y-%m-%d"), format.extension())
}

/// Write an export into `dir` under today's dated filename
pub async fn write_export(matches: &[MatchResult], format: ExportFormat, dir: &Path) -> std::io::Result<PathBuf> {
    let content = export(matches, format)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let path = dir.join(export_filename(format, chrono::Utc::now().date_naive()));

    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(&path, content).await?;
    tracing::info!("Exported {} matches to {}", matches.len(), path.display());
    Ok(path)
}
