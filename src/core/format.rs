/// Accepted résumé MIME types: PDF, DOCX and plain text
pub const ALLOWED_FILE_TYPES: [&str; 3] = [
    "application/pdf",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "text/plain",
];

/// Default upload size limit in megabytes
pub const DEFAULT_MAX_FILE_SIZE_MB: u64 = 10;

/// Render a match score as a whole percentage, e.g. `92.5 -> "93%"`
pub fn format_match_score(score: f64) -> String {
    format!("{}%", score.round() as i64)
}

/// Compact citation count: `999`, `1.0K`, `12.3K`, `1.0M`
pub fn format_citation_count(count: u64) -> String {
    if count >= 1_000_000 {
        format!("{:.1}M", count as f64 / 1_000_000.0)
    } else if count >= 1_000 {
        format!("{:.1}K", count as f64 / 1_000.0)
    } else {
        count.to_string()
    }
}

/// Cut `text` to `max_chars` characters and append an ellipsis
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut.trim())
}

pub fn validate_file_type(content_type: &str) -> bool {
    ALLOWED_FILE_TYPES.contains(&content_type)
}

pub fn validate_file_size(size_bytes: u64, max_size_mb: u64) -> bool {
    size_bytes <= max_size_mb * 1024 * 1024
}

/// Human-readable byte size: `500 B`, `1.0 KB`, `5.5 MB`
pub fn format_file_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
