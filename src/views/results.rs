use crate::core::format::{format_citation_count, format_match_score, truncate_text};
use crate::models::{MatchResult, MatchResultsResponse};
use crate::services::Handoff;
use crate::views::Route;
use std::fmt::Write;

/// Characters of the recommendation shown on a match card
const RECOMMENDATION_PREVIEW: usize = 200;

/// Shared keywords shown per card
const KEYWORD_PREVIEW: usize = 5;

/// What the results view shows
#[derive(Debug, Clone, PartialEq)]
pub enum ResultsView {
    /// No result set in the handoff
    Redirect(Route),

    /// A result set with no matches: "No Results Found"
    Empty,

    Matches(MatchResultsResponse),
}

/// Read the result set from the handoff
pub async fn load(handoff: &Handoff) -> ResultsView {
    match handoff.read_results().await {
        None => {
            tracing::info!("No results found, redirecting to {}", Route::Submit);
            ResultsView::Redirect(Route::Submit)
        }
        Some(results) if results.matches.is_empty() => ResultsView::Empty,
        Some(results) => ResultsView::Matches(results),
    }
}

/// Plain-text rendering of the ranked matches
pub fn render(results: &MatchResultsResponse) -> String {
    let mut out = String::new();
    let count = results.matches.len();

    let _ = writeln!(out, "Your Top Matches");
    let _ = writeln!(
        out,
        "Found {} matching professor{} ({} analyzed in {:.1}s)",
        count,
        if count == 1 { "" } else { "s" },
        results.total_professors_analyzed,
        results.processing_time_seconds
    );

    for (index, m) in results.matches.iter().enumerate() {
        out.push('\n');
        render_card(&mut out, index + 1, m);
    }

    out
}

fn render_card(out: &mut String, rank: usize, m: &MatchResult) {
    let p = &m.professor;

    let _ = writeln!(out, "#{} {} ({})", rank, p.name, format_match_score(m.match_score));
    let _ = writeln!(out, "   {}, {}, {}", p.title, p.department, p.university);

    if let Some(metrics) = &p.citation_metrics {
        let _ = writeln!(
            out,
            "   h-index {} | {} citations",
            metrics.h_index,
            format_citation_count(metrics.total_citations)
        );
    }
    if let Some(email) = &p.email {
        let _ = writeln!(out, "   {}", email);
    }
    if !m.shared_keywords.is_empty() {
        let keywords: Vec<&str> = m.shared_keywords.iter().take(KEYWORD_PREVIEW).map(String::as_str).collect();
        let _ = writeln!(out, "   Shared: {}", keywords.join(", "));
    }
    let _ = writeln!(out, "   {}", truncate_text(&m.recommendation_text, RECOMMENDATION_PREVIEW));
}
