//! Simulated match progress for running without a backend.
//!
//! The generator advances a random accumulator every tick, maps it onto a
//! fixed list of step labels, and on reaching 100% writes a canned result
//! set to the handoff store. The canned set never depends on the submitted
//! university or interests.

use crate::core::source::{StatusSource, Tick};
use crate::models::{CitationMetrics, MatchResult, MatchResultsResponse, ProfessorProfile, Publication};
use crate::services::Handoff;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(800);

/// Pause at 100% before completion is signalled
pub const DEFAULT_COMPLETION_DELAY: Duration = Duration::from_millis(500);

/// Session id recorded for mock submissions
pub const MOCK_SESSION_ID: &str = "mock-session";

/// Match id recorded for mock submissions
pub const MOCK_MATCH_ID: &str = "mock-match";

/// Step labels shown while a match is processing, in order
pub const PROCESSING_STEPS: [&str; 5] = [
    "Retrieving faculty listings...",
    "Analyzing professor publications...",
    "Parsing your research profile...",
    "Computing research alignment...",
    "Generating recommendations...",
];

/// Map a progress value (0-100) onto one of `step_count` equal buckets
///
/// Out-of-range input is clamped, so the result is always a valid index
/// and never decreases as progress grows.
pub fn step_index(progress: f64, step_count: usize) -> usize {
    if step_count == 0 {
        return 0;
    }
    let clamped = if progress.is_nan() { 0.0 } else { progress.clamp(0.0, 100.0) };
    (((clamped / 100.0) * step_count as f64).floor() as usize).min(step_count - 1)
}

/// Label for a given progress value
pub fn step_label(progress: f64) -> &'static str {
    PROCESSING_STEPS[step_index(progress, PROCESSING_STEPS.len())]
}

/// Random-walk progress source standing in for the remote poll
pub struct MockProgressSource {
    rng: StdRng,
    progress: f64,
    interval: Duration,
    completion_delay: Duration,
    handoff: Option<Handoff>,
    started: Instant,
}

impl MockProgressSource {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic generator, for tests
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            progress: 0.0,
            interval: DEFAULT_TICK_INTERVAL,
            completion_delay: DEFAULT_COMPLETION_DELAY,
            handoff: None,
            started: Instant::now(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_completion_delay(mut self, delay: Duration) -> Self {
        self.completion_delay = delay;
        self
    }

    pub fn with_handoff(mut self, handoff: Handoff) -> Self {
        self.handoff = Some(handoff);
        self
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }
}

impl Default for MockProgressSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StatusSource for MockProgressSource {
    fn interval(&self) -> Duration {
        self.interval
    }

    fn name(&self) -> &'static str {
        "mock"
    }

    // First increment lands one tick after start
    fn tick_immediately(&self) -> bool {
        false
    }

    async fn tick(&mut self) -> Tick {
        self.progress += self.rng.gen_range(5.0..20.0);

        if self.progress < 100.0 {
            return Tick::Progress {
                progress: self.progress.floor() as u8,
                current_step: step_label(self.progress).to_string(),
            };
        }

        self.progress = 100.0;
        let results = canned_results(self.started.elapsed().as_secs_f64());

        if let Some(handoff) = &self.handoff {
            if let Err(e) = handoff.write_results(&results).await {
                tracing::warn!("Failed to persist mock results: {}", e);
            }
        }

        tracing::info!("Mock match reached 100%, {} canned matches", results.matches.len());

        Tick::Completed {
            results,
            settle: self.completion_delay,
        }
    }
}

fn publication(title: &str, authors: &[&str], year: u16, venue: &str, citations: u64) -> Publication {
    Publication {
        title: title.to_string(),
        authors: authors.iter().map(|a| a.to_string()).collect(),
        year,
        venue: venue.to_string(),
        r#abstract: None,
        citation_count: citations,
        url: None,
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[allow(clippy::too_many_arguments)]
fn professor(
    id: &str,
    name: &str,
    title: &str,
    department: &str,
    email: Option<&str>,
    research_areas: &[&str],
    publications: Vec<Publication>,
    metrics: CitationMetrics,
    last_updated: &str,
) -> ProfessorProfile {
    ProfessorProfile {
        id: id.to_string(),
        name: name.to_string(),
        title: title.to_string(),
        department: department.to_string(),
        university: "MIT".to_string(),
        email: email.map(str::to_string),
        scholar_id: None,
        research_areas: strings(research_areas),
        publications,
        citation_metrics: Some(metrics),
        last_updated: last_updated.to_string(),
    }
}

/// The fixed three-professor result set returned by mock runs
pub fn canned_results(processing_time_seconds: f64) -> MatchResultsResponse {
    let chen_transformers = publication(
        "Transformer Architectures for Medical Image Analysis",
        &["S. Chen", "J. Smith", "A. Johnson"],
        2024,
        "NeurIPS",
        45,
    );
    let roberts_llm = publication(
        "Large Language Models for Scientific Discovery",
        &["M. Roberts", "L. Zhang"],
        2024,
        "ICML",
        89,
    );

    let matches = vec![
        MatchResult {
            professor: professor(
                "1",
                "Dr. Sarah Chen",
                "Associate Professor",
                "Computer Science",
                Some("schen@mit.edu"),
                &["Machine Learning", "Computer Vision", "Deep Learning"],
                vec![
                    chen_transformers.clone(),
                    publication(
                        "Self-Supervised Learning for Radiology",
                        &["S. Chen", "M. Williams"],
                        2023,
                        "CVPR",
                        128,
                    ),
                ],
                CitationMetrics { h_index: 32, total_citations: 4520 },
                "2024-01-15",
            ),
            match_score: 92.0,
            alignment_reasons: strings(&[
                "Strong overlap in machine learning and computer vision research",
                "Recent publications align with your interest in medical imaging",
                "Active research in transformer architectures",
            ]),
            relevant_publications: vec![chen_transformers],
            shared_keywords: strings(&["machine learning", "computer vision", "transformers"]),
            recommendation_text: "Dr. Chen's research in transformer architectures for medical imaging strongly aligns with your stated interests. Her recent NeurIPS publication demonstrates cutting-edge work in this area.".to_string(),
        },
        MatchResult {
            professor: professor(
                "2",
                "Dr. Michael Roberts",
                "Professor",
                "Electrical Engineering & Computer Science",
                Some("mroberts@mit.edu"),
                &["Natural Language Processing", "Machine Learning", "AI Safety"],
                vec![roberts_llm.clone()],
                CitationMetrics { h_index: 48, total_citations: 12340 },
                "2024-01-10",
            ),
            match_score: 85.0,
            alignment_reasons: strings(&[
                "Expertise in NLP aligns with your research interests",
                "Leading researcher in machine learning applications",
            ]),
            relevant_publications: vec![roberts_llm],
            shared_keywords: strings(&["NLP", "machine learning"]),
            recommendation_text: "Dr. Roberts is a leading figure in NLP research with significant impact in the field. His work on LLMs for scientific discovery could provide excellent mentorship opportunities.".to_string(),
        },
        MatchResult {
            professor: professor(
                "3",
                "Dr. Emily Watson",
                "Assistant Professor",
                "Computer Science",
                None,
                &["Reinforcement Learning", "Robotics", "Machine Learning"],
                vec![],
                CitationMetrics { h_index: 18, total_citations: 1890 },
                "2024-01-12",
            ),
            match_score: 78.0,
            alignment_reasons: strings(&[
                "Research in reinforcement learning connects to your ML interests",
                "Active and accessible junior faculty member",
            ]),
            relevant_publications: vec![],
            shared_keywords: strings(&["machine learning", "reinforcement learning"]),
            recommendation_text: "Dr. Watson's work in reinforcement learning and robotics offers a unique angle on machine learning research. As an assistant professor, she may have more capacity for hands-on mentorship.".to_string(),
        },
    ];

    MatchResultsResponse {
        session_id: MOCK_SESSION_ID.to_string(),
        total_professors_analyzed: matches.len() as u32,
        matches,
        processing_time_seconds,
    }
}
