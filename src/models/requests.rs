use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Request body for `POST /api/match`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartMatchRequest {
    pub session_id: String,
    pub university: String,
    pub research_interests: Vec<String>,
    pub file_ids: Vec<String>,
}

/// Raw submission form input, validated before any request is made
#[derive(Debug, Clone, Validate)]
pub struct SubmissionForm {
    #[validate(custom(function = "validate_university_url"))]
    pub university: String,
    #[validate(custom(function = "validate_interests"))]
    pub research_interests: String,
    #[validate(length(min = 1, message = "Please upload your resume"))]
    pub files: Vec<String>,
}

impl SubmissionForm {
    /// Comma-separated interests, trimmed, empties dropped
    pub fn interests(&self) -> Vec<String> {
        split_interests(&self.research_interests)
    }
}

pub fn split_interests(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn validate_university_url(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("required").with_message("Please enter a university URL".into()));
    }

    match reqwest::Url::parse(value) {
        Ok(url) if url.scheme().starts_with("http") => Ok(()),
        _ => Err(ValidationError::new("url")
            .with_message("Please enter a valid URL (e.g., https://www.mit.edu)".into())),
    }
}

fn validate_interests(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("required")
            .with_message("Please describe your research interests".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(university: &str, interests: &str, files: &[&str]) -> SubmissionForm {
        SubmissionForm {
            university: university.to_string(),
            research_interests: interests.to_string(),
            files: files.iter().map(|f| f.to_string()).collect(),
        }
    }

    #[test]
    fn test_valid_form() {
        let f = form("https://www.mit.edu", "machine learning, vision", &["cv.pdf"]);
        assert!(f.validate().is_ok());
        assert_eq!(f.interests(), vec!["machine learning", "vision"]);
    }

    #[test]
    fn test_rejects_non_http_university() {
        let f = form("ftp://mit.edu", "ml", &["cv.pdf"]);
        let errors = f.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("university"));
    }

    #[test]
    fn test_reports_every_failing_field() {
        let f = form("", "   ", &[]);
        let errors = f.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("university"));
        assert!(fields.contains_key("research_interests"));
        assert!(fields.contains_key("files"));
    }

    #[test]
    fn test_split_interests_drops_empties() {
        assert_eq!(split_interests(" nlp,, robotics ,"), vec!["nlp", "robotics"]);
    }
}
