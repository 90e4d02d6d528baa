use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub type ProblemId = u64;
pub type SubmissionId = u64;
pub type TestCaseId = u64;

/// A coding problem together with its test cases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    pub id: ProblemId,
    pub title: String,
    pub question: String,
    pub level: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Starter code template per language name
    #[serde(default)]
    pub code_stubs: BTreeMap<String, String>,
    /// Function the evaluator calls; empty means "use the default"
    #[serde(default)]
    pub function_name: String,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
}

impl Problem {
    /// Starter code for `language`, or an empty template when none is stored.
    pub fn code_stub(&self, language: &str) -> &str {
        self.code_stubs.get(language).map(String::as_str).unwrap_or("")
    }
}

/// A single test case.
///
/// `input` and `output` hold raw JSON documents. They are only decoded when
/// the case is evaluated, so a malformed document fails that case alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub id: TestCaseId,
    pub problem_id: ProblemId,
    #[serde(rename = "type", default = "default_case_kind")]
    pub kind: String,
    pub input: String,
    pub output: String,
}

fn default_case_kind() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Pending,
    Completed,
}

impl SubmissionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SubmissionStatus::Completed)
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionStatus::Pending => write!(f, "pending"),
            SubmissionStatus::Completed => write!(f, "completed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: SubmissionId,
    pub problem_id: ProblemId,
    pub user_id: String,
    pub code: String,
    pub language: String,
    pub competition_id: String,
    pub passed: bool,
    pub output: String,
    pub status: SubmissionStatus,
    pub created_at: DateTime<Utc>,
}

impl Submission {
    /// Record the verdict and move to `Completed`.
    ///
    /// Returns `false` and leaves the record untouched when it is already
    /// completed: the verdict is write-once.
    pub fn complete(&mut self, passed: bool, output: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.passed = passed;
        self.output = strip_nul(&output.into());
        self.status = SubmissionStatus::Completed;
        true
    }
}

/// Fields supplied by the caller when a submission is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSubmission {
    pub problem_id: ProblemId,
    pub user_id: String,
    pub code: String,
    pub language: String,
    pub competition_id: String,
}

impl NewSubmission {
    pub fn into_submission(self, id: SubmissionId) -> Submission {
        Submission {
            id,
            problem_id: self.problem_id,
            user_id: self.user_id,
            code: self.code,
            language: self.language,
            competition_id: self.competition_id,
            passed: false,
            output: String::new(),
            status: SubmissionStatus::Pending,
            created_at: Utc::now(),
        }
    }
}

/// Selection used when counting submissions per user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionFilter {
    pub competition_id: String,
    pub status: Option<SubmissionStatus>,
    pub passed: Option<bool>,
}

impl SubmissionFilter {
    pub fn matches(&self, submission: &Submission) -> bool {
        submission.competition_id == self.competition_id
            && self.status.map_or(true, |s| submission.status == s)
            && self.passed.map_or(true, |p| submission.passed == p)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub user_id: String,
    pub num_solved: u64,
}

/// Remove embedded NUL characters, which storage and display layers cannot
/// round-trip.
pub fn strip_nul(text: &str) -> String {
    text.replace('\0', "")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> Submission {
        NewSubmission {
            problem_id: 1,
            user_id: "alice".to_string(),
            code: "pass".to_string(),
            language: "python".to_string(),
            competition_id: "comp1".to_string(),
        }
        .into_submission(7)
    }

    #[test]
    fn test_new_submission_starts_pending() {
        let sub = pending();
        assert_eq!(sub.id, 7);
        assert_eq!(sub.status, SubmissionStatus::Pending);
        assert!(!sub.passed);
        assert!(sub.output.is_empty());
    }

    #[test]
    fn test_complete_is_write_once() {
        let mut sub = pending();
        assert!(sub.complete(true, "Test case 1 passed.\n"));
        assert!(!sub.complete(false, "overwritten"));
        assert_eq!(sub.status, SubmissionStatus::Completed);
        assert!(sub.passed);
        assert_eq!(sub.output, "Test case 1 passed.\n");
    }

    #[test]
    fn test_complete_strips_nul() {
        let mut sub = pending();
        sub.complete(false, "bad\0output");
        assert_eq!(sub.output, "badoutput");
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&SubmissionStatus::Pending).unwrap(),
            "\"pending\""
        );
        assert_eq!(SubmissionStatus::Completed.to_string(), "completed");
    }

    #[test]
    fn test_filter_matches() {
        let mut sub = pending();
        let filter = SubmissionFilter {
            competition_id: "comp1".to_string(),
            status: Some(SubmissionStatus::Completed),
            passed: Some(true),
        };
        assert!(!filter.matches(&sub));
        sub.complete(true, "");
        assert!(filter.matches(&sub));
        sub.competition_id = "other".to_string();
        assert!(!filter.matches(&sub));
    }

    #[test]
    fn test_test_case_kind_defaults() {
        let tc: TestCase =
            serde_json::from_str(r#"{"id":1,"problemId":2,"input":"1","output":"2"}"#).unwrap();
        assert_eq!(tc.kind, "default");
    }
}
