//! Persistence gateway.
//!
//! The judge core only ever talks to storage through [`SubmissionStore`].
//! Two backends exist: [`MemoryStore`] for tests and single-process runs,
//! and [`crate::redis::RedisStore`] for a shared store.

use crate::types::{
    NewSubmission, Problem, ProblemId, Submission, SubmissionFilter, SubmissionId,
};
use anyhow::{Result, bail};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Persist a new pending submission and return its identifier.
    async fn create_submission(&self, fields: NewSubmission) -> Result<SubmissionId>;

    async fn get_submission(&self, id: SubmissionId) -> Result<Option<Submission>>;

    /// Overwrite the stored record with the same identifier.
    async fn save_submission(&self, submission: &Submission) -> Result<()>;

    /// Load a problem; test cases are only attached when asked for.
    async fn get_problem(&self, id: ProblemId, with_test_cases: bool) -> Result<Option<Problem>>;

    /// Problems ordered by identifier, without their test cases.
    async fn list_problems(&self, offset: usize, limit: usize) -> Result<Vec<Problem>>;

    /// Store a problem with its test cases. Identifiers are assigned by the
    /// store; the returned value carries them.
    async fn create_problem(&self, problem: Problem) -> Result<Problem>;

    /// Number of submissions matching `filter`, grouped by user id.
    async fn count_submissions(&self, filter: &SubmissionFilter) -> Result<HashMap<String, u64>>;
}

#[derive(Default)]
struct MemoryState {
    problems: BTreeMap<ProblemId, Problem>,
    submissions: BTreeMap<SubmissionId, Submission>,
    next_problem_id: u64,
    next_test_case_id: u64,
    next_submission_id: u64,
}

/// Process-local store
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubmissionStore for MemoryStore {
    async fn create_submission(&self, fields: NewSubmission) -> Result<SubmissionId> {
        let mut state = self.state.write().await;
        state.next_submission_id += 1;
        let id = state.next_submission_id;
        state.submissions.insert(id, fields.into_submission(id));
        Ok(id)
    }

    async fn get_submission(&self, id: SubmissionId) -> Result<Option<Submission>> {
        Ok(self.state.read().await.submissions.get(&id).cloned())
    }

    async fn save_submission(&self, submission: &Submission) -> Result<()> {
        let mut state = self.state.write().await;
        match state.submissions.get_mut(&submission.id) {
            Some(slot) => {
                *slot = submission.clone();
                Ok(())
            }
            None => bail!("Submission {} does not exist", submission.id),
        }
    }

    async fn get_problem(&self, id: ProblemId, with_test_cases: bool) -> Result<Option<Problem>> {
        let state = self.state.read().await;
        Ok(state.problems.get(&id).map(|p| {
            let mut problem = p.clone();
            if !with_test_cases {
                problem.test_cases.clear();
            }
            problem
        }))
    }

    async fn list_problems(&self, offset: usize, limit: usize) -> Result<Vec<Problem>> {
        let state = self.state.read().await;
        Ok(state
            .problems
            .values()
            .skip(offset)
            .take(limit)
            .map(|p| Problem {
                test_cases: Vec::new(),
                ..p.clone()
            })
            .collect())
    }

    async fn create_problem(&self, mut problem: Problem) -> Result<Problem> {
        let mut state = self.state.write().await;
        state.next_problem_id += 1;
        problem.id = state.next_problem_id;
        for tc in &mut problem.test_cases {
            state.next_test_case_id += 1;
            tc.id = state.next_test_case_id;
            tc.problem_id = problem.id;
        }
        state.problems.insert(problem.id, problem.clone());
        Ok(problem)
    }

    async fn count_submissions(&self, filter: &SubmissionFilter) -> Result<HashMap<String, u64>> {
        let state = self.state.read().await;
        let mut counts = HashMap::new();
        for sub in state.submissions.values().filter(|s| filter.matches(s)) {
            *counts.entry(sub.user_id.clone()).or_insert(0) += 1;
        }
        Ok(counts)
    }
}
