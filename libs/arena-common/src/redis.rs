use crate::store::SubmissionStore;
use crate::types::{
    NewSubmission, Problem, ProblemId, Submission, SubmissionFilter, SubmissionId,
};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use tracing::debug;

/// Redis key layout - the API side and the worker side must agree on these,
/// so every key is built here and nowhere else.

pub const KEY_PREFIX: &str = "arena";

pub fn problem_key(id: ProblemId) -> String {
    format!("{}:problem:{}", KEY_PREFIX, id)
}

pub fn test_cases_key(problem_id: ProblemId) -> String {
    format!("{}:problem:{}:test_cases", KEY_PREFIX, problem_id)
}

/// Sorted set of problem ids, scored by id
pub fn problem_index_key() -> String {
    format!("{}:problems", KEY_PREFIX)
}

pub fn submission_key(id: SubmissionId) -> String {
    format!("{}:submission:{}", KEY_PREFIX, id)
}

/// Set of submission ids belonging to a competition
pub fn competition_key(competition_id: &str) -> String {
    format!("{}:competition:{}:submissions", KEY_PREFIX, competition_id)
}

pub fn counter_key(entity: &str) -> String {
    format!("{}:next:{}", KEY_PREFIX, entity)
}

/// Inclusive ZRANGE indices for a page, or `None` when the page is
/// necessarily empty
fn zrange_bounds(offset: usize, limit: usize) -> Option<(isize, isize)> {
    let max = isize::MAX as usize;
    if limit == 0 || offset > max {
        return None;
    }
    let stop = offset.saturating_add(limit - 1).min(max);
    Some((offset as isize, stop as isize))
}

/// Persistence gateway backed by Redis
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Invalid Redis URL")?;
        let conn = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;
        Ok(Self::new(conn))
    }

    async fn next_id(&self, entity: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let id: u64 = conn.incr(counter_key(entity), 1).await?;
        Ok(id)
    }

    async fn load_submissions(&self, ids: &[SubmissionId]) -> Result<Vec<Submission>> {
        let mut submissions = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(sub) = self.get_submission(*id).await? {
                submissions.push(sub);
            }
        }
        Ok(submissions)
    }
}

#[async_trait]
impl SubmissionStore for RedisStore {
    async fn create_submission(&self, fields: NewSubmission) -> Result<SubmissionId> {
        let id = self.next_id("submission").await?;
        let submission = fields.into_submission(id);
        let payload = serde_json::to_string(&submission)?;

        let mut conn = self.conn.clone();
        let _: () = conn.set(submission_key(id), payload).await?;
        let _: () = conn
            .sadd(competition_key(&submission.competition_id), id)
            .await?;
        debug!(submission_id = id, "Submission stored");
        Ok(id)
    }

    async fn get_submission(&self, id: SubmissionId) -> Result<Option<Submission>> {
        let mut conn = self.conn.clone();
        let payload: Option<String> = conn.get(submission_key(id)).await?;
        payload
            .map(|data| serde_json::from_str(&data).context("Corrupt submission record"))
            .transpose()
    }

    async fn save_submission(&self, submission: &Submission) -> Result<()> {
        let key = submission_key(submission.id);
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(&key).await?;
        if !exists {
            bail!("Submission {} does not exist", submission.id);
        }
        let payload = serde_json::to_string(submission)?;
        let _: () = conn.set(key, payload).await?;
        debug!(submission_id = submission.id, status = %submission.status, "Submission saved");
        Ok(())
    }

    async fn get_problem(&self, id: ProblemId, with_test_cases: bool) -> Result<Option<Problem>> {
        let mut conn = self.conn.clone();
        let payload: Option<String> = conn.get(problem_key(id)).await?;
        let Some(data) = payload else {
            return Ok(None);
        };
        let mut problem: Problem =
            serde_json::from_str(&data).context("Corrupt problem record")?;

        if with_test_cases {
            let cases: Option<String> = conn.get(test_cases_key(id)).await?;
            problem.test_cases = match cases {
                Some(data) => serde_json::from_str(&data).context("Corrupt test case list")?,
                None => Vec::new(),
            };
        }
        Ok(Some(problem))
    }

    async fn list_problems(&self, offset: usize, limit: usize) -> Result<Vec<Problem>> {
        let Some((start, stop)) = zrange_bounds(offset, limit) else {
            return Ok(Vec::new());
        };
        let mut conn = self.conn.clone();
        let ids: Vec<ProblemId> = conn.zrange(problem_index_key(), start, stop).await?;

        let mut problems = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(problem) = self.get_problem(id, false).await? {
                problems.push(problem);
            }
        }
        Ok(problems)
    }

    async fn create_problem(&self, mut problem: Problem) -> Result<Problem> {
        problem.id = self.next_id("problem").await?;
        for tc in &mut problem.test_cases {
            tc.id = self.next_id("test_case").await?;
            tc.problem_id = problem.id;
        }

        let cases_payload = serde_json::to_string(&problem.test_cases)?;
        let header = Problem {
            test_cases: Vec::new(),
            ..problem.clone()
        };
        let payload = serde_json::to_string(&header)?;

        let mut conn = self.conn.clone();
        let _: () = conn.set(test_cases_key(problem.id), cases_payload).await?;
        let _: () = conn.set(problem_key(problem.id), payload).await?;
        let _: () = conn
            .zadd(problem_index_key(), problem.id, problem.id as f64)
            .await?;
        Ok(problem)
    }

    async fn count_submissions(&self, filter: &SubmissionFilter) -> Result<HashMap<String, u64>> {
        let mut conn = self.conn.clone();
        let ids: Vec<SubmissionId> = conn.smembers(competition_key(&filter.competition_id)).await?;

        let mut counts = HashMap::new();
        for sub in self.load_submissions(&ids).await? {
            if filter.matches(&sub) {
                *counts.entry(sub.user_id).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }
}
