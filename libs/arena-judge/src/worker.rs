/// Submission Worker - drains the queue and owns the submission lifecycle
///
/// **State machine:**
/// `pending` -> `completed`, written exactly once by the worker that
/// dequeued the id. There is no persisted `running` state.
///
/// **Failure handling:**
/// - Unknown submission id: skipped
/// - Already completed: skipped, never evaluated twice
/// - Problem cannot be loaded / sandbox backend unreachable: completed,
///   `passed = false`, single diagnostic line
/// - Write-back fails: logged, record stays pending, worker moves on
///
/// Nothing that happens to one submission stops the loop.

use crate::engine::Sandbox;
use crate::evaluator::{placeholder_verdict, Evaluator};
use crate::metrics;
use crate::queue::SubmissionQueue;
use anyhow::{Context, Result};
use arena_common::languages::LanguageConfigManager;
use arena_common::store::SubmissionStore;
use arena_common::types::{Submission, SubmissionId};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

pub const PROBLEM_LOAD_ERROR: &str = "Error loading problem";

#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    /// Budget for each test case execution
    pub execution_timeout: Duration,
    /// Pause before each evaluation
    pub evaluation_delay: Duration,
}

/// What a worker did with one dequeued id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Processed {
    Completed { passed: bool },
    NotFound,
    AlreadyCompleted,
}

#[derive(Clone)]
pub struct Worker {
    id: usize,
    store: Arc<dyn SubmissionStore>,
    sandbox: Arc<dyn Sandbox>,
    languages: Arc<LanguageConfigManager>,
    settings: WorkerSettings,
}

impl Worker {
    pub fn new(
        id: usize,
        store: Arc<dyn SubmissionStore>,
        sandbox: Arc<dyn Sandbox>,
        languages: Arc<LanguageConfigManager>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            id,
            store,
            sandbox,
            languages,
            settings,
        }
    }

    /// Consume ids until the queue is closed and empty
    #[instrument(skip_all, fields(worker = self.id))]
    pub async fn run(self, queue: SubmissionQueue) {
        info!("Worker started");

        while let Some(submission_id) = queue.dequeue().await {
            debug!(submission_id, "Dequeued submission");

            // Separate task so a panic costs one submission, not the worker
            let worker = self.clone();
            let handle = tokio::spawn(async move { worker.process(submission_id).await });

            match handle.await {
                Ok(Ok(Processed::Completed { passed })) => {
                    info!(submission_id, passed, "Submission completed");
                }
                Ok(Ok(Processed::NotFound)) => {
                    warn!(submission_id, "Submission not found, skipped");
                }
                Ok(Ok(Processed::AlreadyCompleted)) => {
                    warn!(submission_id, "Submission already completed, skipped");
                }
                Ok(Err(e)) => {
                    error!(submission_id, error = %format!("{:#}", e), "Submission left pending");
                }
                Err(e) => {
                    error!(submission_id, error = %e, "Submission task crashed, left pending");
                }
            }
        }

        info!("Queue closed, worker stopped");
    }

    /// Evaluate one submission and persist its terminal state
    pub async fn process(&self, submission_id: SubmissionId) -> Result<Processed> {
        if !self.settings.evaluation_delay.is_zero() {
            tokio::time::sleep(self.settings.evaluation_delay).await;
        }

        let Some(mut submission) = self
            .store
            .get_submission(submission_id)
            .await
            .context("Failed to load submission")?
        else {
            return Ok(Processed::NotFound);
        };

        if submission.status.is_terminal() {
            return Ok(Processed::AlreadyCompleted);
        }

        let (passed, output) = self.judge(&submission).await;
        submission.complete(passed, output);

        self.store
            .save_submission(&submission)
            .await
            .context("Failed to save submission result")?;

        let verdict = if passed { "passed" } else { "failed" };
        metrics::SUBMISSIONS_COMPLETED.with_label_values(&[verdict]).inc();
        Ok(Processed::Completed { passed })
    }

    /// Verdict and output text for a pending submission
    async fn judge(&self, submission: &Submission) -> (bool, String) {
        let Some(language) = self.languages.get(&submission.language) else {
            debug!(
                submission_id = submission.id,
                language = %submission.language,
                "Language not configured, using placeholder verdict"
            );
            let (passed, output) = placeholder_verdict(&submission.code);
            return (passed, output.to_string());
        };

        let problem = match self.store.get_problem(submission.problem_id, true).await {
            Ok(Some(problem)) => problem,
            Ok(None) => {
                warn!(submission_id = submission.id, problem_id = submission.problem_id, "Problem not found");
                return (false, PROBLEM_LOAD_ERROR.to_string());
            }
            Err(e) => {
                error!(submission_id = submission.id, problem_id = submission.problem_id, error = %e, "Failed to load problem");
                return (false, PROBLEM_LOAD_ERROR.to_string());
            }
        };

        info!(
            submission_id = submission.id,
            problem_id = problem.id,
            language = %language.name,
            test_cases = problem.test_cases.len(),
            source_size = submission.code.len(),
            "Evaluating submission"
        );

        let evaluator = Evaluator::new(self.sandbox.as_ref(), self.settings.execution_timeout);
        match evaluator.evaluate(submission, &problem, language).await {
            Ok(evaluation) => (evaluation.passed, evaluation.report),
            Err(e) => {
                error!(submission_id = submission.id, error = %e, "Evaluation aborted");
                (false, format!("Evaluation aborted: {}", e))
            }
        }
    }
}

/// Start `count` workers sharing one queue
pub fn spawn_pool(
    count: usize,
    queue: &SubmissionQueue,
    store: Arc<dyn SubmissionStore>,
    sandbox: Arc<dyn Sandbox>,
    languages: Arc<LanguageConfigManager>,
    settings: WorkerSettings,
) -> Vec<JoinHandle<()>> {
    (0..count.max(1))
        .map(|id| {
            let worker = Worker::new(
                id,
                store.clone(),
                sandbox.clone(),
                languages.clone(),
                settings,
            );
            tokio::spawn(worker.run(queue.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SandboxError;
    use crate::engine::ExecutionOutput;
    use crate::testing::{new_submission, python_language, stdout, two_sum_problem, ScriptedSandbox};
    use arena_common::store::MemoryStore;
    use arena_common::types::{
        NewSubmission, Problem, ProblemId, SubmissionFilter, SubmissionStatus,
    };
    use async_trait::async_trait;
    use std::collections::HashMap;

    const SETTINGS: WorkerSettings = WorkerSettings {
        execution_timeout: Duration::from_secs(1),
        evaluation_delay: Duration::ZERO,
    };

    struct Fixture {
        store: Arc<MemoryStore>,
        sandbox: Arc<ScriptedSandbox>,
        worker: Worker,
    }

    async fn fixture(script: Vec<Result<ExecutionOutput, SandboxError>>) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        store.create_problem(two_sum_problem()).await.unwrap();

        let sandbox = Arc::new(ScriptedSandbox::new(script));
        let languages = Arc::new(LanguageConfigManager::from_configs([python_language()]));
        let worker = Worker::new(0, store.clone(), sandbox.clone(), languages, SETTINGS);
        Fixture {
            store,
            sandbox,
            worker,
        }
    }

    async fn reload(store: &MemoryStore, id: SubmissionId) -> Submission {
        store.get_submission(id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_two_sum_passes() {
        let f = fixture(vec![stdout("[0,1]\n")]).await;
        let id = f
            .store
            .create_submission(new_submission("alice", "def twoSum(s):\n    return [0, 1]", "python"))
            .await
            .unwrap();

        let processed = f.worker.process(id).await.unwrap();
        assert_eq!(processed, Processed::Completed { passed: true });

        let sub = reload(&f.store, id).await;
        assert_eq!(sub.status, SubmissionStatus::Completed);
        assert!(sub.passed);
        assert_eq!(sub.output, "Test case 1 passed.\n");
    }

    #[tokio::test]
    async fn test_two_sum_wrong_order_fails() {
        let f = fixture(vec![stdout("[1,0]")]).await;
        let id = f
            .store
            .create_submission(new_submission("alice", "def twoSum(s):\n    return [1, 0]", "python"))
            .await
            .unwrap();

        f.worker.process(id).await.unwrap();
        let sub = reload(&f.store, id).await;
        assert_eq!(sub.status, SubmissionStatus::Completed);
        assert!(!sub.passed);
        assert!(sub.output.contains("expected `[0,1]`, got `[1,0]`"));
    }

    #[tokio::test]
    async fn test_raising_code_completes_failed() {
        let f = fixture(vec![Ok(ExecutionOutput {
            output: "Traceback (most recent call last):\nRuntimeError: nope\n".to_string(),
            exit_code: 1,
            execution_time_ms: 3,
        })])
        .await;
        let id = f
            .store
            .create_submission(new_submission("alice", "def twoSum(s):\n    raise RuntimeError('nope')", "python"))
            .await
            .unwrap();

        f.worker.process(id).await.unwrap();
        let sub = reload(&f.store, id).await;
        assert_eq!(sub.status, SubmissionStatus::Completed);
        assert!(!sub.passed);
        assert!(sub.output.contains("execution error"));
    }

    #[tokio::test]
    async fn test_missing_problem_is_diagnosed() {
        let f = fixture(vec![]).await;
        let mut fields = new_submission("alice", "code", "python");
        fields.problem_id = 99;
        let id = f.store.create_submission(fields).await.unwrap();

        f.worker.process(id).await.unwrap();
        let sub = reload(&f.store, id).await;
        assert_eq!(sub.status, SubmissionStatus::Completed);
        assert!(!sub.passed);
        assert_eq!(sub.output, PROBLEM_LOAD_ERROR);
        assert_eq!(f.sandbox.calls(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_sandbox_completes_with_diagnostic() {
        let f = fixture(vec![Err(SandboxError::Unavailable("connection refused".to_string()))]).await;
        let id = f
            .store
            .create_submission(new_submission("alice", "code", "python"))
            .await
            .unwrap();

        f.worker.process(id).await.unwrap();
        let sub = reload(&f.store, id).await;
        assert_eq!(sub.status, SubmissionStatus::Completed);
        assert!(!sub.passed);
        assert_eq!(
            sub.output,
            "Evaluation aborted: sandbox backend unavailable: connection refused"
        );
    }

    #[tokio::test]
    async fn test_unconfigured_language_uses_placeholder() {
        let f = fixture(vec![]).await;
        let pass = f
            .store
            .create_submission(new_submission("alice", "pass", "javascript"))
            .await
            .unwrap();
        let other = f
            .store
            .create_submission(new_submission("alice", "return 1", "javascript"))
            .await
            .unwrap();

        f.worker.process(pass).await.unwrap();
        f.worker.process(other).await.unwrap();

        let pass = reload(&f.store, pass).await;
        assert!(pass.passed);
        assert_eq!(pass.output, "Correct Answer");
        let other = reload(&f.store, other).await;
        assert!(!other.passed);
        assert_eq!(other.output, "Wrong Answer");
        assert_eq!(f.sandbox.calls(), 0);
    }

    #[tokio::test]
    async fn test_completed_submission_is_not_reevaluated() {
        let f = fixture(vec![stdout("[0,1]"), stdout("[1,0]")]).await;
        let id = f
            .store
            .create_submission(new_submission("alice", "code", "python"))
            .await
            .unwrap();

        assert_eq!(f.worker.process(id).await.unwrap(), Processed::Completed { passed: true });
        assert_eq!(f.worker.process(id).await.unwrap(), Processed::AlreadyCompleted);

        let sub = reload(&f.store, id).await;
        assert!(sub.passed);
        assert_eq!(f.sandbox.calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_submission_is_skipped() {
        let f = fixture(vec![]).await;
        assert_eq!(f.worker.process(12345).await.unwrap(), Processed::NotFound);
    }

    #[tokio::test]
    async fn test_run_drains_queue_and_stops_when_closed() {
        let f = fixture(vec![stdout("[0,1]"), stdout("[1,0]")]).await;
        let queue = SubmissionQueue::bounded(8);

        let first = f
            .store
            .create_submission(new_submission("alice", "code", "python"))
            .await
            .unwrap();
        let second = f
            .store
            .create_submission(new_submission("bob", "code", "python"))
            .await
            .unwrap();

        queue.enqueue(first).await.unwrap();
        queue.enqueue(777).await.unwrap(); // unknown id must not stop the loop
        queue.enqueue(second).await.unwrap();
        queue.close();

        tokio::time::timeout(Duration::from_secs(5), f.worker.clone().run(queue))
            .await
            .expect("worker stops once the queue is closed and drained");

        assert!(reload(&f.store, first).await.passed);
        let second = reload(&f.store, second).await;
        assert_eq!(second.status, SubmissionStatus::Completed);
        assert!(!second.passed);
    }

    /// Store whose write-back always fails
    struct ReadOnlyStore(MemoryStore);

    #[async_trait]
    impl SubmissionStore for ReadOnlyStore {
        async fn create_submission(&self, fields: NewSubmission) -> Result<SubmissionId> {
            self.0.create_submission(fields).await
        }
        async fn get_submission(&self, id: SubmissionId) -> Result<Option<Submission>> {
            self.0.get_submission(id).await
        }
        async fn save_submission(&self, _submission: &Submission) -> Result<()> {
            anyhow::bail!("disk full")
        }
        async fn get_problem(&self, id: ProblemId, with_test_cases: bool) -> Result<Option<Problem>> {
            self.0.get_problem(id, with_test_cases).await
        }
        async fn list_problems(&self, offset: usize, limit: usize) -> Result<Vec<Problem>> {
            self.0.list_problems(offset, limit).await
        }
        async fn create_problem(&self, problem: Problem) -> Result<Problem> {
            self.0.create_problem(problem).await
        }
        async fn count_submissions(&self, filter: &SubmissionFilter) -> Result<HashMap<String, u64>> {
            self.0.count_submissions(filter).await
        }
    }

    #[tokio::test]
    async fn test_failed_write_back_leaves_pending_and_continues() {
        let store = Arc::new(ReadOnlyStore(MemoryStore::new()));
        store.create_problem(two_sum_problem()).await.unwrap();
        let a = store.create_submission(new_submission("a", "code", "python")).await.unwrap();
        let b = store.create_submission(new_submission("b", "code", "python")).await.unwrap();

        let script = (0..3).map(|_| stdout("[0,1]")).collect();
        let sandbox = Arc::new(ScriptedSandbox::new(script));
        let languages = Arc::new(LanguageConfigManager::from_configs([python_language()]));
        let worker = Worker::new(0, store.clone(), sandbox.clone(), languages, SETTINGS);

        assert!(worker.process(a).await.is_err());

        let queue = SubmissionQueue::bounded(4);
        queue.enqueue(a).await.unwrap();
        queue.enqueue(b).await.unwrap();
        queue.close();
        worker.run(queue).await;

        // Every attempt ran, nothing was persisted
        assert_eq!(sandbox.calls(), 3);
        for id in [a, b] {
            let sub = store.get_submission(id).await.unwrap().unwrap();
            assert_eq!(sub.status, SubmissionStatus::Pending);
        }
    }

    #[tokio::test]
    async fn test_pool_processes_everything() {
        let store = Arc::new(MemoryStore::new());
        store.create_problem(two_sum_problem()).await.unwrap();
        let script = (0..6).map(|_| stdout("[0,1]")).collect();
        let sandbox = Arc::new(ScriptedSandbox::new(script));
        let languages = Arc::new(LanguageConfigManager::from_configs([python_language()]));
        let queue = SubmissionQueue::bounded(2);

        let handles = spawn_pool(3, &queue, store.clone(), sandbox, languages, SETTINGS);

        let mut ids = Vec::new();
        for n in 0..6 {
            let id = store
                .create_submission(new_submission(&format!("user{}", n), "code", "python"))
                .await
                .unwrap();
            queue.enqueue(id).await.unwrap();
            ids.push(id);
        }
        queue.close();
        for handle in handles {
            handle.await.unwrap();
        }

        for id in ids {
            let sub = store.get_submission(id).await.unwrap().unwrap();
            assert_eq!(sub.status, SubmissionStatus::Completed);
            assert!(sub.passed);
        }
    }
}
