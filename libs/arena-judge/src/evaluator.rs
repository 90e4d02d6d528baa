/// Test Evaluator - runs a submission against every test case of a problem
///
/// **Per test case, in stored order:**
/// 1. Decode the input document and reduce it to text
/// 2. Decode the expected output and reduce it to text
/// 3. Wrap the source and execute it in the sandbox
/// 4. Normalize the actual output and compare it exactly
///
/// A bad document or a failed execution fails that case only. The one
/// exception is an unreachable sandbox backend, which aborts the whole
/// evaluation.
///
/// **Normalization Rules:**
/// - Trim leading and trailing whitespace: YES
/// - Strip NUL characters: YES
/// - Case sensitivity: YES (exact match required)
/// - Internal whitespace: preserved

use crate::engine::{ExecutionOutput, Sandbox};
use crate::error::SandboxError;
use crate::metrics;
use crate::wrapper;
use arena_common::languages::LanguageConfig;
use arena_common::types::{strip_nul, Problem, Submission, TestCase};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What happened to one test case
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseOutcome {
    Passed,
    Mismatch {
        expected: String,
        actual: String,
        exit_code: i64,
    },
    InvalidInput,
    InvalidExpected,
    ExecutionError(String),
}

impl CaseOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, CaseOutcome::Passed)
    }

    fn label(&self) -> &'static str {
        match self {
            CaseOutcome::Passed => "passed",
            CaseOutcome::Mismatch { exit_code: 0, .. } => "wrong_answer",
            CaseOutcome::Mismatch { .. } => "runtime_error",
            CaseOutcome::InvalidInput | CaseOutcome::InvalidExpected => "invalid_case",
            CaseOutcome::ExecutionError(_) => "execution_error",
        }
    }
}

/// Outcome of one test case with its 1-based position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseReport {
    pub number: usize,
    pub outcome: CaseOutcome,
}

impl fmt::Display for CaseReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.number;
        match &self.outcome {
            CaseOutcome::Passed => write!(f, "Test case {} passed.", n),
            CaseOutcome::Mismatch {
                expected,
                actual,
                exit_code: 0,
            } => write!(f, "Test case {} failed: expected `{}`, got `{}`", n, expected, actual),
            CaseOutcome::Mismatch {
                expected,
                actual,
                exit_code,
            } => write!(
                f,
                "Test case {} failed: execution error (exit status {}): expected `{}`, got `{}`",
                n, exit_code, expected, actual
            ),
            CaseOutcome::InvalidInput => write!(f, "Test case {}: invalid input format.", n),
            CaseOutcome::InvalidExpected => {
                write!(f, "Test case {}: invalid expected output format.", n)
            }
            CaseOutcome::ExecutionError(message) => {
                write!(f, "Test case {}: execution error: {}", n, message)
            }
        }
    }
}

/// Verdict for a whole submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub passed: bool,
    pub report: String,
    pub cases: Vec<CaseReport>,
}

impl Evaluation {
    fn from_cases(cases: Vec<CaseReport>) -> Self {
        let passed = cases.iter().all(|c| c.outcome.passed());
        let report = cases.iter().map(|c| format!("{}\n", c)).collect();
        Self {
            passed,
            report,
            cases,
        }
    }
}

/// Normalize output string for comparison
fn normalize_output(output: &str) -> String {
    strip_nul(output.trim())
}

/// Decode a stored JSON document and reduce it to comparison text
fn decode_document(raw: &str) -> Option<String> {
    let value: Value = serde_json::from_str(raw).ok()?;
    wrapper::reduce_value(&value).ok()
}

/// Compare one execution against the expected text
pub fn judge_output(expected: &str, execution: &ExecutionOutput) -> CaseOutcome {
    let actual = normalize_output(&execution.output);
    if actual == expected {
        CaseOutcome::Passed
    } else {
        CaseOutcome::Mismatch {
            expected: expected.to_string(),
            actual,
            exit_code: execution.exit_code,
        }
    }
}

/// Runs submissions through a sandbox, one test case at a time
pub struct Evaluator<'a> {
    sandbox: &'a dyn Sandbox,
    budget: Duration,
}

impl<'a> Evaluator<'a> {
    pub fn new(sandbox: &'a dyn Sandbox, budget: Duration) -> Self {
        Self { sandbox, budget }
    }

    /// Evaluate `submission` against all of `problem`'s test cases.
    ///
    /// Returns `Err` only for infrastructure failures that make further
    /// execution pointless.
    pub async fn evaluate(
        &self,
        submission: &Submission,
        problem: &Problem,
        language: &LanguageConfig,
    ) -> Result<Evaluation, SandboxError> {
        let function_name = wrapper::function_name_or_default(&problem.function_name);
        let mut cases = Vec::with_capacity(problem.test_cases.len());

        for (idx, test_case) in problem.test_cases.iter().enumerate() {
            let number = idx + 1;
            let outcome = self
                .run_case(submission, function_name, language, test_case)
                .await?;

            debug!(
                submission_id = submission.id,
                test_case = number,
                outcome = outcome.label(),
                "Test case evaluated"
            );
            metrics::TEST_CASES.with_label_values(&[outcome.label()]).inc();
            cases.push(CaseReport { number, outcome });
        }

        let evaluation = Evaluation::from_cases(cases);
        info!(
            submission_id = submission.id,
            test_cases = evaluation.cases.len(),
            passed = evaluation.passed,
            "Evaluation complete"
        );
        Ok(evaluation)
    }

    async fn run_case(
        &self,
        submission: &Submission,
        function_name: &str,
        language: &LanguageConfig,
        test_case: &TestCase,
    ) -> Result<CaseOutcome, SandboxError> {
        let Some(input) = decode_document(&test_case.input) else {
            return Ok(CaseOutcome::InvalidInput);
        };
        let Some(expected) = decode_document(&test_case.output) else {
            return Ok(CaseOutcome::InvalidExpected);
        };

        let program = match wrapper::wrap(language.wrapper, &submission.code, function_name, &input)
        {
            Ok(program) => program,
            Err(e) => {
                warn!(submission_id = submission.id, test_case_id = test_case.id, error = %e, "Cannot wrap test case");
                return Ok(CaseOutcome::InvalidInput);
            }
        };

        match self.sandbox.execute(language, &program, self.budget).await {
            Ok(execution) => Ok(judge_output(&expected, &execution)),
            Err(e) if e.is_infrastructure() => Err(e),
            Err(e) => Ok(CaseOutcome::ExecutionError(e.to_string())),
        }
    }
}

/// Verdict for declared languages that have no configured sandbox.
///
/// A stand-in only: it does not run the code.
pub fn placeholder_verdict(code: &str) -> (bool, &'static str) {
    if code == "pass" {
        (true, "Correct Answer")
    } else {
        (false, "Wrong Answer")
    }
}
