// Test doubles shared by the unit tests of this crate
use crate::engine::{ExecutionOutput, Sandbox};
use crate::error::SandboxError;
use arena_common::languages::{LanguageConfig, WrapperKind};
use arena_common::types::{NewSubmission, Problem, Submission, TestCase};
use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// Sandbox that replays a fixed list of results and records every program
pub struct ScriptedSandbox {
    script: Mutex<VecDeque<Result<ExecutionOutput, SandboxError>>>,
    programs: Mutex<Vec<String>>,
}

impl ScriptedSandbox {
    pub fn new(script: Vec<Result<ExecutionOutput, SandboxError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            programs: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.programs.lock().unwrap().len()
    }

    pub fn programs(&self) -> Vec<String> {
        self.programs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sandbox for ScriptedSandbox {
    async fn execute(
        &self,
        _language: &LanguageConfig,
        program: &str,
        _budget: Duration,
    ) -> Result<ExecutionOutput, SandboxError> {
        self.programs.lock().unwrap().push(program.to_string());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(SandboxError::Provisioning("script exhausted".to_string())))
    }
}

pub fn stdout(text: &str) -> Result<ExecutionOutput, SandboxError> {
    Ok(ExecutionOutput {
        output: text.to_string(),
        exit_code: 0,
        execution_time_ms: 1,
    })
}

pub fn python_language() -> LanguageConfig {
    LanguageConfig {
        name: "python".to_string(),
        version: "3.8".to_string(),
        image: "python:3.8-slim".to_string(),
        interpreter: vec!["python3".to_string(), "-c".to_string()],
        wrapper: WrapperKind::Python,
        memory_limit_mb: None,
        cpu_limit: None,
    }
}

pub fn two_sum_problem() -> Problem {
    Problem {
        id: 1,
        title: "Two Sum".to_string(),
        question: "Return indices of the two numbers that add up to target.".to_string(),
        level: "Easy".to_string(),
        tags: vec!["array".to_string(), "hash-table".to_string()],
        code_stubs: BTreeMap::from([(
            "python".to_string(),
            "def twoSum(nums, target):\n    pass".to_string(),
        )]),
        function_name: "twoSum".to_string(),
        test_cases: vec![TestCase {
            id: 1,
            problem_id: 1,
            kind: "default".to_string(),
            input: r#"{"nums":[2,7,11,15],"target":9}"#.to_string(),
            output: "[0,1]".to_string(),
        }],
    }
}

pub fn new_submission(user: &str, code: &str, language: &str) -> NewSubmission {
    NewSubmission {
        problem_id: 1,
        user_id: user.to_string(),
        code: code.to_string(),
        language: language.to_string(),
        competition_id: "comp1".to_string(),
    }
}

pub fn submission_with_code(code: &str) -> Submission {
    new_submission("alice", code, "python").into_submission(1)
}
