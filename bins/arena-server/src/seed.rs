// Sample problems for an empty store

use anyhow::{Context, Result};
use arena_common::store::SubmissionStore;
use arena_common::types::{Problem, TestCase};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::info;

fn stubs(python: &str, javascript: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("python".to_string(), python.to_string()),
        ("javascript".to_string(), javascript.to_string()),
    ])
}

fn test_case(input: serde_json::Value, output: serde_json::Value) -> TestCase {
    TestCase {
        id: 0,
        problem_id: 0,
        kind: "default".to_string(),
        input: input.to_string(),
        output: output.to_string(),
    }
}

pub fn sample_problems() -> Vec<Problem> {
    vec![
        Problem {
            id: 0,
            title: "Two Sum".to_string(),
            question: "Given an array of integers, return indices of the two numbers such that they add up to a specific target.".to_string(),
            level: "Easy".to_string(),
            tags: vec!["array".to_string(), "hash-table".to_string()],
            code_stubs: stubs(
                "def twoSum(nums, target):\n    pass",
                "function twoSum(nums, target) {\n}",
            ),
            function_name: "twoSum".to_string(),
            test_cases: vec![test_case(
                json!({ "nums": [2, 7, 11, 15], "target": 9 }),
                json!([0, 1]),
            )],
        },
        Problem {
            id: 0,
            title: "Reverse String".to_string(),
            question: "Write a function that reverses a string.".to_string(),
            level: "Easy".to_string(),
            tags: vec!["string".to_string(), "two-pointers".to_string()],
            code_stubs: stubs(
                "def reverseString(s):\n    pass",
                "function reverseString(s) {\n}",
            ),
            function_name: "reverseString".to_string(),
            test_cases: vec![test_case(json!("hello"), json!("olleh"))],
        },
    ]
}

/// Create the sample problems unless the store already holds problems.
/// Returns how many were created.
pub async fn seed_problems(store: &dyn SubmissionStore) -> Result<usize> {
    let existing = store
        .list_problems(0, 1)
        .await
        .context("Failed to check for existing problems")?;
    if !existing.is_empty() {
        return Ok(0);
    }

    let mut created = 0;
    for problem in sample_problems() {
        let stored = store
            .create_problem(problem)
            .await
            .context("Failed to create sample problem")?;
        info!(problem_id = stored.id, title = %stored.title, "Seeded problem");
        created += 1;
    }
    Ok(created)
}
