/// Code Wrapper - turns submitted source into a runnable program
///
/// **Contract:**
/// The generated program defines the submitted source in its own namespace,
/// calls the target function with the test input text as its only argument,
/// and writes nothing to stdout except the function's return value.
///
/// **Value protocol (both directions):**
/// - Plain strings travel as-is
/// - Every other value travels as compact JSON with sorted keys and raw
///   UTF-8, the same form `reduce_value` produces for expected outputs
///
/// The wrapper does not escape or sanitize the source beyond carrying it
/// base64-encoded. Isolation is entirely the sandbox's job.

use crate::error::WrapError;
use arena_common::languages::WrapperKind;
use base64::{Engine as _, engine::general_purpose};
use serde_json::Value;

/// Called when a problem does not name its function
pub const DEFAULT_FUNCTION_NAME: &str = "solve";

pub fn function_name_or_default(name: &str) -> &str {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        DEFAULT_FUNCTION_NAME
    } else {
        trimmed
    }
}

/// Reduce a structured value to the text used for execution and comparison.
///
/// Strings pass through unchanged; anything else becomes compact JSON.
pub fn reduce_value(value: &Value) -> Result<String, WrapError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        other => Ok(serde_json::to_string(other)?),
    }
}

/// Build the program text for one test case.
pub fn wrap(
    kind: WrapperKind,
    source: &str,
    function_name: &str,
    input: &str,
) -> Result<String, WrapError> {
    match kind {
        WrapperKind::Python => wrap_python(source, function_name_or_default(function_name), input),
    }
}

fn wrap_python(source: &str, function_name: &str, input: &str) -> Result<String, WrapError> {
    let encoded_source = general_purpose::STANDARD.encode(source);
    // JSON string literals are valid Python string literals
    let function_literal = serde_json::to_string(function_name)?;
    let input_literal = serde_json::to_string(input)?;

    Ok(format!(
        r#"import base64, contextlib, io, json, sys
_ns = {{"__name__": "__main__"}}
_src = base64.b64decode("{encoded_source}").decode("utf-8")
with contextlib.redirect_stdout(io.StringIO()):
    exec(compile(_src, "<submission>", "exec"), _ns)
    _result = _ns[{function_literal}]({input_literal})
sys.stdout.reconfigure(encoding="utf-8")
if isinstance(_result, str):
    sys.stdout.write(_result + "\n")
else:
    sys.stdout.write(json.dumps(_result, separators=(",", ":"), sort_keys=True, ensure_ascii=False, default=str) + "\n")
"#
    ))
}
