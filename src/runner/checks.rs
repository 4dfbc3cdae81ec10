use crate::runner::executor::Outcome;
use crate::runner::json;
use crate::runner::vu::VuState;
use crate::scenario::Check;
use serde_json::Value;

/// Result of one named check. Ephemeral: produced per step execution and
/// folded into the aggregator immediately.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    /// What was actually observed, for failure diagnostics.
    pub sample: Option<String>,
}

/// Run every check against the outcome, in declaration order, with no
/// short-circuiting: a failing check never prevents the ones after it from
/// producing a result.
pub fn evaluate(checks: &[Check], outcome: &Outcome, state: &VuState) -> Vec<CheckResult> {
    let parsed_body: Option<Value> = outcome
        .body
        .as_deref()
        .and_then(|b| serde_json::from_str(b).ok());

    checks
        .iter()
        .map(|check| evaluate_one(check, outcome, parsed_body.as_ref(), state))
        .collect()
}

fn evaluate_one(
    check: &Check,
    outcome: &Outcome,
    body: Option<&Value>,
    state: &VuState,
) -> CheckResult {
    let mut passed = true;
    let mut observed = Vec::new();

    if let Some(expected) = check.status {
        let actual = outcome.status;
        passed &= actual == Some(expected);
        observed.push(match actual {
            Some(code) => format!("status={}", code),
            None => format!(
                "error={}",
                outcome.error.as_deref().unwrap_or("request failed")
            ),
        });
    }

    if let Some(max) = check.max_latency {
        passed &= outcome.latency <= max;
        observed.push(format!("latency={}ms", outcome.latency.as_millis()));
    }

    if let Some(path) = &check.jsonpath {
        match body.and_then(|doc| json::lookup(doc, path)) {
            Some(actual) => {
                if let Some(expected) = &check.equals {
                    let expected = substitute_expected(expected, state);
                    passed &= *actual == expected;
                }
                observed.push(format!("{}={}", path, json::value_to_string(actual)));
            }
            None => {
                passed = false;
                observed.push(format!("{}=<missing>", path));
            }
        }
    }

    CheckResult {
        name: check.name.clone(),
        passed,
        sample: if observed.is_empty() {
            None
        } else {
            Some(observed.join(" "))
        },
    }
}

/// Expected values written as strings may reference captures, e.g.
/// `equals: "{{user_id}}"`.
fn substitute_expected(expected: &Value, state: &VuState) -> Value {
    match expected {
        Value::String(s) => Value::String(state.substitute(s)),
        other => other.clone(),
    }
}
