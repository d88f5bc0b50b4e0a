//! Window policies: which part of a growing conversation log to resend.
//!
//! Every policy is a pure function of the full log. None of them mutate or
//! reorder their input; the slice-returning ones return a suffix of it.
//!
//! | Policy | Keeps |
//! |--------|-------|
//! | [`keep_last_n`] | the last `n` messages, no pairing awareness |
//! | [`keep_last_n_tool_safe`] | the last `n` messages, widened until every tool result in the window has its call |
//! | [`token_budget_guard`] | everything below the threshold, only the last message at or above it |
//! | [`filter_by_role`] | messages whose kind satisfies a predicate |
//!
//! Policies do not repair the log. [`validate_for_inference`] is the check
//! applied at the inference boundary; a window that breaks the invariants
//! surfaces there as a [`HistoryError`].

use super::message::{MessageKind, MessagePart, ModelMessage};
use std::collections::HashMap;
use tracing::debug;

/// Why a log cannot be submitted for inference.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    #[error("conversation log is empty; nothing to submit")]
    Empty,

    #[error("conversation log must end with a request, but message {index} is a response")]
    EndsWithResponse { index: usize },

    #[error("tool call '{tool_call_id}' ({tool_name}) in message {index} has no matching result")]
    DanglingToolCall {
        index: usize,
        tool_call_id: String,
        tool_name: String,
    },

    #[error("tool result '{tool_call_id}' in message {index} has no matching call")]
    OrphanToolReturn { index: usize, tool_call_id: String },
}

/// The last `n` messages, or the whole log when it is no longer than `n`.
///
/// May cut between a tool call and its result. `n == 0` keeps nothing.
pub fn keep_last_n(log: &[ModelMessage], n: usize) -> &[ModelMessage] {
    if log.len() > n {
        &log[log.len() - n..]
    } else {
        log
    }
}

/// Like [`keep_last_n`], then moves the start back until every tool result
/// inside the window has its matching call inside the window too.
///
/// Results pair with the nearest earlier unanswered call carrying the same
/// id, so ids reused across rounds still widen to the right call. A result
/// with no such call cannot be fixed by widening and is left for
/// [`validate_for_inference`] to report.
pub fn keep_last_n_tool_safe(log: &[ModelMessage], n: usize) -> &[ModelMessage] {
    if log.len() <= n {
        return log;
    }
    let naive_start = log.len() - n;
    let pairs = pair_tool_returns(log);
    let mut start = naive_start;
    while let Some(call_index) = earliest_missing_call(&pairs, start) {
        start = call_index;
    }
    if start != naive_start {
        debug!(
            "Tool-safe window widened from {} to {} message(s)",
            n,
            log.len() - start
        );
    }
    &log[start..]
}

/// `(result message, call message)` for every tool result in `log`, in
/// order. The call is the nearest earlier one with the same id that no
/// other result has claimed, or `None` when there is none.
fn pair_tool_returns(log: &[ModelMessage]) -> Vec<(usize, Option<usize>)> {
    let mut open: HashMap<&str, Vec<usize>> = HashMap::new();
    let mut pairs = Vec::new();
    for (index, message) in log.iter().enumerate() {
        for part in message.parts() {
            match part {
                MessagePart::ToolCall { tool_call_id, .. } => {
                    open.entry(tool_call_id.as_str()).or_default().push(index);
                }
                MessagePart::ToolReturn { tool_call_id, .. } => {
                    let call = open.get_mut(tool_call_id.as_str()).and_then(Vec::pop);
                    pairs.push((index, call));
                }
                _ => {}
            }
        }
    }
    pairs
}

/// Earliest call before `start` whose result lies at or after it.
fn earliest_missing_call(pairs: &[(usize, Option<usize>)], start: usize) -> Option<usize> {
    pairs
        .iter()
        .filter(|(result, _)| *result >= start)
        .filter_map(|(_, call)| *call)
        .filter(|call| *call < start)
        .min()
}

/// The whole log while `running_estimate` is below `threshold`; only the most
/// recent message once it reaches it.
///
/// The estimate is owned and updated by the caller between turns.
pub fn token_budget_guard(
    log: &[ModelMessage],
    running_estimate: u64,
    threshold: u64,
) -> &[ModelMessage] {
    if running_estimate >= threshold {
        debug!(
            "Token guard collapsed history: estimate {running_estimate} >= threshold {threshold}"
        );
        &log[log.len().saturating_sub(1)..]
    } else {
        log
    }
}

/// Messages whose kind satisfies `predicate`, in their original order.
pub fn filter_by_role(
    log: &[ModelMessage],
    predicate: impl Fn(MessageKind) -> bool,
) -> Vec<ModelMessage> {
    log.iter()
        .filter(|m| predicate(m.kind()))
        .cloned()
        .collect()
}

/// Check that a log may be submitted: non-empty, ends with a request, and
/// every tool call is paired with a later result (and vice versa).
pub fn validate_for_inference(log: &[ModelMessage]) -> Result<(), HistoryError> {
    let Some(last) = log.last() else {
        return Err(HistoryError::Empty);
    };
    if last.is_response() {
        return Err(HistoryError::EndsWithResponse {
            index: log.len() - 1,
        });
    }

    // call id -> (message index, tool name) of calls still awaiting a result,
    // most recent last
    let mut open: HashMap<&str, Vec<(usize, &str)>> = HashMap::new();
    for (index, message) in log.iter().enumerate() {
        for part in message.parts() {
            match part {
                MessagePart::ToolCall {
                    tool_call_id,
                    tool_name,
                    ..
                } => {
                    open.entry(tool_call_id.as_str())
                        .or_default()
                        .push((index, tool_name.as_str()));
                }
                MessagePart::ToolReturn { tool_call_id, .. } => {
                    let claimed = open.get_mut(tool_call_id.as_str()).and_then(Vec::pop);
                    if claimed.is_none() {
                        return Err(HistoryError::OrphanToolReturn {
                            index,
                            tool_call_id: tool_call_id.clone(),
                        });
                    }
                }
                _ => {}
            }
        }
    }

    let dangling = open
        .into_iter()
        .flat_map(|(id, calls)| calls.into_iter().map(move |(index, name)| (id, (index, name))))
        .min_by_key(|(_, (index, _))| *index);
    match dangling {
        Some((id, (index, name))) => Err(HistoryError::DanglingToolCall {
            index,
            tool_call_id: id.to_string(),
            tool_name: name.to_string(),
        }),
        None => Ok(()),
    }
}
