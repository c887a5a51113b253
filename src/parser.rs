//! Parser for tool invocations embedded in model output.
//!
//! The wire contract is the tag form:
//!
//! ```text
//! <invoke name="saveNote">
//!   <parameter name="title">Meeting</parameter>
//!   <parameter name="content">the meeting is at 5pm</parameter>
//! </invoke>
//! ```
//!
//! Model output is untrusted free text; it may contain zero, one, or many
//! such blocks, interleaved with prose. Parsing never fails: a malformed
//! block is dropped on its own (well-formed siblings survive) and the drop
//! is reported on the log, not by erroring. Calls come back in document
//! order. Parameter values stay plain strings here — list coercion is a
//! dispatch concern, decided against the tool's declared schema.

use regex_lite::Regex;

/// One invocation as it appeared in the text, before schema validation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawToolCall {
    pub name: String,
    pub params: Vec<(String, String)>,
}

const OPEN_TAG: &str = "<invoke";
const INVOKE_PATTERN: &str = r#"(?s)<invoke\s+name="([^"]+)"\s*>(.*?)</invoke>"#;
const PARAMETER_PATTERN: &str = r#"(?s)<parameter\s+name="([^"]+)"\s*>(.*?)</parameter>"#;

pub struct ToolCallParser {
    invoke: Option<Regex>,
    parameter: Option<Regex>,
}

impl ToolCallParser {
    pub fn new() -> Self {
        // Both patterns are fixed literals; a compile failure degrades to
        // parsing nothing rather than panicking.
        Self {
            invoke: Regex::new(INVOKE_PATTERN).ok(),
            parameter: Regex::new(PARAMETER_PATTERN).ok(),
        }
    }

    /// Extract all well-formed invocation blocks, in document order.
    ///
    /// The scan advances opening tag by opening tag so that an unterminated
    /// block cannot swallow a well-formed one that follows it: a block whose
    /// body would contain another opening tag is treated as malformed and
    /// only that opening is dropped.
    pub fn parse(&self, response: &str) -> Vec<RawToolCall> {
        let (Some(invoke), Some(parameter)) = (&self.invoke, &self.parameter) else {
            return Vec::new();
        };

        let mut calls = Vec::new();
        let mut dropped = 0usize;
        let mut cursor = 0usize;

        while let Some(rel) = response[cursor..].find(OPEN_TAG) {
            let start = cursor + rel;
            let slice = &response[start..];

            let Some(captures) = invoke.captures(slice) else {
                // No complete block remains; every opening left is malformed.
                dropped += slice.matches(OPEN_TAG).count();
                break;
            };
            let (Some(whole), Some(name), Some(body)) =
                (captures.get(0), captures.get(1), captures.get(2))
            else {
                break;
            };

            if whole.start() > 0 || body.as_str().contains(OPEN_TAG) {
                // This opening never closes properly; a later block matched
                // in its place. Drop just this opening and rescan from the
                // next one.
                dropped += 1;
                cursor = start + OPEN_TAG.len();
                continue;
            }

            let params = parameter
                .captures_iter(body.as_str())
                .filter_map(|p| match (p.get(1), p.get(2)) {
                    (Some(key), Some(value)) => Some((
                        key.as_str().trim().to_string(),
                        value.as_str().trim().to_string(),
                    )),
                    _ => None,
                })
                .collect();

            calls.push(RawToolCall {
                name: name.as_str().trim().to_string(),
                params,
            });
            cursor = start + whole.end();
        }

        if dropped > 0 {
            tracing::warn!(
                "dropped {} malformed invocation block(s); kept {}",
                dropped,
                calls.len()
            );
        }

        calls
    }
}

impl Default for ToolCallParser {
    fn default() -> Self {
        Self::new()
    }
}
