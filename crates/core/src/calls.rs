//! Pending tool-call tracking.
//!
//! The side channel opens a call, streams its JSON arguments in fragments and
//! then marks it complete. Only one call is tracked at a time: a call-open that
//! arrives while another call is pending replaces it.

use crate::registry::ToolError;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// A tool call whose arguments are still arriving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCall {
    pub call_id: String,
    pub name: String,
    pub argument_fragments: Vec<String>,
}

impl PendingCall {
    pub fn new(call_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            argument_fragments: Vec::new(),
        }
    }

    /// Joins the fragments and parses them as a JSON object.
    ///
    /// An empty payload is an empty object.
    pub fn arguments(&self) -> Result<Value, ToolError> {
        let raw = self.argument_fragments.concat();
        if raw.trim().is_empty() {
            return Ok(Value::Object(Map::new()));
        }
        match serde_json::from_str::<Value>(&raw) {
            Ok(value @ Value::Object(_)) => Ok(value),
            Ok(_) => Err(ToolError::ArgumentsNotObject(self.name.clone())),
            Err(source) => Err(ToolError::MalformedArguments {
                name: self.name.clone(),
                source,
            }),
        }
    }
}

#[derive(Debug, Default)]
pub struct CallTracker {
    pending: Option<PendingCall>,
}

impl CallTracker {
    /// Starts tracking a call, returning the unfinished call it displaced, if any.
    pub fn open(&mut self, call_id: &str, name: &str) -> Option<PendingCall> {
        let displaced = self.pending.replace(PendingCall::new(call_id, name));
        if let Some(old) = &displaced {
            warn!(
                discarded_call = %old.call_id,
                discarded_tool = %old.name,
                call_id,
                "New tool call opened before the previous one completed"
            );
        }
        displaced
    }

    /// Appends an argument fragment. Returns `false` when no call is pending.
    pub fn append(&mut self, fragment: &str) -> bool {
        match self.pending.as_mut() {
            Some(call) => {
                call.argument_fragments.push(fragment.to_string());
                true
            }
            None => {
                debug!("Ignoring argument fragment with no pending call");
                false
            }
        }
    }

    /// Takes the pending call out of the tracker. The tracker is empty afterwards.
    pub fn complete(&mut self) -> Option<PendingCall> {
        self.pending.take()
    }

    pub fn pending(&self) -> Option<&PendingCall> {
        self.pending.as_ref()
    }

    pub fn clear(&mut self) {
        self.pending = None;
    }
}
