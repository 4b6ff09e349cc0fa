//! The minimal message shape the [`crate::concat::message`] reducer needs to
//! exist and be testable.
//!
//! The agent framework this crate's streaming core was extracted from has a
//! much richer `schema` package (multi-provider request/response types,
//! typed tool schemas, …) that is explicitly an external collaborator — see
//! SPEC_FULL.md §1. `Message` here is sized only to exercise every field the
//! concat contract in §4.5 reduces over; it is not meant to be a complete
//! LLM message representation.

use std::collections::HashMap;

/// One fragment (or the fully reduced result) of an LLM assistant turn.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub role: String,
    pub name: String,
    pub tool_call_id: String,
    pub tool_name: String,
    pub content: String,
    pub reasoning_content: String,
    pub tool_calls: Vec<ToolCall>,
    pub multi_content: Vec<ContentPart>,
    pub response_meta: Option<ResponseMeta>,
    pub extra: HashMap<String, ExtraValue>,
}

/// A leaf value inside an `extra` map. `serde_json::Value` gives an explicit
/// `Null` that is distinct from "key absent" — exactly the distinction
/// §4.5's map reducer has to preserve.
pub type ExtraValue = serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolCall {
    /// `None` entries are never merged with one another — each passes
    /// through the reducer unmodified, per §4.5.
    pub index: Option<i64>,
    pub id: String,
    pub r#type: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// One part of a multi-modal assistant turn.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ContentPart {
    Text(String),
    Audio(AudioPart),
    /// Any other provider-specific part kind. Carried through unchanged;
    /// never fused with a neighbour during concat.
    Other(ExtraValue),
}

#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct AudioPart {
    pub base64: Option<String>,
    pub url: Option<String>,
    pub mime_type: String,
    pub extra: HashMap<String, ExtraValue>,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ResponseMeta {
    pub finish_reason: String,
    pub usage: Option<Usage>,
    pub log_probs: Option<LogProbs>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Usage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
    /// Flattened from the richer `PromptTokenDetails.CachedTokens` the
    /// distilled spec names; this crate only needs the one field the
    /// usage-max reduction (§4.5) actually touches.
    pub cached_tokens: i64,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LogProbs {
    pub content: Vec<String>,
}
