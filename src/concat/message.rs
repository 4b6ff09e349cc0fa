//! The message reducer (§4.5): the one non-trivial, pre-registered reducer
//! this crate ships. It encodes the industry-wide streaming-delta
//! convention — take the last finish reason, max the token usage,
//! concatenate content and tool-call arguments, merge tool calls by index —
//! that every LLM provider's chunked API is shaped around.

use std::collections::HashMap;

use super::{ConcatError, Registry, insert_reducer};
use crate::message::{ContentPart, FunctionCall, LogProbs, Message, ResponseMeta, ToolCall, Usage};
use crate::reader::Reader;
use crate::stream::Recv;

pub(super) fn register_builtin(registry: &mut Registry) {
    insert_reducer::<Message>(registry, reduce);
}

/// Reduces a fully-resolved (non-nil) slice of message fragments. The
/// nil-fragment check (§4.5's "a nil fragment anywhere in the input is a
/// fatal error identifying its index") happens one layer up, in
/// [`concat_messages`], where the input is still `&[Option<Message>]`.
fn reduce(fragments: &[Message]) -> Result<Message, ConcatError> {
    let mut out = Message::default();

    take_first_non_empty(
        &mut out.role,
        fragments.iter().map(|m| m.role.as_str()),
        "role",
    )?;
    take_first_non_empty(
        &mut out.name,
        fragments.iter().map(|m| m.name.as_str()),
        "name",
    )?;
    take_first_non_empty(
        &mut out.tool_call_id,
        fragments.iter().map(|m| m.tool_call_id.as_str()),
        "tool_call_id",
    )?;
    take_first_non_empty(
        &mut out.tool_name,
        fragments.iter().map(|m| m.tool_name.as_str()),
        "tool_name",
    )?;

    let content_len: usize = fragments.iter().map(|m| m.content.len()).sum();
    out.content.reserve(content_len);
    for m in fragments {
        out.content.push_str(&m.content);
    }

    let reasoning_len: usize = fragments.iter().map(|m| m.reasoning_content.len()).sum();
    out.reasoning_content.reserve(reasoning_len);
    for m in fragments {
        out.reasoning_content.push_str(&m.reasoning_content);
    }

    out.tool_calls = reduce_tool_calls(fragments)?;
    out.multi_content = reduce_multi_content(fragments)?;
    out.response_meta = reduce_response_meta(fragments)?;
    out.extra = reduce_extra(fragments)?;

    Ok(out)
}

fn take_first_non_empty<'a>(
    out: &mut String,
    values: impl Iterator<Item = &'a str>,
    field: &'static str,
) -> Result<(), ConcatError> {
    for v in values {
        agree(out, v, field)?;
    }
    Ok(())
}

fn agree(out: &mut String, value: &str, field: &'static str) -> Result<(), ConcatError> {
    if value.is_empty() {
        return Ok(());
    }
    if out.is_empty() {
        out.push_str(value);
    } else if out != value {
        return Err(ConcatError::Conflict {
            field,
            left: out.clone(),
            right: value.to_string(),
        });
    }
    Ok(())
}

/// Groups tool-call deltas by `index`; `None`-index entries pass through
/// unmerged. The aggregate is stably sorted with `None`-index entries
/// first, then ascending index.
fn reduce_tool_calls(fragments: &[Message]) -> Result<Vec<ToolCall>, ConcatError> {
    let mut none_group: Vec<ToolCall> = Vec::new();
    let mut groups: Vec<(i64, Vec<ToolCall>)> = Vec::new();

    for m in fragments {
        for tc in &m.tool_calls {
            match tc.index {
                None => none_group.push(tc.clone()),
                Some(i) => match groups.iter_mut().find(|(k, _)| *k == i) {
                    Some((_, calls)) => calls.push(tc.clone()),
                    None => groups.push((i, vec![tc.clone()])),
                },
            }
        }
    }
    groups.sort_by_key(|(i, _)| *i);

    let mut out = Vec::with_capacity(none_group.len() + groups.len());
    out.extend(none_group);
    for (index, calls) in groups {
        out.push(reduce_tool_call_group(index, &calls)?);
    }
    Ok(out)
}

fn reduce_tool_call_group(index: i64, calls: &[ToolCall]) -> Result<ToolCall, ConcatError> {
    let mut id = String::new();
    let mut r#type = String::new();
    let mut name = String::new();
    let mut arguments = String::new();
    for tc in calls {
        agree(&mut id, &tc.id, "tool_call.id")?;
        agree(&mut r#type, &tc.r#type, "tool_call.type")?;
        agree(&mut name, &tc.function.name, "tool_call.function.name")?;
        arguments.push_str(&tc.function.arguments);
    }
    Ok(ToolCall {
        index: Some(index),
        id,
        r#type,
        function: FunctionCall { name, arguments },
    })
}

/// Walks the concatenated `multi_content` in order and fuses runs of
/// compatible adjacent parts: a run of text parts becomes one text part; a
/// run of base64 audio parts (no URL, same MIME) becomes one audio part with
/// concatenated base64 data and a recursively-reduced `extra` map.
fn reduce_multi_content(fragments: &[Message]) -> Result<Vec<ContentPart>, ConcatError> {
    let mut out: Vec<ContentPart> = Vec::new();
    for m in fragments {
        for part in &m.multi_content {
            match (out.last_mut(), part) {
                (Some(ContentPart::Text(prev)), ContentPart::Text(next)) => {
                    prev.push_str(next);
                }
                (Some(ContentPart::Audio(prev)), ContentPart::Audio(next))
                    if prev.base64.is_some()
                        && prev.url.is_none()
                        && next.base64.is_some()
                        && next.url.is_none()
                        && prev.mime_type == next.mime_type =>
                {
                    if let Some(next_b64) = &next.base64 {
                        prev.base64.get_or_insert_with(String::new).push_str(next_b64);
                    }
                    prev.extra = super::concat_maps(&[prev.extra.clone(), next.extra.clone()])?;
                }
                _ => out.push(part.clone()),
            }
        }
    }
    Ok(out)
}

fn reduce_response_meta(fragments: &[Message]) -> Result<Option<ResponseMeta>, ConcatError> {
    let present: Vec<&ResponseMeta> = fragments.iter().filter_map(|m| m.response_meta.as_ref()).collect();
    if present.is_empty() {
        return Ok(None);
    }

    let mut finish_reason = String::new();
    for rm in &present {
        if !rm.finish_reason.is_empty() {
            finish_reason = rm.finish_reason.clone();
        }
    }

    let mut usage: Option<Usage> = None;
    for rm in &present {
        if let Some(u) = &rm.usage {
            usage = Some(match usage {
                None => *u,
                Some(prev) => Usage {
                    prompt_tokens: prev.prompt_tokens.max(u.prompt_tokens),
                    completion_tokens: prev.completion_tokens.max(u.completion_tokens),
                    total_tokens: prev.total_tokens.max(u.total_tokens),
                    cached_tokens: prev.cached_tokens.max(u.cached_tokens),
                },
            });
        }
    }

    let mut log_probs_content = Vec::new();
    let mut has_log_probs = false;
    for rm in &present {
        if let Some(lp) = &rm.log_probs {
            has_log_probs = true;
            log_probs_content.extend(lp.content.iter().cloned());
        }
    }

    Ok(Some(ResponseMeta {
        finish_reason,
        usage,
        log_probs: has_log_probs.then_some(LogProbs {
            content: log_probs_content,
        }),
    }))
}

fn reduce_extra(
    fragments: &[Message],
) -> Result<HashMap<String, serde_json::Value>, ConcatError> {
    let maps: Vec<_> = fragments.iter().map(|m| m.extra.clone()).collect();
    super::concat_maps(&maps)
}

/// Reduces `fragments` to a single aggregate [`Message`]. A `None` at index
/// `i` is a fatal [`ConcatError::NilFragment`].
pub fn concat_messages(fragments: &[Option<Message>]) -> Result<Message, ConcatError> {
    let mut resolved = Vec::with_capacity(fragments.len());
    for (i, f) in fragments.iter().enumerate() {
        match f {
            Some(m) => resolved.push(m.clone()),
            None => return Err(ConcatError::NilFragment(i)),
        }
    }
    reduce(&resolved)
}

/// Drains `reader` to completion and reduces everything it yielded.
pub fn concat_message_stream(reader: &Reader<Option<Message>>) -> Result<Message, ConcatError> {
    let mut items = Vec::new();
    loop {
        match reader.recv().map_err(ConcatError::Stream)? {
            Recv::Item(item) => items.push(item),
            Recv::Eof => break,
        }
    }
    concat_messages(&items)
}

/// Fragments an already-reduced `Message` into exactly two fragments that
/// reconstruct it under [`concat_messages`] (§8's first round-trip law).
///
/// Only `content`, `reasoning_content`, and each `Some`-indexed tool call's
/// `function.arguments` are partitioned across the two fragments; every
/// other field is carried whole by the first fragment. Splitting an
/// identity field (`role`, `name`, `tool_call_id`, `tool_name`, or a tool
/// call's `id`/`type`/`function.name`) would trip the reducer's
/// conflict-on-mismatch rule the moment a half turned out non-empty, and a
/// `None`-indexed tool call is never merged back together by index-based
/// grouping — splitting one would duplicate it, not reconstruct it — so
/// both kinds of entry are left untouched and placed whole in the first
/// fragment.
pub fn split(m: &Message) -> Vec<Message> {
    let (content1, content2) = split_str(&m.content);
    let (reasoning1, reasoning2) = split_str(&m.reasoning_content);

    let mut tool_calls1 = Vec::with_capacity(m.tool_calls.len());
    let mut tool_calls2 = Vec::new();
    for tc in &m.tool_calls {
        match tc.index {
            None => tool_calls1.push(tc.clone()),
            Some(index) => {
                let (args1, args2) = split_str(&tc.function.arguments);
                tool_calls1.push(ToolCall {
                    index: Some(index),
                    id: tc.id.clone(),
                    r#type: tc.r#type.clone(),
                    function: FunctionCall {
                        name: tc.function.name.clone(),
                        arguments: args1.to_string(),
                    },
                });
                if !args2.is_empty() {
                    tool_calls2.push(ToolCall {
                        index: Some(index),
                        id: String::new(),
                        r#type: String::new(),
                        function: FunctionCall {
                            name: String::new(),
                            arguments: args2.to_string(),
                        },
                    });
                }
            }
        }
    }

    let first = Message {
        role: m.role.clone(),
        name: m.name.clone(),
        tool_call_id: m.tool_call_id.clone(),
        tool_name: m.tool_name.clone(),
        content: content1.to_string(),
        reasoning_content: reasoning1.to_string(),
        tool_calls: tool_calls1,
        multi_content: m.multi_content.clone(),
        response_meta: m.response_meta.clone(),
        extra: m.extra.clone(),
    };
    let second = Message {
        content: content2.to_string(),
        reasoning_content: reasoning2.to_string(),
        tool_calls: tool_calls2,
        ..Message::default()
    };
    vec![first, second]
}

/// Splits `s` at its midpoint byte offset, walked back to the nearest UTF-8
/// char boundary so neither half ever cuts a multi-byte character.
fn split_str(s: &str) -> (&str, &str) {
    let mut mid = s.len() / 2;
    while mid > 0 && !s.is_char_boundary(mid) {
        mid -= 1;
    }
    s.split_at(mid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool_call(index: Option<i64>, id: &str, ty: &str, name: &str, args: &str) -> ToolCall {
        ToolCall {
            index,
            id: id.to_string(),
            r#type: ty.to_string(),
            function: FunctionCall {
                name: name.to_string(),
                arguments: args.to_string(),
            },
        }
    }

    #[test]
    fn tool_call_delta_reduction_scenario() {
        let f1 = Message {
            tool_calls: vec![tool_call(Some(0), "", "", "", "")],
            ..Default::default()
        };
        let f2 = Message {
            role: "assistant".to_string(),
            tool_calls: vec![tool_call(Some(0), "T1", "function", "f", "")],
            ..Default::default()
        };
        let f3 = Message {
            tool_calls: vec![tool_call(Some(0), "T1", "function", "f", "{}")],
            ..Default::default()
        };

        let reduced = concat_messages(&[Some(f1), Some(f2), Some(f3)]).unwrap();
        assert_eq!(reduced.role, "assistant");
        assert_eq!(reduced.tool_calls.len(), 1);
        let tc = &reduced.tool_calls[0];
        assert_eq!(tc.index, Some(0));
        assert_eq!(tc.id, "T1");
        assert_eq!(tc.r#type, "function");
        assert_eq!(tc.function.name, "f");
        assert_eq!(tc.function.arguments, "{}");
    }

    #[test]
    fn conflicting_role_is_an_error() {
        let f1 = Message {
            role: "assistant".to_string(),
            ..Default::default()
        };
        let f2 = Message {
            role: "user".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            concat_messages(&[Some(f1), Some(f2)]),
            Err(ConcatError::Conflict { field: "role", .. })
        ));
    }

    #[test]
    fn nil_fragment_is_fatal_and_identifies_its_index() {
        let f1 = Message::default();
        let err = concat_messages(&[Some(f1), None]).unwrap_err();
        assert!(matches!(err, ConcatError::NilFragment(1)));
    }

    #[test]
    fn content_and_reasoning_concatenate_in_order() {
        let fragments = vec![
            Some(Message {
                content: "Hel".to_string(),
                reasoning_content: "because ".to_string(),
                ..Default::default()
            }),
            Some(Message {
                content: "lo".to_string(),
                reasoning_content: "reasons".to_string(),
                ..Default::default()
            }),
        ];
        let reduced = concat_messages(&fragments).unwrap();
        assert_eq!(reduced.content, "Hello");
        assert_eq!(reduced.reasoning_content, "because reasons");
    }

    #[test]
    fn usage_is_reduced_elementwise_max() {
        let fragments = vec![
            Some(Message {
                response_meta: Some(ResponseMeta {
                    usage: Some(Usage {
                        prompt_tokens: 10,
                        completion_tokens: 1,
                        total_tokens: 11,
                        cached_tokens: 0,
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            Some(Message {
                response_meta: Some(ResponseMeta {
                    finish_reason: "stop".to_string(),
                    usage: Some(Usage {
                        prompt_tokens: 10,
                        completion_tokens: 5,
                        total_tokens: 15,
                        cached_tokens: 2,
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }),
        ];
        let reduced = concat_messages(&fragments).unwrap();
        let meta = reduced.response_meta.unwrap();
        assert_eq!(meta.finish_reason, "stop");
        let usage = meta.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 10);
        assert_eq!(usage.completion_tokens, 5);
        assert_eq!(usage.total_tokens, 15);
        assert_eq!(usage.cached_tokens, 2);
    }

    #[test]
    fn text_run_fuses_into_one_part() {
        let fragments = vec![
            Some(Message {
                multi_content: vec![ContentPart::Text("Hello, ".to_string())],
                ..Default::default()
            }),
            Some(Message {
                multi_content: vec![ContentPart::Text("world".to_string())],
                ..Default::default()
            }),
        ];
        let reduced = concat_messages(&fragments).unwrap();
        assert_eq!(reduced.multi_content.len(), 1);
        assert_eq!(
            reduced.multi_content[0],
            ContentPart::Text("Hello, world".to_string())
        );
    }

    /// §8's first round-trip law: `concat_messages(split(m)) == m`, for an
    /// already-reduced message exercising every field `split` partitions
    /// (content, reasoning content, and a `Some`-indexed tool call's
    /// arguments) plus fields it must leave untouched (a `None`-indexed
    /// tool call, multi-modal content, response metadata).
    #[test]
    fn split_then_concat_reconstructs_the_original() {
        let m = Message {
            role: "assistant".to_string(),
            content: "The weather in Boston is".to_string(),
            reasoning_content: "checking the forecast".to_string(),
            tool_calls: vec![
                tool_call(None, "T0", "function", "log", "{\"level\":\"info\"}"),
                tool_call(Some(0), "T1", "function", "get_weather", "{\"city\":\"Boston\"}"),
            ],
            multi_content: vec![ContentPart::Text("sunny".to_string())],
            response_meta: Some(ResponseMeta {
                finish_reason: "stop".to_string(),
                usage: Some(Usage {
                    prompt_tokens: 12,
                    completion_tokens: 8,
                    total_tokens: 20,
                    cached_tokens: 0,
                }),
                log_probs: None,
            }),
            ..Default::default()
        };

        let fragments: Vec<Option<Message>> = split(&m).into_iter().map(Some).collect();
        let reconstructed = concat_messages(&fragments).unwrap();
        assert_eq!(reconstructed, m);
    }

    proptest::proptest! {
        /// §8's first round-trip law, generalized: for any role/content/
        /// reasoning string and any ascending run of `Some`-indexed tool
        /// calls (already in the shape a prior reduction would leave them
        /// in — distinct, sorted indices), splitting and reconstructing
        /// yields the original message back exactly.
        #[test]
        fn split_then_concat_reconstructs_arbitrary_messages(
            role in "[a-z]{0,8}",
            content in ".*",
            reasoning_content in ".*",
            tool_call_args in proptest::collection::vec(".*", 0..4),
        ) {
            let tool_calls: Vec<ToolCall> = tool_call_args
                .into_iter()
                .enumerate()
                .map(|(i, args)| tool_call(Some(i as i64), "id", "function", "name", &args))
                .collect();
            let m = Message {
                role,
                content,
                reasoning_content,
                tool_calls,
                ..Default::default()
            };

            let fragments: Vec<Option<Message>> = split(&m).into_iter().map(Some).collect();
            let reconstructed = concat_messages(&fragments).unwrap();
            proptest::prop_assert_eq!(reconstructed, m);
        }
    }

    /// §8's second round-trip law: streaming a sequence of fragments
    /// through a [`crate::stream::pipe`] and reducing what comes out the
    /// other end yields the same result as reducing the original sequence
    /// directly — the pipe is a FIFO, so concat never sees a different
    /// order than it would have without the stream in between.
    #[test]
    fn streaming_then_concat_matches_direct_concat() {
        use crate::reader::Kind;
        use crate::stream::pipe;

        let fragments = vec![
            Some(Message {
                content: "Hel".to_string(),
                ..Default::default()
            }),
            Some(Message {
                content: "lo".to_string(),
                tool_calls: vec![tool_call(Some(0), "T1", "function", "f", "{}")],
                ..Default::default()
            }),
        ];
        let direct = concat_messages(&fragments).unwrap();

        let (tx, rx) = pipe::<Option<Message>>(1);
        let to_send = fragments.clone();
        let sender = std::thread::spawn(move || {
            for f in to_send {
                tx.send(f);
            }
            tx.close();
        });
        let reader = Reader::from_kind(Kind::Stream(rx));
        let streamed = concat_message_stream(&reader).unwrap();
        sender.join().unwrap();

        assert_eq!(streamed, direct);
    }
}
