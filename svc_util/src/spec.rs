// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Structured-event specification layer.
//!
//! Events are JSON objects whose `message` field is a list headed by a
//! message type. A registered spec rewrites the type into a
//! human-readable template and stamps `msg_type`; for error events
//! (`isError: true`) the same lookup runs against `why`. A spec may be
//! a splitter that turns one logical event into several records, each
//! numbered with `split_message: "i of N"`, which keeps individual log
//! records under the serialized-size cap.

use std::fmt;

use serde_json::{Map, Value};

pub type Event = Map<String, Value>;

/// Cap on the serialized length of a single record.
pub const MAX_EVENT_LENGTH: usize = 50_000;

const EXECUTE_CONVERGENCE_MESSAGE: &str = "Executing convergence";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpecError(pub String);

impl std::error::Error for SpecError {}

impl fmt::Display for SpecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Event spec error: {}", self.0)
    }
}

/// What a message type maps to.
pub enum MsgSpec {
    /// Rewrite the message into this template.
    Template(&'static str),
    /// Split one event into several `(record, message)` tuples.
    Split(fn(Event) -> Vec<(Event, String)>),
}

/// The registered message types.
pub fn lookup_spec(msg_type: &str) -> Option<MsgSpec> {
    use MsgSpec::*;
    match msg_type {
        "launch-servers" => Some(Template("Launching {num_servers} servers")),
        "delete-server" => Some(Template("Deleting {server_id} server")),
        "add-server-clb" => Some(Template(
            "Adding server {server_id} with address {ip_address} to CLB {clb_id}",
        )),
        "remove-server-clb" => Some(Template(
            "Removing server {server_id} with address {ip_address} from CLB {clb_id}",
        )),
        "converge-all-groups" => Some(Template("Checking divergent groups in buckets {buckets}")),
        "already-converging" => Some(Template(
            "Another convergence is already in flight for this group",
        )),
        "group-paused" => Some(Template("Group is paused; skipping convergence")),
        "group-already-deleted" => Some(Template(
            "Group is gone; clearing its divergence flag",
        )),
        "converge-fatal-error" => Some(Template("Fatal error while converging group")),
        "converge-non-fatal-error" => Some(Template("Non-fatal error while converging group")),
        "execute-convergence" => Some(Split(split_execute_convergence_capped)),
        "execute-convergence-results" => Some(Template(
            "Got {num_results} results after executing convergence",
        )),
        _ => None,
    }
}

fn is_error(event: &Event) -> bool {
    event
        .get("isError")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn message_type(event: &Event) -> Option<String> {
    event
        .get("message")
        .and_then(Value::as_array)
        .and_then(|message| message.first())
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn set_message(event: &mut Event, template: &str) {
    event.insert(
        "message".to_string(),
        Value::Array(vec![Value::String(template.to_string())]),
    );
}

/// Validate one event against the registered specs, returning the
/// records to emit. Unknown message types pass through untouched.
pub fn get_validated_event(event: Event) -> Vec<Event> {
    get_validated_event_with(event, &lookup_spec)
}

pub fn get_validated_event_with(
    event: Event,
    lookup: &dyn Fn(&str) -> Option<MsgSpec>,
) -> Vec<Event> {
    let error = is_error(&event);
    let why = event
        .get("why")
        .and_then(Value::as_str)
        .map(str::to_string);
    let key = if error {
        why.clone().or_else(|| message_type(&event))
    } else {
        message_type(&event)
    };
    let key = match key {
        Some(key) => key,
        None => return vec![event],
    };
    let spec = match lookup(&key) {
        Some(spec) => spec,
        None => return vec![event],
    };

    match spec {
        MsgSpec::Template(template) => {
            let mut event = event;
            if error {
                event.insert(
                    "why".to_string(),
                    Value::String(template.to_string()),
                );
                // The type came from `message`; rewrite that too.
                if why.is_none() {
                    set_message(&mut event, template);
                }
            } else {
                set_message(&mut event, template);
            }
            event.insert("msg_type".to_string(), Value::String(key));
            vec![event]
        }
        MsgSpec::Split(split) => {
            let records = split(event);
            let total = records.len();
            records
                .into_iter()
                .enumerate()
                .map(|(i, (mut record, message))| {
                    if error {
                        record.insert("why".to_string(), Value::String(message));
                    } else {
                        set_message(&mut record, &message);
                    }
                    record.insert("msg_type".to_string(), Value::String(key.clone()));
                    if total > 1 {
                        record.insert(
                            "split_message".to_string(),
                            Value::String(format!("{} of {total}", i + 1)),
                        );
                    }
                    record
                })
                .collect()
        }
    }
}

/// Validates events and forwards every resulting record to a sink. A
/// failing validator never loses the event: it is wrapped into an error
/// record instead.
pub struct SpecObserverWrapper {
    sink: Box<dyn Fn(Event) + Send + Sync>,
    validate: Box<dyn Fn(Event) -> Result<Vec<Event>, SpecError> + Send + Sync>,
}

impl SpecObserverWrapper {
    pub fn new(sink: Box<dyn Fn(Event) + Send + Sync>) -> Self {
        Self::with_validator(sink, Box::new(|event| Ok(get_validated_event(event))))
    }

    pub fn with_validator(
        sink: Box<dyn Fn(Event) + Send + Sync>,
        validate: Box<dyn Fn(Event) -> Result<Vec<Event>, SpecError> + Send + Sync>,
    ) -> Self {
        SpecObserverWrapper { sink, validate }
    }

    pub fn observe(&self, event: Event) {
        match (self.validate)(event.clone()) {
            Ok(records) => {
                for record in records {
                    (self.sink)(record);
                }
            }
            Err(err) => {
                let mut error_event = Event::new();
                error_event.insert("original_event".to_string(), Value::Object(event));
                error_event.insert("isError".to_string(), Value::Bool(true));
                error_event.insert("failure".to_string(), Value::String(err.to_string()));
                error_event.insert(
                    "why".to_string(),
                    Value::String("Error validating event".to_string()),
                );
                error_event.insert("message".to_string(), Value::Array(vec![]));
                (self.sink)(error_event);
            }
        }
    }
}

/// A sink that serializes each record and hands it to the logging
/// stack at a level matching `isError`.
pub fn log_sink() -> Box<dyn Fn(Event) + Send + Sync> {
    Box::new(|event| {
        let error = is_error(&event);
        match serde_json::to_string(&event) {
            Ok(serialized) if error => log::error!("{serialized}"),
            Ok(serialized) => log::info!("{serialized}"),
            Err(err) => log::error!("Failed to serialize log event: {err}"),
        }
    })
}

fn json_len(event: &Event) -> usize {
    serde_json::to_string(event).map(|s| s.len()).unwrap_or(usize::MAX)
}

fn value_len(value: &Value) -> usize {
    serde_json::to_string(value).map(|s| s.len()).unwrap_or(0)
}

const BULKY_PARAMS: [&str; 2] = ["servers", "lb_nodes"];

fn split_execute_convergence_capped(event: Event) -> Vec<(Event, String)> {
    split_execute_convergence(event, MAX_EVENT_LENGTH)
}

/// Split an `execute-convergence` event so every emitted record
/// serializes under `max_length` (modulo the constant header fields).
///
/// The first record always carries the summary and no bulky list; each
/// follow-up carries exactly one of `servers` / `lb_nodes` (the larger
/// list is moved out first), and a list that alone exceeds the cap is
/// bisected across several records. The union of the emitted lists
/// equals the input lists.
pub fn split_execute_convergence(mut event: Event, max_length: usize) -> Vec<(Event, String)> {
    let mut followups: Vec<(Event, &str)> = Vec::new();
    while json_len(&event) > max_length {
        let param = BULKY_PARAMS
            .iter()
            .copied()
            .filter(|param| event.contains_key(*param))
            .max_by_key(|param| value_len(&event[*param]));
        let param = match param {
            Some(param) => param,
            None => break,
        };
        let other = if param == "servers" { "lb_nodes" } else { "servers" };
        let mut follow = event.clone();
        follow.remove("desired");
        follow.remove("steps");
        follow.remove(other);
        event.remove(param);
        followups.push((follow, param));
    }

    let mut records = vec![event];
    for (follow, param) in followups {
        if json_len(&follow) > max_length {
            chunk_record(&follow, param, max_length, &mut records);
        } else {
            records.push(follow);
        }
    }
    records
        .into_iter()
        .map(|record| (record, EXECUTE_CONVERGENCE_MESSAGE.to_string()))
        .collect()
}

fn chunk_record(follow: &Event, param: &str, max_length: usize, out: &mut Vec<Event>) {
    let list = follow
        .get(param)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    chunk_into(follow, param, &list, max_length, out);
}

fn chunk_into(base: &Event, param: &str, slice: &[Value], max_length: usize, out: &mut Vec<Event>) {
    let mut record = base.clone();
    record.insert(param.to_string(), Value::Array(slice.to_vec()));
    if json_len(&record) <= max_length || slice.len() <= 1 {
        out.push(record);
        return;
    }
    let mid = slice.len() / 2;
    chunk_into(base, param, &slice[..mid], max_length, out);
    chunk_into(base, param, &slice[mid..], max_length, out);
}
