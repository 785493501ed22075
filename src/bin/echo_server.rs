//! Minimal framed JSON-RPC 2.0 server over stdio
//!
//! Answers `echo`, `ping`, `add`, `subtract` and `fail`. Batch requests are
//! accepted, but every reply goes out as its own frame: the client only
//! correlates single response objects and drops array-shaped replies.
//! Notifications get no response.

use anyhow::{Context, Result};
use batchrpc::jsonrpc::stdio::{write_frame, FrameReader};
use batchrpc::jsonrpc::{ErrorCode, ErrorObject, Response, JSONRPC_VERSION};
use log::{debug, info, warn};
use serde_json::{json, Value};
use tokio::io::BufReader;

fn number_pair(params: Option<&Value>) -> Result<(f64, f64), ErrorObject> {
    let pair = match params {
        Some(Value::Array(arr)) if arr.len() == 2 => arr[0].as_f64().zip(arr[1].as_f64()),
        Some(Value::Object(obj)) => obj
            .get("a")
            .and_then(Value::as_f64)
            .zip(obj.get("b").and_then(Value::as_f64)),
        _ => None,
    };

    pair.ok_or_else(|| {
        ErrorObject::custom(
            ErrorCode::InvalidParams as i32,
            "Parameters must be [a, b] or {\"a\": number, \"b\": number}".to_string(),
            None,
        )
    })
}

fn call(method: &str, params: Option<&Value>) -> Result<Value, ErrorObject> {
    match method {
        "echo" => Ok(params.cloned().unwrap_or(Value::Null)),
        "ping" => Ok(json!("pong")),
        "add" => number_pair(params).map(|(a, b)| json!(a + b)),
        "subtract" => number_pair(params).map(|(a, b)| json!(a - b)),
        "fail" => Err(ErrorObject::custom(
            -32000,
            "Requested failure".to_string(),
            params.cloned(),
        )),
        _ => Err(ErrorObject::new(
            ErrorCode::MethodNotFound,
            Some(json!({ "method": method })),
        )),
    }
}

/// Answer one request object; `None` for notifications
fn handle(message: &Value) -> Option<Response> {
    let id = message.get("id").cloned();

    let method = match (message.get("jsonrpc"), message.get("method")) {
        (Some(version), Some(Value::String(method))) if version == JSONRPC_VERSION => method,
        _ => {
            let error = ErrorObject::new(ErrorCode::InvalidRequest, None);
            return Some(Response::error(error, id.unwrap_or(Value::Null)));
        }
    };

    let outcome = call(method, message.get("params"));
    let id = match id {
        Some(id) => id,
        None => {
            debug!("Notification handled: {}", method);
            return None;
        }
    };

    Some(match outcome {
        Ok(result) => Response::success(result, id),
        Err(error) => Response::error(error, id),
    })
}

/// Answer one inbound payload, one serialized reply per answered request
fn respond(payload: &str) -> Result<Vec<String>> {
    let message: Value = match serde_json::from_str(payload) {
        Ok(message) => message,
        Err(e) => {
            warn!("Failed to parse message: {}", e);
            let error = ErrorObject::new(ErrorCode::ParseError, None);
            return Ok(vec![serde_json::to_string(&Response::error(
                error,
                Value::Null,
            ))?]);
        }
    };

    let responses: Vec<Response> = match message {
        Value::Array(batch) => {
            debug!("Batch of {} requests, replying per element", batch.len());
            batch.iter().filter_map(handle).collect()
        }
        single => handle(&single).into_iter().collect(),
    };

    responses
        .iter()
        .map(|response| serde_json::to_string(response).map_err(anyhow::Error::from))
        .collect()
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::init();
    info!("echo_server started");

    let mut reader = FrameReader::new(BufReader::new(tokio::io::stdin()))?;
    let mut stdout = tokio::io::stdout();

    while let Some(payload) = reader.read_frame().await.context("Failed to read frame")? {
        debug!("Received: {}", payload);
        for reply in respond(&payload)? {
            debug!("Sending: {}", reply);
            write_frame(&mut stdout, &reply)
                .await
                .context("Failed to write frame")?;
        }
    }

    info!("stdin closed, echo_server exiting");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_request() {
        let replies = respond(r#"{"jsonrpc":"2.0","method":"subtract","params":[42,23],"id":"x"}"#)
            .unwrap();
        assert_eq!(replies.len(), 1);

        let reply: Value = serde_json::from_str(&replies[0]).unwrap();
        assert_eq!(reply, json!({"jsonrpc": "2.0", "result": 19.0, "id": "x"}));
    }

    #[test]
    fn test_batch_is_answered_one_object_per_request() {
        let replies = respond(
            r#"[{"jsonrpc":"2.0","method":"ping","id":"1"},{"jsonrpc":"2.0","method":"log"},{"jsonrpc":"2.0","method":"add","params":{"a":24,"b":32},"id":"2"}]"#,
        )
        .unwrap();
        assert_eq!(replies.len(), 2);

        let replies: Vec<Value> = replies
            .iter()
            .map(|reply| serde_json::from_str(reply).unwrap())
            .collect();
        // 配列ではなく単一オブジェクトで返す
        assert!(replies.iter().all(Value::is_object));
        assert_eq!(replies[0]["id"], "1");
        assert_eq!(replies[0]["result"], "pong");
        assert_eq!(replies[1]["id"], "2");
        assert_eq!(replies[1]["result"], 56.0);
    }

    #[test]
    fn test_notification_only_gets_no_reply() {
        assert!(respond(r#"{"jsonrpc":"2.0","method":"ping"}"#)
            .unwrap()
            .is_empty());
        assert!(respond(r#"[{"jsonrpc":"2.0","method":"ping"}]"#)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_unknown_method() {
        let replies = respond(r#"{"jsonrpc":"2.0","method":"nope","id":"1"}"#).unwrap();
        let reply: Value = serde_json::from_str(&replies[0]).unwrap();

        assert_eq!(reply["error"]["code"], -32601);
    }

    #[test]
    fn test_parse_error_reply() {
        let replies = respond("not json").unwrap();
        let reply: Value = serde_json::from_str(&replies[0]).unwrap();

        assert_eq!(reply["error"]["code"], -32700);
        assert_eq!(reply["id"], Value::Null);
    }
}
