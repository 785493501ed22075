use std::cell::RefCell;
use std::rc::Rc;

use log::{debug, trace};
use serde_json::Value;

use super::error::RpcResult;
use super::pending::PendingRequests;
use super::types::JSONRPC_VERSION;

/// Why an inbound message was ignored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Top-level value is not an object (batched responses land here)
    NotAnObject,
    /// `jsonrpc` missing or not "2.0"
    VersionMismatch,
    /// No string `id`
    MissingId,
    /// `id` does not belong to a pending request
    UnknownId,
}

/// What happened to one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// The handler registered under this id was invoked and retired
    Delivered(String),
    Dropped(DropReason),
}

/// Routes inbound responses to the handler that asked for them
///
/// Shares the registry with the client that registers handlers. Anything
/// that is not a valid response to a pending request is dropped without
/// touching a handler.
#[derive(Debug, Clone)]
pub struct ResponseDispatcher {
    pending: Rc<RefCell<PendingRequests>>,
}

impl ResponseDispatcher {
    pub fn new(pending: Rc<RefCell<PendingRequests>>) -> Self {
        Self { pending }
    }

    /// Parse, validate and dispatch one raw inbound payload
    ///
    /// Malformed JSON is returned as `Err` to the channel that delivered it.
    pub fn dispatch(&self, raw: &str) -> RpcResult<Dispatch> {
        let value: Value = serde_json::from_str(raw)?;

        let outcome = self.dispatch_value(value);
        match &outcome {
            Dispatch::Delivered(id) => debug!("Dispatched response for id {}", id),
            Dispatch::Dropped(reason) => trace!("Dropped inbound message: {:?}", reason),
        }
        Ok(outcome)
    }

    fn dispatch_value(&self, value: Value) -> Dispatch {
        let mut message = match value {
            Value::Object(message) => message,
            _ => return Dispatch::Dropped(DropReason::NotAnObject),
        };

        if message.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return Dispatch::Dropped(DropReason::VersionMismatch);
        }

        let id = match message.get("id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => return Dispatch::Dropped(DropReason::MissingId),
        };

        // the registry borrow ends here, the handler may issue new requests
        let handler = self.pending.borrow_mut().take(&id);
        let handler = match handler {
            Some(handler) => handler,
            None => return Dispatch::Dropped(DropReason::UnknownId),
        };

        handler(message.remove("error"), message.remove("result"));
        Dispatch::Delivered(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jsonrpc::error::RpcError;
    use serde_json::json;

    type Calls = Rc<RefCell<Vec<(Option<Value>, Option<Value>)>>>;

    fn dispatcher_with(ids: &[&str]) -> (ResponseDispatcher, Calls) {
        let pending = Rc::new(RefCell::new(PendingRequests::new()));
        let calls: Calls = Rc::new(RefCell::new(Vec::new()));

        for id in ids {
            let sink = calls.clone();
            pending
                .borrow_mut()
                .register(
                    id.to_string(),
                    Box::new(move |error, result| sink.borrow_mut().push((error, result))),
                )
                .unwrap();
        }

        (ResponseDispatcher::new(pending), calls)
    }

    #[test]
    fn test_result_is_delivered() {
        let (dispatcher, calls) = dispatcher_with(&["abc"]);

        let outcome = dispatcher
            .dispatch(r#"{"jsonrpc":"2.0","result":65,"id":"abc"}"#)
            .unwrap();

        assert_eq!(outcome, Dispatch::Delivered("abc".to_string()));
        assert_eq!(*calls.borrow(), vec![(None, Some(json!(65)))]);
    }

    #[test]
    fn test_error_is_delivered_verbatim() {
        let (dispatcher, calls) = dispatcher_with(&["abc"]);

        dispatcher
            .dispatch(
                r#"{"jsonrpc":"2.0","error":{"code":-32601,"message":"Method not found","extra":true},"id":"abc"}"#,
            )
            .unwrap();

        assert_eq!(
            *calls.borrow(),
            vec![(
                Some(json!({"code": -32601, "message": "Method not found", "extra": true})),
                None
            )]
        );
    }

    #[test]
    fn test_handler_invoked_at_most_once() {
        let (dispatcher, calls) = dispatcher_with(&["abc"]);
        let raw = r#"{"jsonrpc":"2.0","result":1,"id":"abc"}"#;

        assert_eq!(
            dispatcher.dispatch(raw).unwrap(),
            Dispatch::Delivered("abc".to_string())
        );
        assert_eq!(
            dispatcher.dispatch(raw).unwrap(),
            Dispatch::Dropped(DropReason::UnknownId)
        );
        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn test_missing_version_is_dropped() {
        let (dispatcher, calls) = dispatcher_with(&["abc"]);

        let outcome = dispatcher.dispatch(r#"{"result":65,"id":"abc"}"#).unwrap();

        assert_eq!(outcome, Dispatch::Dropped(DropReason::VersionMismatch));
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn test_wrong_version_is_dropped_and_handler_stays_pending() {
        let (dispatcher, calls) = dispatcher_with(&["abc"]);

        let outcome = dispatcher
            .dispatch(r#"{"jsonrpc":"1.0","result":65,"id":"abc"}"#)
            .unwrap();
        assert_eq!(outcome, Dispatch::Dropped(DropReason::VersionMismatch));

        dispatcher
            .dispatch(r#"{"jsonrpc":"2.0","result":65,"id":"abc"}"#)
            .unwrap();
        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn test_unknown_and_missing_ids_are_dropped() {
        let (dispatcher, calls) = dispatcher_with(&["abc"]);

        assert_eq!(
            dispatcher
                .dispatch(r#"{"jsonrpc":"2.0","result":65,"id":"zzz"}"#)
                .unwrap(),
            Dispatch::Dropped(DropReason::UnknownId)
        );
        assert_eq!(
            dispatcher.dispatch(r#"{"jsonrpc":"2.0","result":65}"#).unwrap(),
            Dispatch::Dropped(DropReason::MissingId)
        );
        assert_eq!(
            dispatcher
                .dispatch(r#"{"jsonrpc":"2.0","result":65,"id":7}"#)
                .unwrap(),
            Dispatch::Dropped(DropReason::MissingId)
        );
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn test_batched_response_is_dropped() {
        let (dispatcher, calls) = dispatcher_with(&["a", "b"]);

        let outcome = dispatcher
            .dispatch(
                r#"[{"jsonrpc":"2.0","result":1,"id":"a"},{"jsonrpc":"2.0","result":2,"id":"b"}]"#,
            )
            .unwrap();

        assert_eq!(outcome, Dispatch::Dropped(DropReason::NotAnObject));
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn test_malformed_json_propagates() {
        let (dispatcher, calls) = dispatcher_with(&["abc"]);

        let result = dispatcher.dispatch("{not json");

        assert!(matches!(result, Err(RpcError::Json(_))));
        assert!(calls.borrow().is_empty());
    }
}
