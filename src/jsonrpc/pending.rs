use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use super::error::{RpcError, RpcResult};

/// One-shot callback receiving `(error, result)` from a matched response
pub type ResponseHandler = Box<dyn FnOnce(Option<Value>, Option<Value>)>;

/// Handlers waiting for a response, keyed by correlation id
///
/// Entries live until a matching response arrives. Nothing expires them.
#[derive(Default)]
pub struct PendingRequests {
    handlers: HashMap<String, ResponseHandler>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `handler` under `id`. Ids are generated fresh per call, so a
    /// collision means the id generator broke its contract.
    pub fn register(&mut self, id: String, handler: ResponseHandler) -> RpcResult<()> {
        if self.handlers.contains_key(&id) {
            return Err(RpcError::DuplicateId(id));
        }
        self.handlers.insert(id, handler);
        Ok(())
    }

    /// Remove and return the handler for `id`
    pub fn take(&mut self, id: &str) -> Option<ResponseHandler> {
        self.handlers.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.handlers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for PendingRequests {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequests")
            .field("ids", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
