//! Correlation id generation
//!
//! Ids only have to be unique among the requests currently pending on one
//! client. `UuidGenerator` is the default; `SequentialIds` gives tests and
//! embedders a deterministic sequence.

use std::cell::Cell;

use uuid::Uuid;

use super::error::RpcResult;

/// Produces a fresh identifier on every call
pub trait IdGenerator {
    fn next_id(&self) -> RpcResult<String>;
}

/// Random v4 UUIDs in the hyphenated 8-4-4-4-12 form
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> RpcResult<String> {
        Ok(Uuid::new_v4().to_string())
    }
}

/// `<prefix><n>` with `n` counting up from 1
#[derive(Debug)]
pub struct SequentialIds {
    prefix: String,
    next: Cell<u64>,
}

impl SequentialIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: Cell::new(1),
        }
    }
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::new("req-")
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> RpcResult<String> {
        let n = self.next.get();
        self.next.set(n + 1);
        Ok(format!("{}{}", self.prefix, n))
    }
}
