use super::error::RpcResult;
use super::types::Request;

/// Requests drained from the queue by one flush
#[derive(Debug, Clone, PartialEq)]
pub enum Batch {
    /// Exactly one request, sent as a bare object
    Single(Request),
    /// Two or more requests, sent as an array in enqueue order
    Many(Vec<Request>),
}

impl Batch {
    pub fn len(&self) -> usize {
        match self {
            Batch::Single(_) => 1,
            Batch::Many(requests) => requests.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize for the wire
    pub fn to_payload(&self) -> RpcResult<String> {
        let payload = match self {
            Batch::Single(request) => serde_json::to_string(request)?,
            Batch::Many(requests) => serde_json::to_string(requests)?,
        };
        Ok(payload)
    }
}

/// Outbound queue for the current scheduling turn
///
/// `schedule_flush` answers whether the caller still has to schedule a
/// flush; it says yes once per turn. `take_batch` drains everything and
/// re-arms the flag, so anything enqueued after that starts a new batch.
#[derive(Debug, Default)]
pub struct OutboundBatcher {
    queue: Vec<Request>,
    flush_scheduled: bool,
}

impl OutboundBatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, request: Request) {
        self.queue.push(request);
    }

    /// Returns `true` if no flush is pending yet (and marks one pending)
    pub fn schedule_flush(&mut self) -> bool {
        if self.flush_scheduled {
            return false;
        }
        self.flush_scheduled = true;
        true
    }

    /// Drain the whole queue, or `None` if it is empty
    pub fn take_batch(&mut self) -> Option<Batch> {
        self.flush_scheduled = false;

        let mut queue = std::mem::take(&mut self.queue);
        match queue.len() {
            0 => None,
            1 => queue.pop().map(Batch::Single),
            _ => Some(Batch::Many(queue)),
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
