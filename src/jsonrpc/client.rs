use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use log::{debug, error, trace};
use serde_json::Value;

use super::batcher::{Batch, OutboundBatcher};
use super::channel::Channel;
use super::dispatcher::ResponseDispatcher;
use super::error::RpcResult;
use super::id::{IdGenerator, UuidGenerator};
use super::pending::{PendingRequests, ResponseHandler};
use super::scheduler::Scheduler;
use super::types::{Outcome, Params, Request};

/// Per-call options: params and an optional response handler
///
/// Without a handler the call goes out as a notification (no id) and any
/// response to it is dropped.
#[derive(Default)]
pub struct RequestOptions {
    params: Option<Params>,
    on_response: Option<ResponseHandler>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn params(mut self, params: impl Into<Option<Params>>) -> Self {
        self.params = params.into();
        self
    }

    /// Handler receiving the raw `(error, result)` pair
    pub fn on_response<F>(mut self, handler: F) -> Self
    where
        F: FnOnce(Option<Value>, Option<Value>) + 'static,
    {
        self.on_response = Some(Box::new(handler));
        self
    }

    /// Handler receiving the pair folded by [`Outcome::into_result`]
    pub fn on_outcome<F>(self, handler: F) -> Self
    where
        F: FnOnce(RpcResult<Value>) + 'static,
    {
        self.on_response(move |error, result| {
            handler(Outcome::from_parts(error, result).into_result())
        })
    }

    pub fn expects_response(&self) -> bool {
        self.on_response.is_some()
    }
}

impl From<Params> for RequestOptions {
    fn from(params: Params) -> Self {
        Self::new().params(params)
    }
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("params", &self.params)
            .field("on_response", &self.on_response.is_some())
            .finish()
    }
}

struct ClientInner {
    channel: Rc<dyn Channel>,
    scheduler: Box<dyn Scheduler>,
    ids: Box<dyn IdGenerator>,
    pending: Rc<RefCell<PendingRequests>>,
    outbound: RefCell<OutboundBatcher>,
}

impl ClientInner {
    fn flush(&self) -> RpcResult<()> {
        // the queue is cleared before send, a request issued from inside
        // `send` starts the next batch
        let batch = self.outbound.borrow_mut().take_batch();
        let batch = match batch {
            Some(batch) => batch,
            None => return Ok(()),
        };

        let payload = batch.to_payload()?;
        match &batch {
            Batch::Single(request) => debug!("Flushing request: {}", request.method),
            Batch::Many(requests) => debug!("Flushing batch of {} requests", requests.len()),
        }
        trace!("Sending: {}", payload);

        self.channel.send(payload)?;
        Ok(())
    }
}

/// JSON-RPC 2.0 client bound to one channel
///
/// Every `request` issued during one scheduling turn goes out in a single
/// transmission: a bare object for one call, an array for several.
/// Responses are matched to handlers by id only, so they may arrive in any
/// order. Cloning yields another handle to the same client.
#[derive(Clone)]
pub struct Client {
    inner: Rc<ClientInner>,
}

impl Client {
    /// Client issuing random UUID correlation ids
    pub fn new(channel: impl Channel + 'static, scheduler: impl Scheduler + 'static) -> Self {
        Self::with_ids(channel, scheduler, UuidGenerator)
    }

    /// Client with an explicit id generator
    pub fn with_ids(
        channel: impl Channel + 'static,
        scheduler: impl Scheduler + 'static,
        ids: impl IdGenerator + 'static,
    ) -> Self {
        let channel: Rc<dyn Channel> = Rc::new(channel);
        let pending = Rc::new(RefCell::new(PendingRequests::new()));

        let dispatcher = ResponseDispatcher::new(pending.clone());
        channel.on_message(Box::new(move |raw: &str| dispatcher.dispatch(raw).map(|_| ())));

        Self {
            inner: Rc::new(ClientInner {
                channel,
                scheduler: Box::new(scheduler),
                ids: Box::new(ids),
                pending,
                outbound: RefCell::new(OutboundBatcher::new()),
            }),
        }
    }

    /// Queue a call for the end of the current turn
    ///
    /// An id is generated and the handler registered only when the options
    /// carry a handler. Id generation failures surface here; channel
    /// failures surface from the flush.
    pub fn request(&self, method: &str, options: impl Into<RequestOptions>) -> RpcResult<()> {
        let RequestOptions {
            params,
            on_response,
        } = options.into();

        let id = match on_response {
            Some(handler) => {
                let id = self.inner.ids.next_id()?;
                self.inner
                    .pending
                    .borrow_mut()
                    .register(id.clone(), handler)?;
                Some(id)
            }
            None => None,
        };

        debug!("Queueing request: {} (id: {:?})", method, id);
        self.enqueue(Request::new(method, params, id));
        Ok(())
    }

    /// Send everything queued so far right now
    ///
    /// For owners that drive turn boundaries themselves. A no-op when the
    /// queue is empty, so a flush that was already scheduled stays harmless.
    pub fn flush(&self) -> RpcResult<()> {
        self.inner.flush()
    }

    /// Number of calls still waiting for a response
    pub fn pending_count(&self) -> usize {
        self.inner.pending.borrow().len()
    }

    /// Number of calls queued for the next flush
    pub fn queued_count(&self) -> usize {
        self.inner.outbound.borrow().len()
    }

    fn enqueue(&self, request: Request) {
        let needs_flush = {
            let mut outbound = self.inner.outbound.borrow_mut();
            outbound.enqueue(request);
            outbound.schedule_flush()
        };

        if needs_flush {
            let client: Weak<ClientInner> = Rc::downgrade(&self.inner);
            self.inner.scheduler.defer(Box::new(move || {
                if let Some(inner) = client.upgrade() {
                    if let Err(e) = inner.flush() {
                        error!("Failed to flush outbound requests: {}", e);
                    }
                }
            }));
        }
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("pending", &self.pending_count())
            .field("queued", &self.queued_count())
            .finish()
    }
}

/// Build a client on `channel`, flushing through `scheduler`
///
/// Shorthand for [`Client::new`].
pub fn connect(channel: impl Channel + 'static, scheduler: impl Scheduler + 'static) -> Client {
    Client::new(channel, scheduler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jsonrpc::channel::MemoryChannel;
    use crate::jsonrpc::error::RpcError;
    use crate::jsonrpc::id::SequentialIds;
    use crate::jsonrpc::scheduler::TurnQueue;
    use serde_json::json;
    use std::cell::Cell;

    struct FailingIds;

    impl IdGenerator for FailingIds {
        fn next_id(&self) -> RpcResult<String> {
            Err(RpcError::IdGeneration("entropy source unavailable".to_string()))
        }
    }

    fn setup() -> (Client, Rc<MemoryChannel>, Rc<TurnQueue>) {
        let channel = Rc::new(MemoryChannel::new());
        let queue = Rc::new(TurnQueue::new());
        let client = Client::with_ids(channel.clone(), queue.clone(), SequentialIds::new("id-"));
        (client, channel, queue)
    }

    #[test]
    fn test_handler_registers_pending_entry() {
        let (client, _channel, _queue) = setup();

        client
            .request("subtract", RequestOptions::new().on_response(|_, _| {}))
            .unwrap();
        client.request("notify", RequestOptions::new()).unwrap();

        assert_eq!(client.pending_count(), 1);
        assert_eq!(client.queued_count(), 2);
    }

    #[test]
    fn test_nothing_sent_before_turn_ends() {
        let (client, channel, queue) = setup();

        client.request("ping", RequestOptions::new()).unwrap();
        assert!(channel.sent().is_empty());
        assert_eq!(queue.pending(), 1);

        queue.run_pending();
        assert_eq!(channel.sent(), vec![r#"{"jsonrpc":"2.0","method":"ping"}"#]);
    }

    #[test]
    fn test_explicit_flush_makes_scheduled_flush_noop() {
        let (client, channel, queue) = setup();

        client.request("ping", RequestOptions::new()).unwrap();
        client.flush().unwrap();
        assert_eq!(channel.sent().len(), 1);

        queue.run_pending();
        assert_eq!(channel.sent().len(), 1);
    }

    #[test]
    fn test_id_generation_failure_propagates() {
        let channel = Rc::new(MemoryChannel::new());
        let queue = Rc::new(TurnQueue::new());
        let client = Client::with_ids(channel.clone(), queue.clone(), FailingIds);

        let result = client.request("subtract", RequestOptions::new().on_response(|_, _| {}));

        assert!(matches!(result, Err(RpcError::IdGeneration(_))));
        assert_eq!(client.pending_count(), 0);
        assert_eq!(client.queued_count(), 0);

        // 通知はIDを必要としない
        client.request("log", RequestOptions::new()).unwrap();
        queue.run_pending();
        assert_eq!(channel.sent().len(), 1);
    }

    #[test]
    fn test_send_failure_surfaces_from_flush() {
        let (client, channel, _queue) = setup();
        channel.close();

        client.request("ping", RequestOptions::new()).unwrap();
        let result = client.flush();

        assert!(matches!(result, Err(RpcError::Channel(_))));
        assert_eq!(client.queued_count(), 0);
    }

    #[test]
    fn test_on_outcome_folds_pair() {
        let (client, channel, queue) = setup();
        let seen = Rc::new(Cell::new(0));

        let sink = seen.clone();
        client
            .request(
                "add",
                RequestOptions::new()
                    .params(Params::Positional(vec![json!(1), json!(2)]))
                    .on_outcome(move |outcome| {
                        assert_eq!(outcome.unwrap(), json!(3));
                        sink.set(sink.get() + 1);
                    }),
            )
            .unwrap();
        queue.run_pending();

        channel
            .deliver(r#"{"jsonrpc":"2.0","result":3,"id":"id-1"}"#)
            .unwrap();
        assert_eq!(seen.get(), 1);
        assert_eq!(client.pending_count(), 0);
    }

    #[test]
    fn test_request_options_debug_hides_handler() {
        let options = RequestOptions::new().on_response(|_, _| {});
        assert!(options.expects_response());
        assert_eq!(
            format!("{:?}", options),
            "RequestOptions { params: None, on_response: true }"
        );
    }
}
