//! JSON-RPC 2.0 client with per-turn batching
//!
//! ## 主要コンポーネント
//!
//! - [`types`]: JSON-RPC 2.0メッセージ型定義
//! - [`client`]: `Client` - リクエスト発行と相関IDの管理
//! - [`batcher`]: 同一ターン内のリクエストを1回の送信にまとめる
//! - [`dispatcher`]: 受信メッセージの検証とハンドラー呼び出し
//! - [`stdio`]: 子プロセスとのContent-Lengthフレーミング通信
//!
//! Calls issued during one scheduling turn leave as a single transmission;
//! responses are routed back to their handlers by correlation id. Inbound
//! traffic that is not a JSON-RPC 2.0 response to a pending call is dropped.
//!
//! ## 使用例
//!
//! ```rust
//! use std::rc::Rc;
//! use batchrpc::jsonrpc::{Client, MemoryChannel, Params, RequestOptions, TurnQueue};
//! use serde_json::json;
//!
//! let channel = Rc::new(MemoryChannel::new());
//! let turn = Rc::new(TurnQueue::new());
//! let client = Client::new(channel.clone(), turn.clone());
//!
//! client.request(
//!     "subtract",
//!     RequestOptions::new()
//!         .params(Params::Positional(vec![json!(42), json!(23)]))
//!         .on_response(|error, result| println!("{:?} {:?}", error, result)),
//! )?;
//! client.request("log", RequestOptions::new())?;
//!
//! turn.run_pending();
//! assert_eq!(channel.sent().len(), 1); // one batch of two
//! # Ok::<(), batchrpc::jsonrpc::RpcError>(())
//! ```

pub mod batcher;
pub mod channel;
pub mod client;
pub mod dispatcher;
pub mod error;
pub mod id;
pub mod pending;
pub mod scheduler;
pub mod stdio;
pub mod types;

// Re-export main types for convenience
pub use batcher::{Batch, OutboundBatcher};
pub use channel::{Channel, ChannelError, MemoryChannel, MessageListener};
pub use client::{connect, Client, RequestOptions};
pub use dispatcher::{Dispatch, DropReason, ResponseDispatcher};
pub use error::{RpcError, RpcResult};
pub use id::{IdGenerator, SequentialIds, UuidGenerator};
pub use pending::{PendingRequests, ResponseHandler};
pub use scheduler::{LocalSpawner, Scheduler, Task, TurnQueue};
pub use stdio::{ChildProcessChannel, FrameReader};
pub use types::{ErrorCode, ErrorObject, Outcome, Params, Request, Response, JSONRPC_VERSION};
