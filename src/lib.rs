pub mod jsonrpc;

// 公開API
pub use jsonrpc::{
    connect, Channel, ChildProcessChannel, Client, LocalSpawner, MemoryChannel, Params,
    RequestOptions, RpcError, RpcResult, TurnQueue,
};
