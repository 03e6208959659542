//! Library entrypoint for the payment watcher. The API embeds the node RPC
//! client for pay address allocation and the webhook dispatcher for events
//! it raises itself (creation, cancel, refund); the binary in `main.rs`
//! runs the reconciliation loop.

pub mod pipeline;
pub mod rpc;
pub mod webhook;
pub mod worker;

pub use pipeline::reconcile_invoice;
pub use rpc::{LedgerSource, NodeRpcClient, ReceivableBlock, RpcError};
pub use webhook::{WebhookDispatcher, WebhookPayload};
pub use worker::{poll_once, run_watcher, PollSummary, WatcherError};
