use std::time::Duration;

use async_trait::async_trait;
use nanopay_domain::model::NanoAddress;
use nanopay_domain::services::events::{PayAddressError, PayAddressSource};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;

mod types;

pub use types::{
    AccountCreateRequest, AccountCreateResponse, AccountHistoryRequest, AccountHistoryResponse,
    HistoryEntry, ReceivableBlock, ReceivableRequest, ReceivableResponse,
};

const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("node error: {0}")]
    Node(String),
    #[error("node rejected account `{0}`")]
    InvalidAccount(String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for RpcError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(value.to_string())
    }
}

/// Read access to the ledger state the watcher reconciles against.
#[async_trait]
pub trait LedgerSource: Send + Sync {
    /// Confirmed sends not yet pocketed, largest first, at most `count`.
    async fn receivable(&self, account: &str, count: u64)
        -> Result<Vec<ReceivableBlock>, RpcError>;

    /// Sends the account already pocketed, oldest first, at most `count`.
    async fn received(&self, account: &str, count: u64)
        -> Result<Vec<ReceivableBlock>, RpcError>;
}

/// Nano node RPC client. The node speaks `{"action": ...}` JSON over POST and
/// reports failures as `{"error": "..."}` with a 200 status.
#[derive(Clone)]
pub struct NodeRpcClient {
    http: reqwest::Client,
    url: String,
    wallet: Option<String>,
}

impl NodeRpcClient {
    pub fn new(url: impl Into<String>) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_RPC_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            url: url.into(),
            wallet: None,
        })
    }

    /// Enables pay address allocation from the given node wallet.
    pub fn with_wallet(mut self, wallet: impl Into<String>) -> Self {
        self.wallet = Some(wallet.into());
        self
    }

    async fn call<Req, Resp>(&self, request: &Req) -> Result<Resp, RpcError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let body: Value = self
            .http
            .post(&self.url)
            .json(request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        decode_response(body)
    }

    pub async fn account_create(&self, wallet: &str) -> Result<String, RpcError> {
        let response: AccountCreateResponse =
            self.call(&AccountCreateRequest::new(wallet)).await?;
        Ok(response.account)
    }
}

#[async_trait]
impl LedgerSource for NodeRpcClient {
    async fn receivable(
        &self,
        account: &str,
        count: u64,
    ) -> Result<Vec<ReceivableBlock>, RpcError> {
        let response: ReceivableResponse = self
            .call(&ReceivableRequest::new(account, count))
            .await
            .map_err(|err| match err {
                RpcError::Node(message) if is_bad_account(&message) => {
                    RpcError::InvalidAccount(account.to_owned())
                }
                other => other,
            })?;
        Ok(response.into_blocks())
    }

    async fn received(&self, account: &str, count: u64) -> Result<Vec<ReceivableBlock>, RpcError> {
        let response: AccountHistoryResponse = match self
            .call(&AccountHistoryRequest::new(account, count))
            .await
        {
            Ok(response) => response,
            Err(RpcError::Node(message)) if is_unopened_account(&message) => {
                return Ok(Vec::new())
            }
            Err(RpcError::Node(message)) if is_bad_account(&message) => {
                return Err(RpcError::InvalidAccount(account.to_owned()))
            }
            Err(err) => return Err(err),
        };
        Ok(response.into_received())
    }
}

#[async_trait]
impl PayAddressSource for NodeRpcClient {
    async fn allocate_pay_address(&self) -> Result<String, PayAddressError> {
        let wallet = self
            .wallet
            .as_deref()
            .ok_or_else(|| PayAddressError("no node wallet configured".into()))?;
        let account = self
            .account_create(wallet)
            .await
            .map_err(|err| PayAddressError(err.to_string()))?;
        NanoAddress::parse(&account)
            .map(NanoAddress::into_inner)
            .map_err(|err| PayAddressError(format!("node returned `{account}`: {err}")))
    }
}

fn decode_response<Resp>(body: Value) -> Result<Resp, RpcError>
where
    Resp: DeserializeOwned,
{
    if let Some(message) = body.get("error").and_then(Value::as_str) {
        return Err(RpcError::Node(message.to_owned()));
    }
    serde_json::from_value(body).map_err(|err| RpcError::Decode(err.to_string()))
}

fn is_bad_account(message: &str) -> bool {
    let lowered = message.to_ascii_lowercase();
    lowered.contains("bad account") || lowered.contains("invalid account")
}

fn is_unopened_account(message: &str) -> bool {
    message.to_ascii_lowercase().contains("account not found")
}
