use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// `receivable` request asking for confirmed sends with their source account,
/// largest amounts first so dust cannot crowd a real payment out of `count`.
#[derive(Debug, Serialize)]
pub struct ReceivableRequest<'a> {
    pub action: &'static str,
    pub account: &'a str,
    pub count: String,
    pub source: &'static str,
    pub sorting: &'static str,
    pub include_only_confirmed: &'static str,
}

impl<'a> ReceivableRequest<'a> {
    pub fn new(account: &'a str, count: u64) -> Self {
        Self {
            action: "receivable",
            account,
            count: count.to_string(),
            source: "true",
            sorting: "true",
            include_only_confirmed: "true",
        }
    }
}

/// `account_history` request in raw mode, oldest block first, so receive
/// blocks expose the send hash they pocketed in `link`.
#[derive(Debug, Serialize)]
pub struct AccountHistoryRequest<'a> {
    pub action: &'static str,
    pub account: &'a str,
    pub count: String,
    pub raw: &'static str,
    pub reverse: &'static str,
}

impl<'a> AccountHistoryRequest<'a> {
    pub fn new(account: &'a str, count: u64) -> Self {
        Self {
            action: "account_history",
            account,
            count: count.to_string(),
            raw: "true",
            reverse: "true",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AccountCreateRequest<'a> {
    pub action: &'static str,
    pub wallet: &'a str,
}

impl<'a> AccountCreateRequest<'a> {
    pub fn new(wallet: &'a str) -> Self {
        Self {
            action: "account_create",
            wallet,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AccountCreateResponse {
    pub account: String,
}

/// The node answers `"blocks": ""` when nothing is receivable.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ReceivableBlocks {
    Found(BTreeMap<String, ReceivableEntry>),
    Empty(String),
}

impl Default for ReceivableBlocks {
    fn default() -> Self {
        Self::Empty(String::new())
    }
}

#[derive(Debug, Deserialize)]
pub struct ReceivableResponse {
    #[serde(default)]
    pub blocks: ReceivableBlocks,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReceivableEntry {
    /// Raw amount as a decimal string.
    pub amount: String,
    pub source: String,
}

/// A confirmed send to an invoice's pay address, pocketed or not. `hash` is
/// always the send block hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivableBlock {
    pub hash: String,
    pub amount: String,
    pub source: String,
}

/// The node answers `"history": ""` for an account without blocks.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum HistoryBlocks {
    Found(Vec<HistoryEntry>),
    Empty(String),
}

impl Default for HistoryBlocks {
    fn default() -> Self {
        Self::Empty(String::new())
    }
}

#[derive(Debug, Deserialize)]
pub struct AccountHistoryResponse {
    #[serde(default)]
    pub history: HistoryBlocks,
}

/// One raw history block. `account` is the counterparty, `link` (state
/// blocks) or `source` (legacy blocks) the pocketed send.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub amount: String,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub confirmed: Option<String>,
}

impl HistoryEntry {
    fn is_confirmed_receive(&self) -> bool {
        let kind = self.subtype.as_deref().unwrap_or(&self.block_type);
        matches!(kind, "receive" | "open") && self.confirmed.as_deref() != Some("false")
    }

    fn send_hash(&self) -> Option<&str> {
        self.link
            .as_deref()
            .or(self.source.as_deref())
            .filter(|hash| !hash.is_empty())
    }
}

impl AccountHistoryResponse {
    /// Receives already pocketed by the account, keyed by the send they
    /// consumed so they line up with `receivable` hashes.
    pub fn into_received(self) -> Vec<ReceivableBlock> {
        let HistoryBlocks::Found(entries) = self.history else {
            return Vec::new();
        };
        entries
            .into_iter()
            .filter(HistoryEntry::is_confirmed_receive)
            .filter_map(|entry| {
                let hash = entry.send_hash()?.to_owned();
                Some(ReceivableBlock {
                    hash,
                    amount: entry.amount,
                    source: entry.account,
                })
            })
            .collect()
    }
}

impl ReceivableResponse {
    pub fn into_blocks(self) -> Vec<ReceivableBlock> {
        match self.blocks {
            ReceivableBlocks::Found(map) => map
                .into_iter()
                .map(|(hash, entry)| ReceivableBlock {
                    hash,
                    amount: entry.amount,
                    source: entry.source,
                })
                .collect(),
            ReceivableBlocks::Empty(_) => Vec::new(),
        }
    }
}
