//! Block-explorer REST client.
//!
//! The upstream is a bscscan-style `module=account&action=tokentx` endpoint
//! returning transfer events ordered descending by block. This is the only
//! long-blocking IO in the service; every request carries a hard timeout and
//! runs outside any database transaction.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::config::ExplorerConfig;
use crate::error::AppError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// One token transfer as reported by the explorer.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenTransfer {
    pub hash: String,
    /// 18-decimal wei amount as a decimal string.
    pub value: String,
    pub from: String,
    pub to: String,
    #[serde(rename = "tokenSymbol", default)]
    pub token_symbol: String,
}

#[derive(Debug, Deserialize)]
struct TokenTxResponse {
    #[allow(dead_code)]
    message: String,
    #[serde(rename = "Result", default)]
    result: Vec<TokenTransfer>,
}

pub struct ExplorerClient {
    http: reqwest::Client,
    api_url: String,
    receive_address: String,
}

impl ExplorerClient {
    pub fn new(config: &ExplorerConfig) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AppError::Fatal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            receive_address: config.receive_address.clone(),
        })
    }

    /// Fetch one page of token transfers for a contract, keeping only
    /// transfers into the receiving address, keyed by transaction hash.
    pub async fn token_transfers(
        &self,
        contract: &str,
        page_size: u32,
        page: u32,
    ) -> Result<HashMap<String, TokenTransfer>, AppError> {
        let page_size = page_size.to_string();
        let page_number = page.to_string();
        let response = self
            .http
            .get(&self.api_url)
            .query(&[
                ("module", "account"),
                ("action", "tokentx"),
                ("contractaddress", contract),
                ("address", self.receive_address.as_str()),
                ("sort", "desc"),
                ("offset", page_size.as_str()),
                ("page", page_number.as_str()),
            ])
            .send()
            .await?
            .error_for_status()
            .map_err(|e| AppError::Transient(format!("explorer returned error status: {e}")))?;

        let body: TokenTxResponse = response
            .json()
            .await
            .map_err(|e| AppError::Transient(format!("explorer response decode failed: {e}")))?;

        let mut transfers = HashMap::new();
        for transfer in body.result {
            if transfer.to.eq_ignore_ascii_case(&self.receive_address) {
                transfers.insert(transfer.hash.clone(), transfer);
            }
        }

        debug!(
            contract,
            page,
            transfers = transfers.len(),
            "Fetched explorer page"
        );
        Ok(transfers)
    }
}
