//! JSON-RPC client for the full node.
//!
//! Fetches block templates and submits solved blocks. The mining loop only
//! sees the [`NodeClient`] trait, so tests can stand in a fake node.

use std::fs;
use std::time::Duration;

use blockminer_core::{Block, BlockTemplate};
use log::{debug, info};
use reqwest::blocking::Client;
use reqwest::{Certificate, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::NodeConfig;
use crate::error::NodeError;

/// What the node said about a submitted block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted,
    /// Reason string, e.g. "duplicate", "inconclusive", "high-hash".
    Rejected(String),
}

/// The two calls the mining loop makes against a node.
pub trait NodeClient {
    fn get_template(&mut self) -> Result<BlockTemplate, NodeError>;
    fn submit_block(&mut self, block: &Block) -> Result<SubmitOutcome, NodeError>;
}

/// Talks JSON-RPC over HTTP(S) with basic auth.
pub struct RpcClient {
    client: Client,
    url: String,
    user: String,
    password: String,
    template_rules: Vec<String>,
    next_id: u64,
}

impl RpcClient {
    /// Build the HTTP client without touching the network.
    pub fn new(config: &NodeConfig) -> Result<Self, NodeError> {
        let mut builder = Client::builder()
            .timeout(config.timeout_secs.map(Duration::from_secs));

        if let Some(path) = &config.cert_path {
            let pem = fs::read(path).map_err(|source| NodeError::Certificate {
                path: path.clone(),
                source,
            })?;
            let cert = Certificate::from_pem(&pem).map_err(|e| NodeError::InvalidCertificate {
                path: path.clone(),
                reason: e.to_string(),
            })?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder
            .build()
            .map_err(|e| NodeError::Transport(e.to_string()))?;

        Ok(RpcClient {
            client,
            url: config.url.clone(),
            user: config.user.clone(),
            password: config.password.clone(),
            template_rules: config.template_rules.clone(),
            next_id: 0,
        })
    }

    /// Build the client and make sure the node answers with these credentials.
    pub fn connect(config: &NodeConfig) -> Result<Self, NodeError> {
        let mut client = Self::new(config)?;
        let height = client.block_count()?;
        info!("Connected to node at {} (chain height {})", client.url, height);
        Ok(client)
    }

    pub fn block_count(&mut self) -> Result<u64, NodeError> {
        self.call("getblockcount", json!([]))
    }

    fn call<T: DeserializeOwned>(&mut self, method: &str, params: Value) -> Result<T, NodeError> {
        self.next_id += 1;
        let request = json!({
            "jsonrpc": "1.0",
            "id": self.next_id,
            "method": method,
            "params": params,
        });
        debug!("RPC {} #{}", method, self.next_id);

        let response = self
            .client
            .post(&self.url)
            .basic_auth(&self.user, Some(&self.password))
            .json(&request)
            .send()
            .map_err(|e| NodeError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| NodeError::Transport(e.to_string()))?;
        decode_response(status, &body)
    }
}

impl NodeClient for RpcClient {
    fn get_template(&mut self) -> Result<BlockTemplate, NodeError> {
        let params = json!([{ "rules": self.template_rules }]);
        self.call("getblocktemplate", params)
    }

    fn submit_block(&mut self, block: &Block) -> Result<SubmitOutcome, NodeError> {
        let result: Option<String> = self.call("submitblock", json!([block.to_hex()]))?;
        Ok(match result {
            None => SubmitOutcome::Accepted,
            Some(reason) => SubmitOutcome::Rejected(reason),
        })
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// Turn an HTTP status and body into a typed result.
///
/// The node answers RPC-level failures with a non-2xx status and a JSON
/// error object, so the body is read before the status is judged.
fn decode_response<T: DeserializeOwned>(status: StatusCode, body: &str) -> Result<T, NodeError> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(NodeError::Auth(status.as_u16()));
    }

    let response: RpcResponse = serde_json::from_str(body).map_err(|e| {
        NodeError::Protocol(format!("HTTP {}: {} ({})", status.as_u16(), e, truncate(body)))
    })?;

    if let Some(error) = response.error {
        return Err(NodeError::Rpc {
            code: error.code,
            message: error.message,
        });
    }

    serde_json::from_value(response.result)
        .map_err(|e| NodeError::Protocol(format!("unexpected result: {}", e)))
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(120) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
