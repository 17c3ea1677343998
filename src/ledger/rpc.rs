//! JSON-RPC ledger client for Bitcoin Core and Omni Core nodes.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use super::{
    Block, LedgerQuery, OutPoint, OutputKind, RawTransaction, Tx, TxOutput, UnspentOutput,
    Verbosity,
};
use crate::config::RpcEndpoint;
use crate::error::ResolutionError;

const RPC_VERSION: &str = "1.0";
const RPC_ID: &str = "mdip";

const OP_RETURN: u8 = 0x6a;
const OP_PUSHDATA1: u8 = 0x4c;
const OP_PUSHDATA2: u8 = 0x4d;
const OP_PUSHDATA4: u8 = 0x4e;

/// A [`LedgerQuery`] backed by a node's JSON-RPC interface
pub struct RpcLedger {
    client: Client,
    url: Url,
    username: String,
    password: String,
}

impl RpcLedger {
    pub fn new(url: Url, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url,
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn from_endpoint(endpoint: &RpcEndpoint) -> Self {
        Self::new(endpoint.url.clone(), &endpoint.username, &endpoint.password)
    }

    /// Calls `method`, treating a `null` result as absent
    async fn call_optional<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Option<T>, ResolutionError> {
        debug!(method, %params, "rpc call");

        let response = self
            .client
            .post(self.url.clone())
            .basic_auth(&self.username, Some(&self.password))
            .json(&json!({
                "jsonrpc": RPC_VERSION,
                "id": RPC_ID,
                "method": method,
                "params": params,
            }))
            .send()
            .await?;

        // Bitcoin Core reports RPC failures with a 500 and a JSON body, so
        // only give up on the status when the body is not JSON.
        let status = response.status();
        let body = response.text().await?;
        let envelope: RpcResponse<T> = serde_json::from_str(&body).map_err(|e| {
            if status.is_success() {
                ResolutionError::JsonError(e)
            } else {
                ResolutionError::UnexpectedResponse(format!("HTTP {status} from {method}"))
            }
        })?;

        envelope.into_result()
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, ResolutionError> {
        self.call_optional(method, params)
            .await?
            .ok_or_else(|| ResolutionError::UnexpectedResponse(format!("{method} returned null")))
    }
}

#[async_trait]
impl LedgerQuery for RpcLedger {
    async fn get_unspent_output(
        &self,
        txid: &str,
        index: u32,
    ) -> Result<Option<UnspentOutput>, ResolutionError> {
        let txout: Option<RpcTxOut> = self.call_optional("gettxout", json!([txid, index])).await?;
        Ok(txout.map(|txout| UnspentOutput {
            outpoint: OutPoint::new(txid, index),
            value: txout.value,
            confirmations: txout.confirmations,
        }))
    }

    async fn get_raw_transaction(&self, txid: &str) -> Result<RawTransaction, ResolutionError> {
        let raw: RpcTx = self.call("getrawtransaction", json!([txid, true])).await?;

        Ok(RawTransaction {
            blockhash: raw.blockhash.clone(),
            confirmations: raw.confirmations,
            tx: raw.into_tx()?,
        })
    }

    async fn get_block_hash_by_height(&self, height: u32) -> Result<String, ResolutionError> {
        self.call("getblockhash", json!([height])).await
    }

    async fn get_block_by_hash(
        &self,
        hash: &str,
        verbosity: Verbosity,
    ) -> Result<Block, ResolutionError> {
        let level = match verbosity {
            Verbosity::Summary => 1,
            Verbosity::Full => 2,
        };
        let block: RpcBlock = self.call("getblock", json!([hash, level])).await?;
        block.into_block()
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

impl<T> RpcResponse<T> {
    fn into_result(self) -> Result<Option<T>, ResolutionError> {
        match self.error {
            Some(error) => Err(ResolutionError::Rpc {
                code: error.code,
                message: error.message,
            }),
            None => Ok(self.result),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcTxOut {
    value: Option<f64>,
    #[serde(default)]
    confirmations: u64,
}

#[derive(Debug, Deserialize)]
struct RpcTx {
    txid: String,
    #[serde(default)]
    vin: Vec<RpcVin>,
    #[serde(default)]
    vout: Vec<RpcVout>,
    blockhash: Option<String>,
    #[serde(default)]
    confirmations: u64,
}

impl RpcTx {
    fn into_tx(self) -> Result<Tx, ResolutionError> {
        let inputs = self
            .vin
            .into_iter()
            .filter_map(|vin| match (vin.txid, vin.vout) {
                (Some(txid), Some(vout)) => Some(OutPoint::new(txid, vout)),
                _ => None,
            })
            .collect();
        let outputs = self
            .vout
            .into_iter()
            .map(RpcVout::into_output)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Tx { id: self.txid, inputs, outputs })
    }
}

#[derive(Debug, Deserialize)]
struct RpcVin {
    txid: Option<String>,
    vout: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RpcVout {
    value: Option<f64>,
    n: u32,
    #[serde(rename = "scriptPubKey")]
    script_pub_key: RpcScriptPubKey,
}

impl RpcVout {
    fn into_output(self) -> Result<TxOutput, ResolutionError> {
        let script = self.script_pub_key;
        let kind = match script.kind.as_str() {
            "nulldata" => OutputKind::Data(script.data_payload()?),
            "pubkeyhash" | "scripthash" | "witness_v0_keyhash" | "witness_v0_scripthash"
            | "witness_v1_taproot" | "pubkey" | "multisig" => OutputKind::Value,
            other => OutputKind::Other(other.to_string()),
        };

        // Older nodes report `addresses`, newer ones a single `address`.
        let mut addresses = script.addresses;
        if let Some(address) = script.address {
            if !addresses.contains(&address) {
                addresses.insert(0, address);
            }
        }

        Ok(TxOutput {
            index: self.n,
            kind,
            value: self.value,
            addresses,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RpcScriptPubKey {
    #[serde(default)]
    asm: String,
    #[serde(default)]
    hex: String,
    #[serde(rename = "type", default)]
    kind: String,
    address: Option<String>,
    #[serde(default)]
    addresses: Vec<String>,
}

impl RpcScriptPubKey {
    /// Bytes pushed after OP_RETURN
    fn data_payload(&self) -> Result<Vec<u8>, ResolutionError> {
        // The asm form shows small pushes as decimal numbers, so only trust it
        // when the pushed token is hex.
        if let Some(token) = self
            .asm
            .strip_prefix("OP_RETURN")
            .and_then(|rest| rest.split_whitespace().next())
        {
            if let Ok(payload) = hex::decode(token) {
                return Ok(payload);
            }
        }
        payload_from_script(&hex::decode(&self.hex)?)
    }
}

/// Extracts the pushed bytes from a raw `OP_RETURN <push>` script
fn payload_from_script(script: &[u8]) -> Result<Vec<u8>, ResolutionError> {
    let malformed = || ResolutionError::UnexpectedResponse("malformed OP_RETURN script".to_string());

    match script {
        [] => Err(malformed()),
        [OP_RETURN] => Ok(Vec::new()),
        [OP_RETURN, opcode, rest @ ..] => {
            let (len, body) = match *opcode {
                n @ 0x01..=0x4b => (usize::from(n), rest),
                OP_PUSHDATA1 => {
                    let (len, body) = rest.split_first().ok_or_else(malformed)?;
                    (usize::from(*len), body)
                }
                OP_PUSHDATA2 if rest.len() >= 2 => {
                    (usize::from(u16::from_le_bytes([rest[0], rest[1]])), &rest[2..])
                }
                OP_PUSHDATA4 if rest.len() >= 4 => {
                    let len = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]);
                    (len as usize, &rest[4..])
                }
                _ => return Err(malformed()),
            };
            body.get(..len).map(<[u8]>::to_vec).ok_or_else(malformed)
        }
        _ => Err(malformed()),
    }
}

#[derive(Debug, Deserialize)]
struct RpcBlock {
    hash: String,
    height: u32,
    tx: Vec<RpcBlockTx>,
    nextblockhash: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RpcBlockTx {
    Id(String),
    Full(RpcTx),
}

impl RpcBlock {
    fn into_block(self) -> Result<Block, ResolutionError> {
        let transactions = self
            .tx
            .into_iter()
            .map(|tx| match tx {
                RpcBlockTx::Id(id) => Ok(Tx {
                    id,
                    inputs: Vec::new(),
                    outputs: Vec::new(),
                }),
                RpcBlockTx::Full(tx) => tx.into_tx(),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Block {
            hash: self.hash,
            height: self.height,
            transactions,
            next_block_hash: self.nextblockhash,
        })
    }
}
