//! JSON-RPC ledger client.
//!
//! Methods are namespaced by the configured module name:
//! - `<module>_getOwnedLists(owner, packageId)` returns every record the owner holds
//! - `<module>_publishList(payload, packageId, signature)`
//! - `<module>_updateVersion(id, version, packageId, signature)` returns the record
//!
//! Writes are signed with ed25519 over the JSON encoding of the params that
//! precede the signature.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::{LedgerClient, Signer};
use crate::error::{Result, TodoError};
use crate::models::{LedgerRecord, PublishPayload, PublishReceipt, TodoList};
use crate::network::NetworkConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const CODE_NOT_FOUND: i64 = -32001;
const CODE_UNAUTHORIZED: i64 = -32002;
const CODE_INVALID: i64 = -32003;
const CODE_RATE_LIMITED: i64 = -32005;

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

impl RpcError {
    fn into_todo_error(self, method: &str) -> TodoError {
        let message = format!("{}: {}", method, self.message);
        match self.code {
            CODE_NOT_FOUND => TodoError::not_found("ledger record", message),
            CODE_UNAUTHORIZED => TodoError::Auth(message),
            CODE_INVALID => TodoError::Validation(message),
            CODE_RATE_LIMITED => TodoError::TransientNetwork(message),
            _ => TodoError::Remote(message),
        }
    }
}

/// A [`LedgerClient`] speaking JSON-RPC 2.0 over HTTP.
#[derive(Debug)]
pub struct RpcLedgerClient {
    client: reqwest::Client,
    rpc_url: String,
    package_id: String,
    module: String,
    owner: String,
    signer: Option<Signer>,
    next_id: AtomicU64,
}

impl RpcLedgerClient {
    pub fn new(
        rpc_url: String,
        package_id: String,
        module: String,
        owner: String,
        signer: Option<Signer>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TodoError::Remote(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            rpc_url,
            package_id,
            module,
            owner,
            signer,
            next_id: AtomicU64::new(1),
        })
    }

    /// Builds a client from network settings and the caller's account.
    ///
    /// A missing key is allowed here; writes fail later with an auth error.
    /// A malformed key fails immediately.
    pub fn from_config(
        config: &NetworkConfig,
        owner: &str,
        private_key: Option<&str>,
    ) -> Result<Self> {
        let signer = private_key.map(Signer::from_hex).transpose()?;
        Self::new(
            config.require_rpc_url()?.to_string(),
            config.require_package_id()?.to_string(),
            config.module.clone(),
            owner.to_string(),
            signer,
        )
    }

    fn method(&self, name: &str) -> String {
        format!("{}_{}", self.module, name)
    }

    fn signer(&self) -> Result<&Signer> {
        self.signer
            .as_ref()
            .ok_or_else(TodoError::missing_credential)
    }

    /// Appends a signature over `params` to the params array.
    fn signed_params(&self, mut params: Vec<Value>) -> Result<Value> {
        let signer = self.signer()?;
        let message = serde_json::to_vec(&params)?;
        params.push(serde_json::to_value(signer.sign(&message))?);
        Ok(Value::Array(params))
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(TodoError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TodoError::from_status(status, "ledger method", method));
        }

        let body: RpcResponse<T> = response.json().await.map_err(TodoError::from_transport)?;
        decode_response(method, body)
    }
}

fn decode_response<T>(method: &str, body: RpcResponse<T>) -> Result<T> {
    match (body.result, body.error) {
        (_, Some(error)) => Err(error.into_todo_error(method)),
        (Some(result), None) => Ok(result),
        (None, None) => Err(TodoError::Remote(format!("{}: empty response", method))),
    }
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    async fn publish(&self, name: &str, list: &TodoList) -> Result<PublishReceipt> {
        let mut payload = PublishPayload::from_list(list);
        payload.name = name.to_string();
        payload.owner = self.owner.clone();

        let params = self.signed_params(vec![
            serde_json::to_value(&payload)?,
            Value::String(self.package_id.clone()),
        ])?;

        let method = self.method("publishList");
        let receipt: PublishReceipt = self.call(&method, params).await?;
        debug!(list = name, digest = %receipt.digest, gas = receipt.gas_used, "published list");
        Ok(receipt)
    }

    async fn get_state(&self, name: &str) -> Result<Option<LedgerRecord>> {
        let method = self.method("getOwnedLists");
        let records: Vec<LedgerRecord> = self
            .call(&method, json!([self.owner, self.package_id]))
            .await?;
        Ok(records.into_iter().find(|r| r.name == name))
    }

    async fn update_version(&self, id: &str, new_version: u64) -> Result<()> {
        let params = self.signed_params(vec![
            Value::String(id.to_string()),
            json!(new_version),
            Value::String(self.package_id.clone()),
        ])?;

        let method = self.method("updateVersion");
        let record: LedgerRecord = self.call(&method, params).await?;
        debug!(id, version = record.version, "updated ledger version");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::network::{Network, NetworkConfig};

    const SEED: &str = "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";

    fn client(signer: Option<Signer>) -> RpcLedgerClient {
        RpcLedgerClient::new(
            "http://127.0.0.1:9".into(),
            "0x42".into(),
            "todo_list".into(),
            "0xabc".into(),
            signer,
        )
        .unwrap()
    }

    #[test]
    fn test_method_names() {
        let client = client(None);
        assert_eq!(client.method("publishList"), "todo_list_publishList");
    }

    #[tokio::test]
    async fn test_publish_without_signer_is_auth_error() {
        let client = client(None);
        let list = TodoList::new("work", "0xabc");
        let err = client.publish("work", &list).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);

        let err = client.update_version("id", 2).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
    }

    #[test]
    fn test_signed_params_append_signature() {
        let client = client(Some(Signer::from_hex(SEED).unwrap()));
        let params = client
            .signed_params(vec![json!("id"), json!(3)])
            .unwrap();
        let array = params.as_array().unwrap();
        assert_eq!(array.len(), 3);
        assert!(array[2].get("signature").is_some());
        assert!(array[2].get("publicKey").is_some());
    }

    #[test]
    fn test_error_code_mapping() {
        let decode = |code| {
            let body: RpcResponse<Value> = RpcResponse {
                result: None,
                error: Some(RpcError {
                    code,
                    message: "nope".into(),
                }),
            };
            decode_response("m", body).unwrap_err().kind()
        };
        assert_eq!(decode(CODE_NOT_FOUND), ErrorKind::NotFound);
        assert_eq!(decode(CODE_UNAUTHORIZED), ErrorKind::Auth);
        assert_eq!(decode(CODE_INVALID), ErrorKind::Validation);
        assert_eq!(decode(CODE_RATE_LIMITED), ErrorKind::TransientNetwork);
        assert_eq!(decode(-32603), ErrorKind::Remote);
    }

    #[test]
    fn test_decode_result() {
        let body: RpcResponse<PublishReceipt> =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":{"digest":"D","gasUsed":7}}"#)
                .unwrap();
        let receipt = decode_response("m", body).unwrap();
        assert_eq!(receipt.digest, "D");
        assert_eq!(receipt.gas_used, 7);
    }

    #[test]
    fn test_from_config() {
        let mut config = NetworkConfig::for_network(Network::Local);
        assert!(RpcLedgerClient::from_config(&config, "0xabc", None).is_err());

        config.package_id = Some("0x42".into());
        assert!(RpcLedgerClient::from_config(&config, "0xabc", None).is_ok());

        let err = RpcLedgerClient::from_config(&config, "0xabc", Some("bad")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
    }
}
