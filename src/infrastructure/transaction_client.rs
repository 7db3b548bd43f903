use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use crate::domain::order::TransactionPayload;
use crate::domain::ports::{GatewayError, TransactionGateway};

/// Posts sales to the conference-management `addtxn` endpoint.
pub struct HttpTransactionGateway {
    client: Client,
    url: String,
}

impl HttpTransactionGateway {
    pub fn new(url: String, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl TransactionGateway for HttpTransactionGateway {
    async fn submit(
        &self,
        payload: &TransactionPayload,
    ) -> Result<serde_json::Value, GatewayError> {
        let response = self
            .client
            .post(&self.url)
            .json(payload)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            log::warn!(
                "transaction {} refused with status {}: {}",
                payload.txn_num,
                status,
                body
            );
            return Err(GatewayError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        serde_json::from_slice(&body).map_err(|e| GatewayError::UnreadableBody(e.to_string()))
    }
}
