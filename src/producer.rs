//! NATS replies carrying prediction responses

use crate::types::response::PredictionResponse;
use anyhow::{Context, Result};
use async_nats::{Client, Subject};
use tracing::debug;

/// Publishes prediction responses on request reply subjects
#[derive(Clone)]
pub struct ResponsePublisher {
    client: Client,
}

impl ResponsePublisher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Serialize a response for the wire
    pub fn encode(response: &PredictionResponse) -> Result<Vec<u8>> {
        serde_json::to_vec(response).context("Failed to serialize prediction response")
    }

    /// Reply to a single request
    pub async fn reply(&self, reply_to: Subject, response: &PredictionResponse) -> Result<()> {
        let payload = Self::encode(response)?;

        self.client
            .publish(reply_to.clone(), payload.into())
            .await
            .with_context(|| format!("Failed to publish reply on {}", reply_to))?;

        debug!(
            reply_to = %reply_to,
            success = response.is_success(),
            "Published prediction response"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_wire_shape() {
        let payload =
            ResponsePublisher::encode(&PredictionResponse::from_probability(0.25, 0.5)).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();

        assert_eq!(value["prediction"], 0);
        assert_eq!(value["probability"][1], 0.25);
    }
}
