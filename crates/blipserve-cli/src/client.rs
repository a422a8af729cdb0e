use anyhow::{bail, Context, Result};
use blipserve_core::{IOName, Tensor};
use tracing::debug;

use crate::protocol::{ErrorBody, InferRequestBody, InferResponseBody, RequestedOutput, WireTensor};

pub struct InferenceClient {
    http: reqwest::Client,
    base: String,
}

impl InferenceClient {
    pub fn new(url: &str) -> Result<Self> {
        let url = url.trim().trim_end_matches('/');
        let base = if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("http://{url}")
        };
        let http = reqwest::Client::builder()
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { http, base })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    pub async fn model_ready(&self, model: &str) -> Result<bool> {
        let url = format!("{}/v2/models/{model}/ready", self.base);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?;
        Ok(resp.status().is_success())
    }

    pub async fn infer(
        &self,
        model: &str,
        request_id: &str,
        inputs: &[(IOName, Tensor)],
        outputs: &[&str],
    ) -> Result<Vec<(IOName, Tensor)>> {
        let body = InferRequestBody {
            id: Some(request_id.to_string()),
            inputs: inputs
                .iter()
                .map(|(name, tensor)| WireTensor::from_tensor(name, tensor))
                .collect::<Result<_>>()?,
            outputs: outputs
                .iter()
                .map(|name| RequestedOutput {
                    name: name.to_string(),
                })
                .collect(),
        };

        let url = format!("{}/v2/models/{model}/infer", self.base);
        debug!(%url, inputs = inputs.len(), "sending inference request");
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {url} failed"))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let reason = serde_json::from_str::<ErrorBody>(&text)
                .map(|e| e.error)
                .unwrap_or(text);
            bail!("inference on {model} failed with {status}: {reason}");
        }

        let body: InferResponseBody = resp
            .json()
            .await
            .context("failed to parse inference response")?;
        body.outputs
            .into_iter()
            .map(WireTensor::into_tensor)
            .collect()
    }
}
