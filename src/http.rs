// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! HTTP implementations of the remote traits.
//!
//! Both services speak JSON over `POST` and wrap every reply in the same
//! envelope:
//!
//! ```text
//! {"result": true, "code": 0, "message": "", "data": { ... }}
//! ```
//!
//! | Call | Route |
//! |------|-------|
//! | read | `{source_url}/synchronize/read` |
//! | push | `{target_url}/synchronize/{instance,model,association}` |
//! | clear | `{target_url}/synchronize/clear` |
//!
//! A non-2xx status or an unreadable body is a [`RemoteError`]. So is a read
//! envelope with `result: false`, since the engine has no page to work with.
//! A push or clear envelope with `result: false` is a well-formed rejection
//! and comes back as `accepted: false`.

use crate::config::RemoteConfig;
use crate::error::{ReplicationError, Result};
use crate::remote::{
    BoxFuture, ClearStaleDataRequest, ClearStaleDataResponse, PushRequest, PushResponse,
    ReadRequest, ReadResponse, RemoteError, RemoteResult, SourceRef, TargetRef,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Reply envelope shared by source and target.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Envelope {
    pub result: bool,
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    fn into_data<T: DeserializeOwned + Default>(self) -> RemoteResult<T> {
        if self.data.is_null() {
            return Ok(T::default());
        }
        serde_json::from_value(self.data)
            .map_err(|e| RemoteError(format!("invalid response data: {}", e)))
    }
}

fn build_client(config: &RemoteConfig) -> Result<Client> {
    Client::builder()
        .timeout(config.request_timeout_duration())
        .connect_timeout(config.connect_timeout_duration())
        .build()
        .map_err(|e| ReplicationError::Config(format!("failed to build HTTP client: {}", e)))
}

async fn post_envelope<B: Serialize + ?Sized>(
    client: &Client,
    url: &str,
    body: &B,
) -> RemoteResult<Envelope> {
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| RemoteError(format!("POST {} failed: {}", url, e)))?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(RemoteError(format!("POST {} returned {}: {}", url, status, text)));
    }

    response
        .json::<Envelope>()
        .await
        .map_err(|e| RemoteError(format!("POST {} returned an invalid envelope: {}", url, e)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// HttpSource
// ═══════════════════════════════════════════════════════════════════════════════

/// Reads pages from the source CMDB.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
    read_url: String,
}

impl HttpSource {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config)?,
            read_url: format!("{}/synchronize/read", config.source_url.trim_end_matches('/')),
        })
    }
}

impl SourceRef for HttpSource {
    fn read(&self, request: ReadRequest) -> BoxFuture<'_, ReadResponse> {
        Box::pin(async move {
            let envelope = post_envelope(&self.client, &self.read_url, &request).await?;
            if !envelope.result {
                return Err(RemoteError(format!(
                    "read {} refused (code {}): {}",
                    request.classify, envelope.code, envelope.message
                )));
            }
            envelope.into_data()
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HttpTarget
// ═══════════════════════════════════════════════════════════════════════════════

/// Writes pages to, and clears stale rows from, the target CMDB.
#[derive(Debug, Clone)]
pub struct HttpTarget {
    client: Client,
    base_url: String,
}

impl HttpTarget {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config)?,
            base_url: format!("{}/synchronize", config.target_url.trim_end_matches('/')),
        })
    }
}

impl TargetRef for HttpTarget {
    fn push(&self, request: PushRequest) -> BoxFuture<'_, PushResponse> {
        Box::pin(async move {
            let url = format!("{}/{}", self.base_url, request.data_type.as_str());
            let envelope = post_envelope(&self.client, &url, &request).await?;
            debug!(
                url = %url,
                result = envelope.result,
                code = envelope.code,
                "Push answered"
            );

            let (result, code, message) = (envelope.result, envelope.code, envelope.message.clone());
            let mut response: PushResponse = envelope.into_data()?;
            response.accepted = result && response.exceptions.is_empty();
            if response.code == 0 {
                response.code = code;
            }
            if response.message.is_empty() {
                response.message = message;
            }
            Ok(response)
        })
    }

    fn clear_stale_data(
        &self,
        request: ClearStaleDataRequest,
    ) -> BoxFuture<'_, ClearStaleDataResponse> {
        Box::pin(async move {
            let url = format!("{}/clear", self.base_url);
            let envelope = post_envelope(&self.client, &url, &request).await?;
            Ok(ClearStaleDataResponse {
                accepted: envelope.result,
                code: envelope.code,
                message: envelope.message,
            })
        })
    }
}
