//! Thin `reqwest` wrapper over the collector's introspection surface.
//!
//! Mirrors the shapes `pulseone-server`'s handlers actually return rather
//! than sharing a types crate with it: the CLI only needs read access to
//! those shapes, not the server's internal state.

use pulseone_contracts::{ConnectionState, StatisticsSnapshot};
use pulseone_model::{DataPoint, Device, DeviceId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct DeviceSummary {
    pub device: Device,
    pub running: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeviceStats {
    pub connection_state: ConnectionState,
    pub statistics: StatisticsSnapshot,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Client {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> anyhow::Result<T> {
        let url = format!("{}{path}", self.base_url);
        let response = self.http.get(&url).send().await?;
        Self::into_body(response).await
    }

    async fn post_empty(&self, path: &str) -> anyhow::Result<serde_json::Value> {
        let url = format!("{}{path}", self.base_url);
        let response = self.http.post(&url).send().await?;
        Self::into_body(response).await
    }

    async fn into_body<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> anyhow::Result<T> {
        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorBody>(&bytes)
                .map(|body| body.error.message)
                .unwrap_or_else(|_| status.to_string());
            anyhow::bail!("{status}: {message}");
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn list_devices(&self) -> anyhow::Result<Vec<DeviceSummary>> {
        self.get("/devices").await
    }

    pub async fn get_device(&self, id: DeviceId) -> anyhow::Result<DeviceSummary> {
        self.get(&format!("/devices/{id}")).await
    }

    pub async fn get_points(&self, id: DeviceId) -> anyhow::Result<Vec<DataPoint>> {
        self.get(&format!("/devices/{id}/points")).await
    }

    pub async fn get_stats(&self, id: DeviceId) -> anyhow::Result<DeviceStats> {
        self.get(&format!("/devices/{id}/stats")).await
    }

    pub async fn pause(&self, id: DeviceId) -> anyhow::Result<()> {
        self.post_empty(&format!("/devices/{id}/pause")).await.map(drop)
    }

    pub async fn resume(&self, id: DeviceId) -> anyhow::Result<()> {
        self.post_empty(&format!("/devices/{id}/resume")).await.map(drop)
    }

    pub async fn reload(&self, id: DeviceId) -> anyhow::Result<()> {
        self.post_empty(&format!("/devices/{id}/reload")).await.map(drop)
    }
}
