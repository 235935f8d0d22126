//! An environment hosted by an external server.
//!
//! The server is expected to expose two endpoints:
//! - `POST {base_url}/reset` -- body `{"goal": "..."}`, returns
//!   `{"observation": "..."}`
//! - `POST {base_url}/step`  -- body `{"action": "..."}`, returns
//!   `{"observation": "...", "done": bool, "success": bool}`

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use super::traits::{EnvResponse, Environment};

#[derive(Debug)]
pub struct HttpEnv {
    base_url: String,
    http: reqwest::Client,
    done: bool,
}

#[derive(Debug, Deserialize)]
struct ResetResponse {
    observation: String,
}

impl HttpEnv {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            done: false,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T> {
        let url = format!("{}/{path}", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("failed to reach environment server at {url}"))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("environment server returned {status} for {path}: {text}");
        }

        resp.json()
            .await
            .with_context(|| format!("failed to parse environment {path} response"))
    }
}

impl Environment for HttpEnv {
    async fn reset(&mut self, goal: &str) -> Result<String> {
        self.done = false;
        let resp: ResetResponse = self
            .post("reset", serde_json::json!({ "goal": goal }))
            .await?;
        debug!(goal = %goal, "http env reset");
        Ok(resp.observation)
    }

    async fn step(&mut self, action: &str) -> Result<EnvResponse> {
        if self.done {
            anyhow::bail!("cannot step in a terminated episode");
        }
        let resp: EnvResponse = self
            .post("step", serde_json::json!({ "action": action }))
            .await?;
        self.done = resp.done;
        Ok(resp)
    }
}
