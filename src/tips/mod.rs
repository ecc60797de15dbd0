pub mod dto;

use std::env;

use async_trait::async_trait;
use reqwest::Client;
use tracing::warn;

use crate::error::AppError;

pub use dto::Tip;

#[derive(Clone, Debug)]
pub struct TipsConfig {
    pub base_url: String,
}

impl TipsConfig {
    pub fn new_from_env() -> Result<Self, AppError> {
        let base_url = env::var("TIPS_BASE_URL")
            .map_err(|_| AppError::BadRequest("TIPS_BASE_URL is not set".to_string()))?;
        Ok(Self { base_url })
    }
}

#[async_trait]
pub trait TipsClient: Send + Sync {
    async fn fetch_tips(&self) -> Result<Vec<Tip>, AppError>;
}

pub struct TipsHttpClient {
    client: Client,
    config: TipsConfig,
}

impl TipsHttpClient {
    pub fn new(config: TipsConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::BadRequest(format!("Failed to build http client: {}", e)))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl TipsClient for TipsHttpClient {
    async fn fetch_tips(&self) -> Result<Vec<Tip>, AppError> {
        let url = format!("{}/tips.json", self.config.base_url.trim_end_matches('/'));

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Tips request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            warn!("tips endpoint returned {}", status);
            return Err(AppError::Upstream(format!("Tips endpoint error {}", status)));
        }

        response
            .json::<Vec<Tip>>()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse tips response: {}", e)))
    }
}

pub struct NoopTipsClient;

#[async_trait]
impl TipsClient for NoopTipsClient {
    async fn fetch_tips(&self) -> Result<Vec<Tip>, AppError> {
        Ok(Vec::new())
    }
}
