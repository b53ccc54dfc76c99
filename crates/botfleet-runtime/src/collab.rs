//! Collaborator adapters.
//!
//! The generation pipeline is an opaque HTTP service to us; moderation and
//! effect selection ship with lightweight local defaults. All three sit
//! behind the `botfleet-core` traits so handlers never know which is wired.

use std::sync::Arc;

use async_trait::async_trait;

use botfleet_core::config::GenerationConfig;
use botfleet_core::error::{FleetError, Result};
use botfleet_core::rng::RandomSource;
use botfleet_core::traits::{EffectSelector, Generator, Moderator};
use botfleet_core::types::{AgentContext, GeneratedContent, Verdict};

/// Talks to the external generation pipeline over HTTP: one JSON POST per
/// unit of content. Slow and flaky by assumption — the queue's retry policy
/// deals with that, not this adapter.
pub struct HttpGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpGenerator {
    pub fn new(cfg: &GenerationConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: cfg.endpoint.clone(),
            api_key: cfg.api_key.clone(),
        }
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(&self, ctx: &AgentContext) -> Result<GeneratedContent> {
        let mut req = self.client.post(&self.endpoint).json(ctx);
        if !self.api_key.is_empty() {
            req = req.header("Authorization", format!("Bearer {}", self.api_key));
        }
        let resp = req
            .send()
            .await
            .map_err(|e| FleetError::Generation(format!("pipeline unreachable: {e}")))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(FleetError::Generation(format!("pipeline {status}: {body}")));
        }
        resp.json::<GeneratedContent>()
            .await
            .map_err(|e| FleetError::Generation(format!("bad pipeline response: {e}")))
    }
}

/// Term-denylist moderation. An empty list approves everything, which is
/// the right default when a real moderation service is wired upstream in
/// the generation pipeline itself.
#[derive(Default)]
pub struct DenylistModerator {
    terms: Vec<String>,
}

impl DenylistModerator {
    pub fn with_terms(terms: Vec<String>) -> Self {
        Self {
            terms: terms.into_iter().map(|t| t.to_lowercase()).collect(),
        }
    }
}

#[async_trait]
impl Moderator for DenylistModerator {
    async fn moderate(&self, body: &str) -> Result<Verdict> {
        let lower = body.to_lowercase();
        for term in &self.terms {
            if lower.contains(term.as_str()) {
                return Ok(Verdict::reject(format!("denylisted term: {term}")));
            }
        }
        Ok(Verdict::approve())
    }
}

/// Picks a treatment for media posts. Honors a choice already made
/// upstream; otherwise draws one from the configured palette.
pub struct WeightedEffectSelector {
    effects: Vec<String>,
    rng: Arc<RandomSource>,
}

impl WeightedEffectSelector {
    pub fn new(effects: Vec<String>, rng: Arc<RandomSource>) -> Self {
        Self { effects, rng }
    }

    pub fn standard(rng: Arc<RandomSource>) -> Self {
        Self::new(
            ["none", "vhs", "film_grain", "bloom", "lofi"]
                .into_iter()
                .map(String::from)
                .collect(),
            rng,
        )
    }
}

impl EffectSelector for WeightedEffectSelector {
    fn select(&self, content: &GeneratedContent) -> Option<String> {
        if let Some(effect) = &content.chosen_effect {
            return Some(effect.clone());
        }
        if content.media_refs.is_empty() || self.effects.is_empty() {
            return None;
        }
        Some(self.effects[self.rng.index(self.effects.len())].clone())
    }
}
