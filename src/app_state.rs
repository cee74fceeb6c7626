use std::sync::Arc;
use std::time::Duration;

use crate::{
    analyzer::CodeAnalyzer, cache::ContextCache, config::AppConfig, github::GithubClient,
    llm::LlmClient,
};

#[derive(Clone)]
pub struct AppState {
    pub analyzer: CodeAnalyzer,
    pub github: GithubClient,
    pub cache: ContextCache,
}

impl AppState {
    pub fn new(config: &AppConfig, llm: Arc<dyn LlmClient>) -> anyhow::Result<Self> {
        Ok(Self {
            analyzer: CodeAnalyzer::new(llm, config),
            github: GithubClient::from_config(config)?,
            cache: ContextCache::new(Duration::from_secs(config.cache_ttl_secs)),
        })
    }
}
