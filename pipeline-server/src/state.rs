//! Shared application state, threaded through every handler via `axum::extract::State`.

use std::sync::Arc;

use pipeline_core::{Config, Extractor, ProgressBus, Scheduler};

use crate::rate_limit::RateLimiters;

#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    pub bus: Arc<ProgressBus>,
    pub extractor: Arc<Extractor>,
    pub config: Arc<Config>,
    pub rate_limiters: Arc<RateLimiters>,
    pub http_client: reqwest::Client,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let extractor = Extractor::new(
            config.extractor_path.clone(),
            config.transcoder_path.clone(),
            config.download_timeout,
            config.convert_timeout,
        );
        let rate_limiters = RateLimiters::from_config(&config);
        Self {
            scheduler: Arc::new(Scheduler::new()),
            bus: Arc::new(ProgressBus::new()),
            extractor: Arc::new(extractor),
            config: Arc::new(config),
            rate_limiters: Arc::new(rate_limiters),
            http_client: reqwest::Client::new(),
        }
    }
}
