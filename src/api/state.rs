use std::sync::Arc;
use std::time::Duration;

use crate::aggregate::Aggregator;
use crate::cache::ResponseCache;
use crate::history::RankingHistoryBuilder;
use crate::models::MergePolicy;
use crate::rating::{RatingUpdater, SelectionRecorder};
use crate::storage::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub cache: Arc<ResponseCache>,
    pub aggregator: Aggregator,
    pub updater: Arc<RatingUpdater>,
    pub recorder: Arc<SelectionRecorder>,
    pub history: Arc<RankingHistoryBuilder>,
    pub cors_origin: String,
}

impl AppState {
    /// Wire every service around one store and one cache.
    pub fn new(store: Arc<dyn Store>, merge_policy: MergePolicy, cache_ttl: Duration) -> Self {
        Self {
            cache: Arc::new(ResponseCache::new(cache_ttl)),
            aggregator: Aggregator::new(store.clone()),
            updater: Arc::new(RatingUpdater::new(store.clone(), merge_policy)),
            recorder: Arc::new(SelectionRecorder::new(store.clone())),
            history: Arc::new(RankingHistoryBuilder::new(store.clone())),
            cors_origin: "*".to_string(),
            store,
        }
    }

    pub fn with_cors_origin(mut self, origin: impl Into<String>) -> Self {
        self.cors_origin = origin.into();
        self
    }
}
