use dashmap::DashMap;
use mongodb::bson::oid::ObjectId;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Registry of in-flight background pipeline runs, keyed by search id.
///
/// Submission enqueues the run here and returns immediately; completion is
/// observed by polling the fetch endpoint. Each job carries a cancellation
/// token so a cancel operation can be added without reshaping the registry;
/// nothing cancels jobs today.
pub struct Jobs {
    running: DashMap<ObjectId, CancellationToken>,
}

impl Jobs {
    pub fn new() -> Jobs {
        Jobs {
            running: DashMap::new(),
        }
    }

    /// Spawn `fut` as the pipeline run for `search_id`. The registry entry is
    /// removed when the run finishes or its token fires.
    pub fn spawn<F>(self: &Arc<Self>, search_id: ObjectId, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        self.running.insert(search_id, token.clone());

        let jobs = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("pipeline job {} cancelled", search_id);
                }
                _ = fut => {}
            }
            jobs.running.remove(&search_id);
        });
    }

    pub fn is_running(&self, search_id: ObjectId) -> bool {
        self.running.contains_key(&search_id)
    }

    pub fn cancel(&self, search_id: ObjectId) -> bool {
        match self.running.get(&search_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.running.len()
    }

    pub fn is_empty(&self) -> bool {
        self.running.is_empty()
    }
}

impl Default for Jobs {
    fn default() -> Self {
        Self::new()
    }
}
