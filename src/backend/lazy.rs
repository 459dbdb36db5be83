use crate::Result;
use async_trait::async_trait;
use std::time::Instant;
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// One-time setup of a heavyweight local model.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    type Model: Send + Sync;

    fn name(&self) -> &str;

    async fn load(&self) -> Result<Self::Model>;
}

/// Loads its model on first use, at most once per process.
///
/// Concurrent first callers wait on the same initialisation and never see a
/// partially built model. A failed load leaves the cell empty so the next call
/// tries again. Every instance owns its own guard, so loading one backend never
/// blocks callers of another.
pub struct LazyBackend<L: ModelLoader> {
    loader: L,
    model: OnceCell<L::Model>,
}

impl<L: ModelLoader> LazyBackend<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            model: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.loader.name()
    }

    pub fn is_loaded(&self) -> bool {
        self.model.initialized()
    }

    pub async fn get(&self) -> Result<&L::Model> {
        if let Some(model) = self.model.get() {
            return Ok(model);
        }

        self.model
            .get_or_try_init(|| async {
                info!("Loading local backend '{}'", self.loader.name());
                let started = Instant::now();
                match self.loader.load().await {
                    Ok(model) => {
                        info!(
                            "Local backend '{}' loaded in {:?}",
                            self.loader.name(),
                            started.elapsed()
                        );
                        Ok(model)
                    }
                    Err(e) => {
                        warn!("Loading local backend '{}' failed: {}", self.loader.name(), e);
                        Err(e)
                    }
                }
            })
            .await
    }
}
