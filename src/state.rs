use std::sync::Arc;

use crate::infrastructure::queue::JobPublisher;
use crate::modules::download::repository::DownloadRepository;

/// Collaborators shared by every request handler. Handlers keep no other state.
#[derive(Clone)]
pub struct AppState {
    pub downloads: Arc<dyn DownloadRepository>,
    pub jobs: Arc<dyn JobPublisher>,
}

impl AppState {
    pub fn new(downloads: Arc<dyn DownloadRepository>, jobs: Arc<dyn JobPublisher>) -> Self {
        Self { downloads, jobs }
    }
}
