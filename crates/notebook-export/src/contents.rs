use async_trait::async_trait;
use jupyter_remote::{ContentsApi, ContentsModel, GetOptions, NewUntitledRequest, SaveRequest};

/// A filesystem-like namespace on a remote server.
#[async_trait]
pub trait ContentsManager: Send + Sync {
    async fn get(&self, path: &str, options: GetOptions) -> anyhow::Result<ContentsModel>;

    async fn save(&self, path: &str, request: SaveRequest) -> anyhow::Result<ContentsModel>;

    /// Create an untitled entry in `dir` and return its model.
    async fn new_untitled(
        &self,
        dir: &str,
        request: NewUntitledRequest,
    ) -> anyhow::Result<ContentsModel>;

    async fn rename(&self, from: &str, to: &str) -> anyhow::Result<ContentsModel>;

    async fn delete(&self, path: &str) -> anyhow::Result<()>;
}

#[async_trait]
impl ContentsManager for ContentsApi {
    async fn get(&self, path: &str, options: GetOptions) -> anyhow::Result<ContentsModel> {
        ContentsApi::get(self, path, options).await
    }

    async fn save(&self, path: &str, request: SaveRequest) -> anyhow::Result<ContentsModel> {
        ContentsApi::save(self, path, &request).await
    }

    async fn new_untitled(
        &self,
        dir: &str,
        request: NewUntitledRequest,
    ) -> anyhow::Result<ContentsModel> {
        ContentsApi::new_untitled(self, dir, &request).await
    }

    async fn rename(&self, from: &str, to: &str) -> anyhow::Result<ContentsModel> {
        ContentsApi::rename(self, from, to).await
    }

    async fn delete(&self, path: &str) -> anyhow::Result<()> {
        ContentsApi::delete(self, path).await
    }
}
