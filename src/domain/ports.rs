use crate::domain::model::PipelineReport;
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    fn exists(&self, path: &str) -> impl std::future::Future<Output = bool> + Send;
    /// 給日誌與中繼資料使用的完整位置
    fn locate(&self, path: &str) -> String;
}

/// 每個練習步驟都是一條 extract → transform → load 管道
#[async_trait]
pub trait Pipeline: Send + Sync {
    type Extracted: Send + 'static;
    type Transformed: Send + 'static;

    fn name(&self) -> &str;
    async fn extract(&self) -> Result<Self::Extracted>;
    async fn transform(&self, data: Self::Extracted) -> Result<Self::Transformed>;
    async fn load(&self, result: Self::Transformed) -> Result<PipelineReport>;
}
