use crate::datastream::Granularity;
use crate::domain::model::{Record, RunReport, TransformResult};
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
}

/// Monitoring settings the pipeline needs.
pub trait ConfigProvider: Send + Sync {
    fn telemetry_url(&self) -> &str;
    fn concurrent_requests(&self) -> usize;
    fn timeout_seconds(&self) -> u64;
    fn highest_granularity(&self) -> Granularity;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<Vec<Record>>;
    async fn transform(&self, data: Vec<Record>) -> Result<TransformResult>;
    async fn load(&self, result: TransformResult) -> Result<RunReport>;
}
