use crate::domain::model::PipelineReport;
use crate::domain::ports::Pipeline;
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;

pub struct EtlEngine<P: Pipeline> {
    pipeline: P,
    monitor: SystemMonitor,
}

impl<P: Pipeline> EtlEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self::new_with_monitoring(pipeline, false)
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: SystemMonitor::new(monitor_enabled),
        }
    }

    pub fn name(&self) -> &str {
        self.pipeline.name()
    }

    pub async fn run(&self) -> Result<PipelineReport> {
        let name = self.pipeline.name();
        tracing::info!("🚀 Starting {} step", name);
        self.monitor.log_stats("Start");

        tracing::info!("📥 Extracting ({})...", name);
        let extracted = self.pipeline.extract().await?;
        self.monitor.log_stats("Extract");

        tracing::info!("🔄 Transforming ({})...", name);
        let transformed = self.pipeline.transform(extracted).await?;
        self.monitor.log_stats("Transform");

        tracing::info!("💾 Loading ({})...", name);
        let report = self.pipeline.load(transformed).await?;
        self.monitor.log_stats("Load");

        tracing::info!(
            "✅ {} finished: {} processed, {} skipped, {} failed",
            name,
            report.processed,
            report.skipped,
            report.failed.len()
        );
        for output in &report.outputs {
            tracing::debug!("Output: {}", output);
        }
        self.monitor.log_final_stats();

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingPipeline {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Pipeline for CountingPipeline {
        type Extracted = Vec<u32>;
        type Transformed = u32;

        fn name(&self) -> &str {
            "counting"
        }

        async fn extract(&self) -> Result<Vec<u32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![1, 2, 3])
        }

        async fn transform(&self, data: Vec<u32>) -> Result<u32> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(data.iter().sum())
        }

        async fn load(&self, result: u32) -> Result<PipelineReport> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut report = PipelineReport::new(self.name());
            report.processed = result as usize;
            Ok(report)
        }
    }

    #[tokio::test]
    async fn test_runs_all_phases_in_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let engine = EtlEngine::new(CountingPipeline {
            calls: calls.clone(),
        });

        let report = engine.run().await.unwrap();

        assert_eq!(report.pipeline, "counting");
        assert_eq!(report.processed, 6);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
