use crate::core::etl::EtlEngine;
use crate::domain::model::{PipelineReport, StageResult};
use crate::domain::ports::Pipeline;
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;
use async_trait::async_trait;
use std::time::Instant;

/// 可放進序列的步驟
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;
    async fn run_stage(&self) -> Result<PipelineReport>;
}

#[async_trait]
impl<P: Pipeline> Stage for EtlEngine<P> {
    fn name(&self) -> &str {
        EtlEngine::name(self)
    }

    async fn run_stage(&self) -> Result<PipelineReport> {
        self.run().await
    }
}

/// 依序執行多個步驟，遇到第一個錯誤即停止
pub struct PipelineSequence {
    stages: Vec<Box<dyn Stage>>,
    monitor: Option<SystemMonitor>,
    execution_id: String,
}

impl PipelineSequence {
    pub fn new(execution_id: String) -> Self {
        Self {
            stages: Vec::new(),
            monitor: None,
            execution_id,
        }
    }

    /// 啟用或停用系統監控
    pub fn with_monitoring(mut self, enabled: bool) -> Self {
        self.monitor = enabled.then(|| SystemMonitor::new(true));
        self
    }

    pub fn add_stage(&mut self, stage: Box<dyn Stage>) {
        self.stages.push(stage);
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub async fn execute_all(&self) -> Result<Vec<StageResult>> {
        if self.is_empty() {
            tracing::warn!("⚠️ Sequence {} has no steps", self.execution_id);
        }
        tracing::info!(
            "🚀 Starting sequence {} with {} steps",
            self.execution_id,
            self.len()
        );
        if let Some(monitor) = &self.monitor {
            monitor.log_stats("Sequence started");
        }

        let mut results = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            let start_time = Instant::now();
            match stage.run_stage().await {
                Ok(report) => {
                    let duration = start_time.elapsed();
                    tracing::info!("✅ Step executed: {} (duration: {:?})", stage.name(), duration);
                    results.push(StageResult { report, duration });
                }
                Err(e) => {
                    tracing::error!("❌ Step {} failed: {}", stage.name(), e);
                    tracing::error!(
                        "⏹️ Stopping sequence {} after {} completed steps",
                        self.execution_id,
                        results.len()
                    );
                    return Err(e);
                }
            }
        }

        if let Some(monitor) = &self.monitor {
            monitor.log_stats("Sequence completed");
            monitor.log_final_stats();
        }
        tracing::info!("{}", Self::summary(&results));
        Ok(results)
    }

    pub fn summary(results: &[StageResult]) -> String {
        let mut lines = vec![format!("📋 {} steps completed", results.len())];
        for result in results {
            let report = &result.report;
            lines.push(format!(
                "  {}: {} processed, {} skipped, {} failed in {:.1}s",
                report.pipeline,
                report.processed,
                report.skipped,
                report.failed.len(),
                result.duration.as_secs_f64()
            ));
        }
        lines.join("\n")
    }
}
