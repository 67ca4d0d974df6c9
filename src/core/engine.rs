use crate::core::Pipeline;
use crate::domain::model::RunReport;
use crate::utils::error::Result;
use crate::utils::monitor::ProcessMonitor;
use std::time::{Duration, Instant};

/// Drives a pipeline through its extract, transform and load phases.
pub struct MonitorEngine<P: Pipeline> {
    pipeline: P,
    monitor: ProcessMonitor,
}

impl<P: Pipeline> MonitorEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self::new_with_monitoring(pipeline, false)
    }

    pub fn new_with_monitoring(pipeline: P, monitoring: bool) -> Self {
        Self {
            pipeline,
            monitor: ProcessMonitor::new(monitoring),
        }
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    pub async fn run(&self) -> Result<RunReport> {
        let started = Instant::now();
        tracing::info!("🚀 Starting monitoring run");
        self.monitor.log_stats("start");

        // Extract
        tracing::info!("📡 Polling nodes...");
        let records = self.pipeline.extract().await?;
        tracing::info!("Fetched telemetry from {} nodes", records.len());
        self.monitor.log_stats("extract");

        // Transform
        tracing::info!("🔄 Building datastream descriptors...");
        let transformed = self.pipeline.transform(records).await?;
        tracing::info!(
            "Built {} descriptors, {} nodes unreachable",
            transformed.descriptors.len(),
            transformed.unreachable.len()
        );
        self.monitor.log_stats("transform");

        // Load
        tracing::info!("💾 Storing datapoints...");
        let report = self.pipeline.load(transformed).await?;
        self.monitor.log_stats("load");

        tracing::info!(
            "✅ Run finished in {:.2?}: {} polled, {} unreachable, {} streams, {} datapoints",
            started.elapsed(),
            report.polled,
            report.unreachable,
            report.streams,
            report.datapoints
        );
        self.monitor.log_final_stats();
        Ok(report)
    }

    /// Runs every `interval` until Ctrl-C. A failed run is logged and the
    /// next one is attempted on schedule.
    pub async fn run_periodic(&self, interval: Duration) -> Result<usize> {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut runs = 0;

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("🛑 Interrupted, stopping after {} runs", runs);
                    return Ok(runs);
                }
                _ = ticker.tick() => {
                    runs += 1;
                    if let Err(e) = self.run().await {
                        tracing::error!("❌ Monitoring run {} failed: {}", runs, e);
                        tracing::info!("💡 {}", e.recovery_suggestion());
                    }
                }
            }
        }
    }
}
