use async_trait::async_trait;
use scheduler_domain::{RunEvent, RunEventSink};

use super::{MetricsCollector, StructuredLogger};

/// 把运行事件写入结构化日志和指标
pub struct ObservabilityEventSink {
    metrics: Option<MetricsCollector>,
}

impl ObservabilityEventSink {
    pub fn new(metrics_enabled: bool) -> Self {
        Self {
            metrics: metrics_enabled.then(MetricsCollector::new),
        }
    }
}

#[async_trait]
impl RunEventSink for ObservabilityEventSink {
    async fn emit(&self, event: &RunEvent) {
        StructuredLogger::log_run_event(event);
        if let Some(metrics) = &self.metrics {
            metrics.record_run(event);
        }
    }
}
