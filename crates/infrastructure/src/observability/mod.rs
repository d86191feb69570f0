//! Observability module
//!
//! 结构化日志、Prometheus指标，以及把运行事件分发到两者的 [`ObservabilityEventSink`]。

pub mod event_sink;
pub mod metrics_collector;
pub mod structured_logger;

pub use event_sink::ObservabilityEventSink;
pub use metrics_collector::MetricsCollector;
pub use structured_logger::StructuredLogger;
