use async_trait::async_trait;

/// Result of a single probe.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    /// The endpoint answered (any status counts), elapsed milliseconds
    Reached(u64),
    /// No answer before the deadline, elapsed milliseconds
    TimedOut(u64),
    /// Transport error: DNS, connection refused, TLS...
    Failed(String),
}

/// Prober: 测量到某个区域端点延迟的接口
///
/// Implementations own their network resources per call, so the scheduler
/// may call `probe` without any extra serialization.
#[async_trait]
pub trait Prober: Sync + Send {
    /// 对给定 URL 发起一次探测
    async fn probe(&self, url: &str) -> ProbeOutcome;
}
