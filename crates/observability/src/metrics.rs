//! 反馈指标收集模块
//!
//! 记录接收、拒绝、各 sink 写入结果以及 fan-out 延迟。

use metrics::{counter, histogram};
use std::collections::BTreeMap;
use std::time::Duration;

/// 记录接收到的反馈条数
///
/// `mode` 为 `single`、`json_batch` 或 `xml_batch`。
pub fn record_feedback_received(mode: &'static str, records: usize) {
    counter!("feedback_received_total", "mode" => mode).increment(records as u64);
}

/// 记录被拒绝的请求
///
/// `reason` 来自错误类型（如 `unauthorized`、`missing_field`）。
pub fn record_feedback_rejected(reason: &'static str) {
    counter!("feedback_rejected_total", "reason" => reason).increment(1);
}

/// 记录单个 sink 的写入结果
pub fn record_sink_write(sink_name: &str, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    counter!(
        "feedback_sink_writes_total",
        "sink" => sink_name.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// 记录部分 sink 失败的记录
pub fn record_fanout_partial() {
    counter!("feedback_fanout_partial_total").increment(1);
}

/// 记录一次 fan-out 的总耗时
pub fn record_fanout_latency(elapsed: Duration) {
    histogram!("feedback_fanout_latency_ms").record(elapsed.as_secs_f64() * 1000.0);
}

/// 投递指标聚合器
///
/// 在内存中聚合投递结果，便于批量导入结束时输出摘要。
#[derive(Debug, Clone, Default)]
pub struct DeliveryAggregator {
    /// 总记录数
    pub total_records: u64,

    /// 所有 sink 都成功的记录数
    pub fully_stored: u64,

    /// 部分 sink 失败的记录数
    pub partially_stored: u64,

    /// 没有任何 sink 成功的记录数
    pub not_stored: u64,

    /// fan-out 延迟统计 (毫秒)
    pub latency_stats: RunningStats,

    /// 各 sink 失败次数
    pub sink_failures: BTreeMap<String, u64>,
}

impl DeliveryAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新聚合统计
    pub fn update<'a>(
        &mut self,
        stored: usize,
        failed_sinks: impl IntoIterator<Item = &'a str>,
        latency: Duration,
    ) {
        self.total_records += 1;

        let mut failed = 0usize;
        for sink in failed_sinks {
            failed += 1;
            *self.sink_failures.entry(sink.to_string()).or_insert(0) += 1;
        }

        match (stored, failed) {
            (0, _) => self.not_stored += 1,
            (_, 0) => self.fully_stored += 1,
            _ => self.partially_stored += 1,
        }

        self.latency_stats.push(latency.as_secs_f64() * 1000.0);
    }

    /// 生成摘要报告
    pub fn summary(&self) -> DeliverySummary {
        DeliverySummary {
            total_records: self.total_records,
            fully_stored: self.fully_stored,
            partially_stored: self.partially_stored,
            not_stored: self.not_stored,
            latency_ms: StatsSummary::from(&self.latency_stats),
            sink_failures: self.sink_failures.clone(),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 投递摘要
#[derive(Debug, Clone, Default)]
pub struct DeliverySummary {
    pub total_records: u64,
    pub fully_stored: u64,
    pub partially_stored: u64,
    pub not_stored: u64,
    pub latency_ms: StatsSummary,
    pub sink_failures: BTreeMap<String, u64>,
}

impl std::fmt::Display for DeliverySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Delivery Summary ===")?;
        writeln!(f, "Total records: {}", self.total_records)?;
        writeln!(f, "Stored by every sink: {}", self.fully_stored)?;
        writeln!(f, "Stored by some sinks: {}", self.partially_stored)?;
        writeln!(f, "Not stored: {}", self.not_stored)?;
        writeln!(f, "Fan-out latency (ms): {}", self.latency_ms)?;

        if !self.sink_failures.is_empty() {
            writeln!(f, "Sink failures:")?;
            for (sink, count) in &self.sink_failures {
                writeln!(f, "  {}: {}", sink, count)?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            self.m2 += delta * (value - self.mean);
        }
    }

    /// 样本数量
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 均值
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本标准差
    pub fn std_dev(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            (self.m2 / (self.count - 1) as f64).sqrt()
        }
    }
}
