//! 可观测性模块
//!
//! 提供 Prometheus 指标、结构化日志和健康检查。

use axum::{extract::Request, middleware::Next, response::Response};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt::writer::BoxMakeWriter};

use crate::config::config::LoggingConfig;
use crate::models::analysis::{AnalysisMode, Usage};

// ===== Simple Metrics (using atomics) =====

/// 简单应用指标
#[derive(Debug, Default)]
pub struct AppMetrics {
    pub http_requests_total: AtomicU64,
    pub http_request_duration_sum: AtomicU64,
    pub analyses_full_total: AtomicU64,
    pub analyses_quick_total: AtomicU64,
    pub venue_matches_total: AtomicU64,
    pub qr_decoded_total: AtomicU64,
    pub model_tokens_total: AtomicU64,
    pub upstream_errors_total: AtomicU64,
    pub errors_total: AtomicU64,
}

impl AppMetrics {
    /// 记录 HTTP 请求
    pub fn record_http_request(&self, duration_ms: u64) {
        self.http_requests_total.fetch_add(1, Ordering::Relaxed);
        self.http_request_duration_sum
            .fetch_add(duration_ms, Ordering::Relaxed);
    }

    /// 记录一次完成的分析
    pub fn record_analysis(
        &self,
        mode: AnalysisMode,
        venue_matched: bool,
        qr_found: bool,
        usage: Usage,
    ) {
        match mode {
            AnalysisMode::Full => self.analyses_full_total.fetch_add(1, Ordering::Relaxed),
            AnalysisMode::Quick => self.analyses_quick_total.fetch_add(1, Ordering::Relaxed),
        };
        if venue_matched {
            self.venue_matches_total.fetch_add(1, Ordering::Relaxed);
        }
        if qr_found {
            self.qr_decoded_total.fetch_add(1, Ordering::Relaxed);
        }
        self.model_tokens_total
            .fetch_add(usage.total_tokens, Ordering::Relaxed);
    }

    /// 记录模型调用失败
    pub fn record_upstream_error(&self) {
        self.upstream_errors_total.fetch_add(1, Ordering::Relaxed);
        self.record_error();
    }

    /// 记录错误
    pub fn record_error(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }

    /// 生成 Prometheus 格式指标
    pub fn gather(&self) -> String {
        let requests = self.http_requests_total.load(Ordering::Relaxed);
        format!(
            r#"# HELP http_requests_total Total HTTP requests
# TYPE http_requests_total counter
http_requests_total {}
# HELP http_request_duration_seconds HTTP request duration in seconds
# TYPE http_request_duration_seconds summary
http_request_duration_seconds_sum {}
http_request_duration_seconds_count {}
# HELP receipt_analyses_total Completed receipt analyses
# TYPE receipt_analyses_total counter
receipt_analyses_total{{mode="full"}} {}
receipt_analyses_total{{mode="quick"}} {}
# HELP venue_profile_matches_total Analyses that matched a venue profile
# TYPE venue_profile_matches_total counter
venue_profile_matches_total {}
# HELP qr_invoices_decoded_total Receipts with a decodable e-invoice QR code
# TYPE qr_invoices_decoded_total counter
qr_invoices_decoded_total {}
# HELP model_tokens_total Tokens consumed by model calls
# TYPE model_tokens_total counter
model_tokens_total {}
# HELP upstream_errors_total Failed model calls
# TYPE upstream_errors_total counter
upstream_errors_total {}
# HELP errors_total Total errors
# TYPE errors_total counter
errors_total {}
"#,
            requests,
            self.http_request_duration_sum.load(Ordering::Relaxed) as f64 / 1000.0,
            requests,
            self.analyses_full_total.load(Ordering::Relaxed),
            self.analyses_quick_total.load(Ordering::Relaxed),
            self.venue_matches_total.load(Ordering::Relaxed),
            self.qr_decoded_total.load(Ordering::Relaxed),
            self.model_tokens_total.load(Ordering::Relaxed),
            self.upstream_errors_total.load(Ordering::Relaxed),
            self.errors_total.load(Ordering::Relaxed),
        )
    }
}

// ===== Health Check =====

/// 健康检查状态
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: String,
    pub version: String,
    pub uptime_seconds: f64,
    pub checks: Vec<HealthCheck>,
}

/// 单个健康检查项
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    pub name: String,
    pub status: String,
    pub message: Option<String>,
    pub latency_ms: Option<u64>,
}

impl HealthCheck {
    pub fn healthy(name: &str, message: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            name: name.to_string(),
            status: "healthy".to_string(),
            message: Some(message.into()),
            latency_ms: Some(latency_ms),
        }
    }

    pub fn unhealthy(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: "unhealthy".to_string(),
            message: Some(message.into()),
            latency_ms: None,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

impl HealthStatus {
    /// 汇总各检查项；任一项不健康则整体不健康
    pub fn from_checks(version: &str, uptime_seconds: f64, checks: Vec<HealthCheck>) -> Self {
        let all_healthy = checks.iter().all(HealthCheck::is_healthy);
        Self {
            status: if all_healthy { "healthy" } else { "unhealthy" }.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            version: version.to_string(),
            uptime_seconds,
            checks,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

// ===== Structured Logging =====

/// 初始化日志
///
/// `RUST_LOG` 优先于配置中的级别。配置了 `log_dir` 时按天滚动写入文件，
/// 返回的 guard 需要在进程生命周期内保持存活。
pub fn init_tracing(config: &LoggingConfig) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},tower_http=info", config.level)));

    let (writer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "scan-invoice.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(non_blocking), Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stdout), None),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(writer)
        .with_ansi(config.log_dir.is_none())
        .with_target(true)
        .with_line_number(true);

    let result = if config.structured {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(e) = result {
        eprintln!("tracing subscriber already initialized: {}", e);
    }

    guard
}

// ===== Request Metrics Middleware =====

/// 记录请求指标的中间件
pub async fn metrics_middleware(
    axum::extract::State(metrics): axum::extract::State<Arc<AppMetrics>>,
    req: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let response = next.run(req).await;
    metrics.record_http_request(start.elapsed().as_millis() as u64);
    if response.status().is_server_error() {
        metrics.record_error();
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_gather() {
        let metrics = AppMetrics::default();
        metrics.record_http_request(100);
        metrics.record_analysis(
            AnalysisMode::Full,
            true,
            false,
            Usage {
                prompt_tokens: 90,
                completion_tokens: 10,
                total_tokens: 100,
            },
        );
        metrics.record_analysis(AnalysisMode::Quick, false, true, Usage::default());
        metrics.record_upstream_error();

        let output = metrics.gather();
        assert!(output.contains("http_requests_total 1"));
        assert!(output.contains("receipt_analyses_total{mode=\"full\"} 1"));
        assert!(output.contains("receipt_analyses_total{mode=\"quick\"} 1"));
        assert!(output.contains("venue_profile_matches_total 1"));
        assert!(output.contains("qr_invoices_decoded_total 1"));
        assert!(output.contains("model_tokens_total 100"));
        assert!(output.contains("upstream_errors_total 1"));
        assert!(output.contains("errors_total 1"));
    }

    #[test]
    fn test_health_status_aggregation() {
        let status = HealthStatus::from_checks(
            "0.3.0",
            12.0,
            vec![
                HealthCheck::healthy("storage", "memory", 0),
                HealthCheck::healthy("venue_profiles", "3 profiles", 0),
            ],
        );
        assert!(status.is_healthy());

        let status = HealthStatus::from_checks(
            "0.3.0",
            12.0,
            vec![HealthCheck::unhealthy("storage", "disk full")],
        );
        assert_eq!(status.status, "unhealthy");
        assert_eq!(status.checks[0].latency_ms, None);
    }
}
