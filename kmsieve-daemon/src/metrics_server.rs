//! Prometheus metrics HTTP server.
//!
//! Uses the built-in HTTP listener from `metrics-exporter-prometheus`
//! to expose the pipeline counters. Must be called from inside the
//! daemon's tokio runtime so the listener task runs on it.

use std::net::SocketAddr;

use anyhow::Result;
use kmsieve_core::config::{FilterMode, MetricsConfig};
use kmsieve_core::metrics as m;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the global metrics recorder and start the HTTP listener.
///
/// # Errors
///
/// - Unsupported endpoint path or unparseable listen address
/// - Socket binding fails
/// - Global recorder is already installed
pub fn install_metrics_recorder(config: &MetricsConfig) -> Result<()> {
    if config.endpoint != "/metrics" {
        return Err(anyhow::anyhow!(
            "unsupported metrics endpoint '{}': only '/metrics' is currently supported",
            config.endpoint
        ));
    }

    let addr = listen_addr(config)?;

    if addr.ip().is_unspecified() {
        tracing::warn!(
            listen_addr = %addr,
            "metrics endpoint is exposed on all interfaces; restrict listen_addr in untrusted networks"
        );
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {}", e))?;

    m::describe_all();

    tracing::info!(listen_addr = %addr, "Prometheus metrics endpoint active");

    Ok(())
}

/// Record the daemon-level gauges once the rule file is loaded.
pub fn record_daemon_metrics(rule_count: usize, mode: FilterMode) {
    metrics::gauge!(m::DAEMON_BUILD_INFO, m::LABEL_VERSION => env!("CARGO_PKG_VERSION"))
        .set(1.0);

    #[allow(clippy::cast_precision_loss)]
    metrics::gauge!(m::RULES_LOADED, m::LABEL_MODE => mode.to_string()).set(rule_count as f64);

    tracing::debug!(
        rule_count,
        version = env!("CARGO_PKG_VERSION"),
        "daemon metrics recorded"
    );
}

fn listen_addr(config: &MetricsConfig) -> Result<SocketAddr> {
    format!("{}:{}", config.listen_addr, config.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid metrics listen address: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_custom_endpoint() {
        let config = MetricsConfig {
            endpoint: "/stats".to_owned(),
            ..MetricsConfig::default()
        };
        let err = install_metrics_recorder(&config).expect_err("custom endpoint");
        assert!(err.to_string().contains("unsupported metrics endpoint"));
    }

    #[test]
    fn rejects_unparseable_address() {
        let config = MetricsConfig {
            listen_addr: "not-an-ip".to_owned(),
            ..MetricsConfig::default()
        };
        assert!(listen_addr(&config).is_err());
    }

    #[test]
    fn ipv6_address_is_rejected_without_brackets() {
        let config = MetricsConfig {
            listen_addr: "::1".to_owned(),
            ..MetricsConfig::default()
        };
        assert!(listen_addr(&config).is_err());
    }

    #[test]
    fn record_daemon_metrics_without_recorder_is_noop() {
        record_daemon_metrics(3, FilterMode::LeadingLine);
    }
}
