//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Chain connection status
//! - Nonce allocation per chain
//! - Action submissions, failures and latency

use crate::error::{AgentError, AgentResult};
use crate::events::SwapEvent;
use crate::swap::{Action, ChainKind};

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    pub static ref CHAIN_CONNECTED: GaugeVec = register_gauge_vec!(
        "swap_agent_chain_connected",
        "Chain connection status (1=connected, 0=disconnected)",
        &["chain"]
    ).unwrap();

    pub static ref NONCE_ALLOCATED: GaugeVec = register_gauge_vec!(
        "swap_agent_nonce_allocated",
        "Last nonce consumed per chain",
        &["chain"]
    ).unwrap();

    pub static ref ACTIONS_SUBMITTED: CounterVec = register_counter_vec!(
        "swap_agent_actions_submitted_total",
        "Total swap actions accepted by a chain",
        &["chain", "action"]
    ).unwrap();

    pub static ref ACTIONS_FAILED: CounterVec = register_counter_vec!(
        "swap_agent_actions_failed_total",
        "Total swap actions that failed before or during submission",
        &["chain", "action"]
    ).unwrap();

    pub static ref SUBMIT_LATENCY: HistogramVec = register_histogram_vec!(
        "swap_agent_submit_latency_seconds",
        "Sign and submit round trip",
        &["chain"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    ).unwrap();

    pub static ref EVENTS_CLASSIFIED: CounterVec = register_counter_vec!(
        "swap_agent_events_classified_total",
        "HTLC events classified by flow and kind",
        &["event"]
    ).unwrap();

    pub static ref HEALTH_CHECK_FAILURE: CounterVec = register_counter_vec!(
        "swap_agent_health_check_failure_total",
        "Total failed chain health checks",
        &["chain"]
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> AgentResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| AgentError::Internal(format!("bind metrics server on {}: {}", addr, e)))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| AgentError::Internal(format!("metrics server: {}", e)))?;

        Ok(())
    }
}

async fn metrics_handler() -> Result<String, StatusCode> {
    gather_text().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// Current metrics in the Prometheus text format
pub fn gather_text() -> AgentResult<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| AgentError::Internal(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| AgentError::Internal(e.to_string()))
}

pub fn record_chain_health(chain: ChainKind, healthy: bool) {
    CHAIN_CONNECTED
        .with_label_values(&[chain.as_str()])
        .set(if healthy { 1.0 } else { 0.0 });
    if !healthy {
        HEALTH_CHECK_FAILURE.with_label_values(&[chain.as_str()]).inc();
    }
}

pub fn record_nonce_allocated(chain: ChainKind, nonce: u64) {
    NONCE_ALLOCATED
        .with_label_values(&[chain.as_str()])
        .set(nonce as f64);
}

pub fn record_action_submitted(chain: ChainKind, action: Action) {
    ACTIONS_SUBMITTED
        .with_label_values(&[chain.as_str(), action.as_str()])
        .inc();
}

pub fn record_action_failed(chain: ChainKind, action: Action) {
    ACTIONS_FAILED
        .with_label_values(&[chain.as_str(), action.as_str()])
        .inc();
}

pub fn record_submit_latency(chain: ChainKind, latency_secs: f64) {
    SUBMIT_LATENCY
        .with_label_values(&[chain.as_str()])
        .observe(latency_secs);
}

pub fn record_event(event: &SwapEvent) {
    EVENTS_CLASSIFIED.with_label_values(&[event.name()]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_counters_are_labelled() {
        let before = ACTIONS_SUBMITTED
            .with_label_values(&["companion", "revoke"])
            .get();
        record_action_submitted(ChainKind::Companion, Action::Revoke);
        let after = ACTIONS_SUBMITTED
            .with_label_values(&["companion", "revoke"])
            .get();
        assert_eq!(after - before, 1.0);
    }

    #[test]
    fn test_gather_text_exposes_metrics() {
        record_chain_health(ChainKind::Origin, true);
        let text = gather_text().unwrap();
        assert!(text.contains("swap_agent_chain_connected"));
    }
}
