//! Ordered failover probing across an endpoint set.

use std::time::{Duration, Instant};

use monolith_core::{EndpointSet, ProbeError, ProbeResult, Prober};
use tracing::{debug, warn};

/// Result of a failover scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailoverOutcome {
    /// The first successful probe, or the last failure if nothing answered.
    pub result: ProbeResult,
    /// Index of `result.address` within the endpoint set.
    pub index: usize,
    /// Addresses probed, in order.
    pub attempted: Vec<String>,
}

impl FailoverOutcome {
    pub fn reachable(&self) -> bool {
        self.result.reachable()
    }

    pub fn address(&self) -> &str {
        &self.result.address
    }

    /// Failure summary naming every address tried.
    pub fn failure_summary(&self) -> Option<String> {
        let error = self.result.error()?;
        if self.attempted.len() > 1 {
            Some(format!(
                "all {} endpoints failed (last: {error})",
                self.attempted.len()
            ))
        } else {
            Some(error.to_string())
        }
    }
}

/// Probe addresses from `start_index` onward, stopping at the first success.
///
/// Only a scan starting at 0 covers the whole set. A `start_index` past the
/// end is treated as 0. Each prober call is bounded by `timeout`.
pub async fn probe(
    endpoints: &EndpointSet,
    prober: &dyn Prober,
    start_index: usize,
    timeout: Duration,
) -> FailoverOutcome {
    let start = if start_index < endpoints.len() {
        start_index
    } else {
        0
    };
    scan(endpoints, prober, start, endpoints.len(), None, timeout).await
}

/// Primary-first scan over every address except `skip`, which the caller
/// has just seen fail.
pub async fn probe_skipping(
    endpoints: &EndpointSet,
    prober: &dyn Prober,
    skip: usize,
    timeout: Duration,
) -> FailoverOutcome {
    scan(endpoints, prober, 0, endpoints.len(), Some(skip), timeout).await
}

/// Probe exactly one address of the set.
pub async fn probe_single(
    endpoints: &EndpointSet,
    prober: &dyn Prober,
    index: usize,
    timeout: Duration,
) -> FailoverOutcome {
    let index = if index < endpoints.len() { index } else { 0 };
    scan(endpoints, prober, index, index + 1, None, timeout).await
}

async fn scan(
    endpoints: &EndpointSet,
    prober: &dyn Prober,
    start: usize,
    end: usize,
    skip: Option<usize>,
    timeout: Duration,
) -> FailoverOutcome {
    let service = endpoints.service_id();
    let mut attempted = Vec::with_capacity(end - start);
    let mut last = None;

    for index in (start..end).filter(|&i| Some(i) != skip) {
        let Some(address) = endpoints.get(index) else {
            break;
        };
        attempted.push(address.to_string());

        let result = bounded_probe(prober, address, timeout).await;
        match &result.outcome {
            Ok(info) => {
                debug!(%service, %address, index, latency_ms = result.latency.as_millis() as u64, info = %info.summary(), "endpoint reachable");
                return FailoverOutcome {
                    result,
                    index,
                    attempted,
                };
            }
            Err(e) if e.is_protocol() => {
                warn!(%service, %address, error = %e, "remote protocol error");
            }
            Err(e) => {
                debug!(%service, %address, error = %e, "endpoint unreachable");
            }
        }
        last = Some((index, result));
    }

    let (index, result) = last.unwrap_or_else(|| {
        let address = endpoints.primary();
        (
            0,
            ProbeResult::failure(
                address,
                Duration::ZERO,
                ProbeError::unreachable(address, "no endpoints scanned"),
            ),
        )
    });
    FailoverOutcome {
        result,
        index,
        attempted,
    }
}

async fn bounded_probe(prober: &dyn Prober, address: &str, timeout: Duration) -> ProbeResult {
    let started = Instant::now();
    match tokio::time::timeout(timeout, prober.probe(address, timeout)).await {
        Ok(result) => result,
        Err(_) => ProbeResult::failure(
            address,
            started.elapsed(),
            ProbeError::timeout(address, timeout),
        ),
    }
}
