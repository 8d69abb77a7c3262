//! `/health` endpoint.

use std::time::Instant;

use serde::Serialize;

use crate::context::ServerContext;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"` while serving, `"draining"` once shutdown began.
    pub status: &'static str,
    /// Worker identity.
    pub pid: u32,
    /// Seconds since the worker started.
    pub uptime_secs: u64,
    /// Sockets attached to this worker.
    pub connections: usize,
    /// `"subscribed"` or `"local-only"`.
    pub bus: &'static str,
}

/// Build a health response from live counters.
pub fn health_check(ctx: &ServerContext) -> HealthResponse {
    HealthResponse {
        status: if ctx.shutdown.is_shutting_down() {
            "draining"
        } else {
            "ok"
        },
        pid: ctx.process.get(),
        uptime_secs: uptime(ctx.start_time),
        connections: ctx.registry.count(),
        bus: ctx.bridge.mode().as_str(),
    }
}

fn uptime(start_time: Instant) -> u64 {
    start_time.elapsed().as_secs()
}
