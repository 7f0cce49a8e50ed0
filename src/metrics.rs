//! Prometheus metrics for the permission registrar and authorization checks.
//!
//! - `rolegate_cache_hits_total` / `rolegate_cache_misses_total` - registrar lookups
//! - `rolegate_cache_reloads_total` - permission set loads from storage
//! - `rolegate_cache_invalidations_total` - `forget_cached_permissions` calls
//! - `rolegate_cache_reload_duration_seconds` - storage load latency
//! - `rolegate_checks_total{check,result}` - authorization checks
//! - `rolegate_errors_total{error}` - failed management operations
//!
//! Recording before [`init`] is a no-op.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Counters
// ========================================================================

pub static CACHE_HITS: OnceLock<IntCounter> = OnceLock::new();

pub static CACHE_MISSES: OnceLock<IntCounter> = OnceLock::new();

pub static CACHE_RELOADS: OnceLock<IntCounter> = OnceLock::new();

pub static CACHE_INVALIDATIONS: OnceLock<IntCounter> = OnceLock::new();

/// Authorization checks by kind (`has_role`, `has_permission`, ...) and result.
pub static CHECKS: OnceLock<IntCounterVec> = OnceLock::new();

/// Management errors by error code.
pub static ERRORS: OnceLock<IntCounterVec> = OnceLock::new();

// ========================================================================
// Histograms
// ========================================================================

pub static RELOAD_LATENCY: OnceLock<Histogram> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Safe to call more than once; only the first call registers.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            if $metric.get().is_none() {
                let m = $init.expect(concat!(stringify!($metric), " creation failed"));
                if let Err(e) = r.register(Box::new(m.clone())) {
                    tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
                }
                let _ = $metric.set(m);
            }
        };
    }

    register!(CACHE_HITS, IntCounter::new("rolegate_cache_hits_total", "Registrar lookups served from cache"));
    register!(CACHE_MISSES, IntCounter::new("rolegate_cache_misses_total", "Registrar lookups that found no valid cache"));
    register!(CACHE_RELOADS, IntCounter::new("rolegate_cache_reloads_total", "Permission set loads from storage"));
    register!(CACHE_INVALIDATIONS, IntCounter::new("rolegate_cache_invalidations_total", "Registrar invalidations"));
    register!(CHECKS, IntCounterVec::new(Opts::new("rolegate_checks_total", "Authorization checks by kind and result"), &["check", "result"]));
    register!(ERRORS, IntCounterVec::new(Opts::new("rolegate_errors_total", "Failed management operations by error code"), &["error"]));
    register!(RELOAD_LATENCY, Histogram::with_opts(
        HistogramOpts::new("rolegate_cache_reload_duration_seconds", "Permission set load latency")
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0])));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

// ============================================================================
// Recording helpers
// ============================================================================

#[inline]
fn inc(metric: &OnceLock<IntCounter>) {
    if let Some(c) = metric.get() {
        c.inc();
    }
}

#[inline]
pub fn record_cache_hit() {
    inc(&CACHE_HITS);
}

#[inline]
pub fn record_cache_miss() {
    inc(&CACHE_MISSES);
}

#[inline]
pub fn record_invalidation() {
    inc(&CACHE_INVALIDATIONS);
}

/// Record a completed reload and its latency.
#[inline]
pub fn record_reload(duration_secs: f64) {
    inc(&CACHE_RELOADS);
    if let Some(h) = RELOAD_LATENCY.get() {
        h.observe(duration_secs);
    }
}

/// Record an authorization check outcome.
#[inline]
pub fn record_check(check: &str, granted: bool) {
    if let Some(c) = CHECKS.get() {
        let result = if granted { "granted" } else { "denied" };
        c.with_label_values(&[check, result]).inc();
    }
}

/// Record a failed management operation.
#[inline]
pub fn record_error(code: &str) {
    if let Some(c) = ERRORS.get() {
        c.with_label_values(&[code]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_lifecycle() {
        init();
        init();

        record_cache_hit();
        record_cache_miss();
        record_reload(0.002);
        record_invalidation();
        record_check("has_permission", true);
        record_check("has_role", false);
        record_error("not_found");

        let output = gather_metrics();
        assert!(output.contains("rolegate_cache_hits_total"));
        assert!(output.contains("rolegate_cache_reload_duration_seconds"));
        assert!(output.contains("check=\"has_permission\""));
        assert!(output.contains("result=\"denied\""));
        assert!(output.contains("error=\"not_found\""));
    }
}
