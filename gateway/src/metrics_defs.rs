//! Metrics definitions for the gateway.

use shared::metrics_defs::{MetricDef, MetricType};

pub const CACHE_HIT: MetricDef = MetricDef {
    name: "cache.hit",
    metric_type: MetricType::Counter,
    description: "Number of reads served from the cache",
};

pub const CACHE_MISS: MetricDef = MetricDef {
    name: "cache.miss",
    metric_type: MetricType::Counter,
    description: "Number of reads that went through to a backend",
};

pub const UPSTREAM_FAILURES: MetricDef = MetricDef {
    name: "upstream.failures",
    metric_type: MetricType::Counter,
    description: "Number of completed backend exchanges with a failure status",
};

pub const SAGA_PARTIAL_FAILURES: MetricDef = MetricDef {
    name: "saga.partial_failures",
    metric_type: MetricType::Counter,
    description: "Number of user creations where the payment step failed after the user was committed",
};

// TODO: all metrics must be added here for now, this can be done dynamically with a macro in the future.
pub const ALL_METRICS: &[MetricDef] = &[
    CACHE_HIT,
    CACHE_MISS,
    UPSTREAM_FAILURES,
    SAGA_PARTIAL_FAILURES,
];
