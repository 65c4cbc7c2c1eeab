//! Metrics definitions for update center resolution and download statistics.

use shared::metrics_defs::{MetricDef, MetricType};

pub const CACHE_HIT: MetricDef = MetricDef {
    name: "cache.hit",
    metric_type: MetricType::Counter,
    description: "Number of version lookups answered from the URL cache",
};

pub const CACHE_MISS: MetricDef = MetricDef {
    name: "cache.miss",
    metric_type: MetricType::Counter,
    description: "Number of version lookups not found in the URL cache",
};

pub const CACHE_SAVE_FAILED: MetricDef = MetricDef {
    name: "cache.save.failed",
    metric_type: MetricType::Counter,
    description: "Number of resolved URLs that could not be written to the cache",
};

pub const UPSTREAM_RESOLVE: MetricDef = MetricDef {
    name: "upstream.resolve",
    metric_type: MetricType::Counter,
    description: "Number of upstream resolutions. Tagged with result.",
};

pub const UPSTREAM_RESOLVE_DURATION: MetricDef = MetricDef {
    name: "upstream.resolve.duration",
    metric_type: MetricType::Histogram,
    description: "Time to resolve a version against the upstream in seconds",
};

pub const TASKS_SUBMITTED: MetricDef = MetricDef {
    name: "work_pool.tasks.submitted",
    metric_type: MetricType::Counter,
    description: "Number of tasks accepted by the work pool",
};

pub const TASKS_EXECUTED: MetricDef = MetricDef {
    name: "work_pool.tasks.executed",
    metric_type: MetricType::Counter,
    description: "Number of tasks run to completion by the work pool worker",
};

pub const LEDGER_WRITE_FAILED: MetricDef = MetricDef {
    name: "ledger.write.failed",
    metric_type: MetricType::Counter,
    description: "Number of download ledger updates that could not be persisted",
};

pub const ALL_METRICS: &[MetricDef] = &[
    CACHE_HIT,
    CACHE_MISS,
    CACHE_SAVE_FAILED,
    UPSTREAM_RESOLVE,
    UPSTREAM_RESOLVE_DURATION,
    TASKS_SUBMITTED,
    TASKS_EXECUTED,
    LEDGER_WRITE_FAILED,
];
