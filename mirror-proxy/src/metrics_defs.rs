use shared::metrics_defs::{MetricDef, MetricType};

pub const REDIRECTS: MetricDef = MetricDef {
    name: "redirects",
    metric_type: MetricType::Counter,
    description: "Redirects served. Tagged with kind (update_center, plugin).",
};

pub const RESOLVE_FAILED: MetricDef = MetricDef {
    name: "update_center.resolve.failed",
    metric_type: MetricType::Counter,
    description: "Update center requests answered with 404 because the version could not be resolved",
};

pub const TASKS_DROPPED: MetricDef = MetricDef {
    name: "statistics.dropped",
    metric_type: MetricType::Counter,
    description: "Statistics updates not recorded because the work pool was stopped",
};

pub const ALL_METRICS: &[MetricDef] = &[REDIRECTS, RESOLVE_FAILED, TASKS_DROPPED];
