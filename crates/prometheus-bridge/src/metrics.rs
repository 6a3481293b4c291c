use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    /// Principal is no longer a guild member (or could not be resolved).
    Absent,
    /// Principal is still a member but lost every officer-granting role.
    Unqualified,
    /// Removed by a role-change event rather than a sweep.
    RoleChange,
}

impl EvictionReason {
    pub fn label(self) -> &'static str {
        match self {
            EvictionReason::Absent => "absent",
            EvictionReason::Unqualified => "unqualified",
            EvictionReason::RoleChange => "role_change",
        }
    }
}

#[derive(Clone)]
pub struct GuardMetrics {
    registry: Registry,
    pub identity_links_total: IntGauge,
    pub identity_link_evictions_total: IntCounterVec,
    pub reconciliation_passes_total: IntCounter,
    pub reconciliation_failures_total: IntCounter,
}

impl GuardMetrics {
    pub fn new(registry: Registry) -> Result<Self, prometheus::Error> {
        let identity_links_total =
            IntGauge::new("identity_links_total", "Identity links currently stored")?;
        let identity_link_evictions_total = IntCounterVec::new(
            Opts::new(
                "identity_link_evictions_total",
                "Identity links removed because the principal no longer qualifies",
            ),
            &["reason"],
        )?;
        let reconciliation_passes_total = IntCounter::new(
            "reconciliation_passes_total",
            "Completed reconciliation passes",
        )?;
        let reconciliation_failures_total = IntCounter::new(
            "reconciliation_failures_total",
            "Links that could not be evaluated or evicted during a pass",
        )?;

        registry.register(Box::new(identity_links_total.clone()))?;
        registry.register(Box::new(identity_link_evictions_total.clone()))?;
        registry.register(Box::new(reconciliation_passes_total.clone()))?;
        registry.register(Box::new(reconciliation_failures_total.clone()))?;

        Ok(Self {
            registry,
            identity_links_total,
            identity_link_evictions_total,
            reconciliation_passes_total,
            reconciliation_failures_total,
        })
    }

    pub fn observe_link_count(&self, links: usize) {
        self.identity_links_total
            .set(i64::try_from(links).unwrap_or(i64::MAX));
    }

    pub fn observe_eviction(&self, reason: EvictionReason) {
        self.identity_link_evictions_total
            .with_label_values(&[reason.label()])
            .inc();
    }

    pub fn observe_pass(&self, failures: u64) {
        self.reconciliation_passes_total.inc();
        self.reconciliation_failures_total.inc_by(failures);
    }

    pub fn evictions(&self, reason: EvictionReason) -> u64 {
        self.identity_link_evictions_total
            .with_label_values(&[reason.label()])
            .get()
    }

    /// Text exposition of every registered metric.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
