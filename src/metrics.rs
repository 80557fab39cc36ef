use axum::{routing::get, Router};
use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

#[derive(Clone)]
pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder and describe our counters.
    /// Fails if a recorder is already installed in this process.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| anyhow::anyhow!("prometheus: install recorder: {e}"))?;
        describe();
        Ok(Self { handle })
    }

    /// A handle that is not installed globally. Renders only what is recorded
    /// through it, which is nothing; used where a global recorder can't be set
    /// (e.g. many routers built in one test process).
    pub fn detached() -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        Self {
            handle: recorder.handle(),
        }
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router<S>(&self) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

fn describe() {
    describe_counter!(
        "opportunity_keywords_scored_total",
        "Keyword records scored by the opportunity scorer"
    );
    describe_counter!(
        "opportunity_keywords_filtered_total",
        "Keyword records excluded by the pre-scoring filter"
    );
    describe_counter!(
        "opportunity_keywords_skipped_total",
        "Keyword records skipped because of malformed metrics"
    );
    describe_counter!("abtest_events_total", "A/B test events recorded, by event type");
    describe_counter!(
        "abtest_analyses_total",
        "A/B significance analyses run, by outcome status"
    );
}
