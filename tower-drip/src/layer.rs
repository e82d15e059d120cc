use std::fmt;
use std::fmt::Debug;
use std::sync::Arc;

use opentelemetry::global;
use opentelemetry::metrics::ObservableGauge;
use tower::Layer;

use drip_limit::AdmissionControl;

use crate::service::AdmissionService;

/// Applies leaky-bucket admission control to requests.
///
/// All services built from one layer (and all their clones) share the same
/// gate, which is what makes the limit global rather than per-connection.
pub struct AdmissionLayer<L>
where
    L: ?Sized,
{
    gate: Arc<L>,
    // Held so the fill gauge registered in `new` stays alive with the layer.
    fill_gauge: ObservableGauge<f64>,
}

impl<L> Clone for AdmissionLayer<L>
where
    L: ?Sized,
{
    fn clone(&self) -> Self {
        Self {
            gate: Arc::clone(&self.gate),
            fill_gauge: self.fill_gauge.clone(),
        }
    }
}

impl<L> Debug for AdmissionLayer<L>
where
    L: Debug + ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionLayer")
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

impl<L> AdmissionLayer<L>
where
    L: AdmissionControl + ?Sized + Send + Sync + 'static,
{
    /// Create an AdmissionLayer around a shared gate.
    ///
    /// Registers an observable gauge that polls the gate's fill level, so
    /// whatever metrics pipeline the surrounding system installs sees the
    /// bucket's usage without ever consuming capacity.
    pub fn new(gate: Arc<L>) -> Self {
        let meter = global::meter("admission_gate");
        let observed = Arc::clone(&gate);
        let fill_gauge = meter
            .f64_observable_gauge("admission.fill")
            .with_description("Current leaky-bucket fill level")
            .with_callback(move |observer| observer.observe(observed.peek_fill(), &[]))
            .build();

        AdmissionLayer { gate, fill_gauge }
    }
}

impl<L, S> Layer<S> for AdmissionLayer<L>
where
    L: ?Sized,
{
    type Service = AdmissionService<L, S>;

    fn layer(&self, service: S) -> Self::Service {
        AdmissionService::new(service, self.gate.clone())
    }
}
