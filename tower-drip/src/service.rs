use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;

use opentelemetry::global;
use opentelemetry::metrics::Counter;
use pin_project_lite::pin_project;
use tower::BoxError;
use tower::Service;

use drip_limit::AdmissionControl;

use crate::error::DripError;

#[derive(Clone, Debug)]
struct AdmissionServiceMetrics {
    allowed: Counter<u64>,
    rejected: Counter<u64>,
}

impl AdmissionServiceMetrics {
    fn new() -> Self {
        let meter = global::meter("admission_gate");
        Self {
            allowed: meter.u64_counter("admission.allowed").build(),
            rejected: meter.u64_counter("admission.rejected").build(),
        }
    }
}

/// A shed-first admission wrapper around an inner service.
///
/// `poll_ready` consults the gate once per request; a `false` resolves
/// immediately to [`DripError::RateLimited`]. Nothing is queued and nothing
/// sleeps: the gate's decision carries no wait hint, so there is nothing to
/// wait for.
#[derive(Debug)]
pub struct AdmissionService<L, S>
where
    L: ?Sized,
{
    inner: S,
    gate: Arc<L>,
    permit_acquired: bool,
    instruments: AdmissionServiceMetrics,
}

pin_project! {
    /// A future that funnels inner-service failures into the crate's error
    /// domain.
    pub struct ResponseFuture<F> {
        #[pin]
        inner: F,
    }
}

impl<F, T> Future for ResponseFuture<F>
where
    F: Future<Output = Result<T, BoxError>>,
{
    type Output = Result<T, BoxError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        match this.inner.poll(cx) {
            Poll::Ready(Ok(res)) => Poll::Ready(Ok(res)),
            Poll::Ready(Err(err)) => {
                if err.is::<DripError>() {
                    Poll::Ready(Err(err))
                } else {
                    Poll::Ready(Err(Box::new(DripError::Inner(err.to_string()))))
                }
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

// The permit flag is per-instance state, so a clone starts without one.
impl<L, S> Clone for AdmissionService<L, S>
where
    L: ?Sized,
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            gate: Arc::clone(&self.gate),
            permit_acquired: false,
            instruments: self.instruments.clone(),
        }
    }
}

impl<L, S, Req> Service<Req> for AdmissionService<L, S>
where
    L: AdmissionControl + ?Sized + Send + Sync + 'static,
    S: Service<Req, Error = BoxError>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // 1. Check inner service readiness FIRST to avoid consuming bucket
        //    capacity for a request the inner service cannot take yet.
        match self.inner.poll_ready(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
            Poll::Ready(Ok(())) => {}
        }

        // 2. Consult the gate if we don't hold a permit yet. The flag keeps
        //    repeated polls of the same request from consuming twice.
        if !self.permit_acquired {
            if self.gate.allow() {
                self.permit_acquired = true;
                self.instruments.allowed.add(1, &[]);
            } else {
                self.instruments.rejected.add(1, &[]);
                return Poll::Ready(Err(Box::new(DripError::RateLimited)));
            }
        }

        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Req) -> Self::Future {
        self.permit_acquired = false;

        ResponseFuture {
            inner: self.inner.call(req),
        }
    }
}

impl<L, S> AdmissionService<L, S>
where
    L: ?Sized,
{
    pub fn new(inner: S, gate: Arc<L>) -> Self {
        Self {
            inner,
            gate,
            permit_acquired: false,
            instruments: AdmissionServiceMetrics::new(),
        }
    }
}
