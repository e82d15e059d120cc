//! # Tower Drip
//!
//! `tower-drip` puts a [`drip_limit::LeakyBucket`] in front of a
//! [Tower](https://github.com/tower-rs/tower) service.
//!
//! ## Shed-First Admission
//!
//! Unlike rate limiters that return `Poll::Pending` and queue excess work in
//! memory, [`AdmissionLayer`] rejects immediately with
//! [`DripError::RateLimited`] when the bucket is full. The gate's answer is a
//! bare boolean, so there is no retry hint to sleep on and no buffer to
//! bloat; a rejection costs nanoseconds and the downstream service only ever
//! sees admitted traffic.
//!
//! ## Observability
//!
//! Each decision increments an `admission.allowed` / `admission.rejected`
//! OpenTelemetry counter, and the layer registers an `admission.fill` gauge
//! whose callback polls the bucket without consuming capacity.
//!
//! ## Feature Flags
//!
//! - `axum`: Enables `IntoResponse` for [`DripError`], converting rejections
//!   to `429 Too Many Requests` (and wrapped inner errors to 500).

mod error;
mod layer;
mod service;

#[cfg(test)]
mod tests;

pub use error::DripError;
pub use layer::AdmissionLayer;
pub use service::AdmissionService;
