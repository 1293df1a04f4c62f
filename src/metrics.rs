// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Prometheus metrics for the intake pipeline.

use prometheus::{
    exponential_buckets, Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry,
    TextEncoder,
};

/// Outcome label for a relayed enrolment.
pub const ACCEPTED: &str = "accepted";

/// Counters owned by one application instance.
#[derive(Clone)]
pub struct IntakeMetrics {
    registry: Registry,
    requests: IntCounterVec,
    attachment_bytes: Histogram,
}

impl IntakeMetrics {
    /// Register the intake metrics in a fresh registry.
    ///
    /// # Errors
    /// Returns error if a metric definition is invalid.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new(
                "enrolment_requests_total",
                "Enrolment submissions by pipeline outcome",
            ),
            &["outcome"],
        )?;
        let attachment_bytes = Histogram::with_opts(
            HistogramOpts::new(
                "enrolment_attachment_bytes",
                "Size of attachments relayed with enrolments",
            )
            .buckets(exponential_buckets(1024.0, 4.0, 8)?),
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(attachment_bytes.clone()))?;

        Ok(Self {
            registry,
            requests,
            attachment_bytes,
        })
    }

    /// Count one request with the given outcome label.
    pub fn record(&self, outcome: &str) {
        self.requests.with_label_values(&[outcome]).inc();
    }

    pub fn observe_attachment(&self, bytes: usize) {
        self.attachment_bytes.observe(bytes as f64);
    }

    /// Current count for an outcome label.
    pub fn count(&self, outcome: &str) -> u64 {
        self.requests.with_label_values(&[outcome]).get()
    }

    /// Render all metrics in the Prometheus text format.
    ///
    /// # Errors
    /// Returns error if encoding fails.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
