use opentelemetry::{
    KeyValue,
    metrics::{Counter, Histogram, Meter},
};

/// Client-side request metrics using OpenTelemetry metrics
///
/// Every measurement is labelled with the request name (e.g. `Lock asset on chain1`). If
/// [`Metrics`] needs to be shared, cloning is recommended.
#[derive(Debug, Clone)]
pub struct Metrics {
    request_count: Counter<u64>,
    request_failures: Counter<u64>,
    request_duration: Histogram<f64>,
    response_size: Histogram<u64>,
}

impl Metrics {
    /// Create a new instance of `Metrics`
    pub fn new(meter: &Meter) -> Self {
        let request_count = meter
            .u64_counter("http_request_count")
            .with_description("Total number of HTLC service requests")
            .build();

        let request_failures = meter
            .u64_counter("http_request_failures")
            .with_description("Number of failed HTLC service requests")
            .build();

        let request_duration = meter
            .f64_histogram("http_request_duration")
            .with_description("Duration of HTLC service requests in seconds")
            .with_unit("s")
            .build();

        let response_size = meter
            .u64_histogram("http_response_size")
            .with_description("Size of HTLC service responses in bytes")
            .with_unit("B")
            .build();

        Self {
            request_count,
            request_failures,
            request_duration,
            response_size,
        }
    }

    /// Measure a request
    ///
    /// Increases the request counter and measures the request duration until
    /// [`RequestTimer::finish`] is called or the timer is dropped.
    pub fn request(&self, name: &str) -> RequestTimer<'_> {
        self.request_count.add(1, &[KeyValue::new("request", name.to_string())]);

        RequestTimer {
            name: name.to_string(),
            start: std::time::Instant::now(),
            metrics: self,
            finished: false,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        let meter = opentelemetry::global::meter("htlc-bench");
        Self::new(&meter)
    }
}

/// Timer for measuring request duration
pub struct RequestTimer<'a> {
    name: String,
    start: std::time::Instant,
    metrics: &'a Metrics,
    finished: bool,
}

impl RequestTimer<'_> {
    /// Finish the request, recording its duration, outcome and response size
    pub fn finish(mut self, success: bool, size: usize) {
        self.record(if success { "success" } else { "failure" });
        if !success {
            self.metrics
                .request_failures
                .add(1, &[KeyValue::new("request", self.name.clone())]);
        }
        self.metrics
            .response_size
            .record(size as u64, &[KeyValue::new("request", self.name.clone())]);
        self.finished = true;
    }

    fn record(&self, status: &str) {
        self.metrics.request_duration.record(
            self.start.elapsed().as_secs_f64(),
            &[
                KeyValue::new("request", self.name.clone()),
                KeyValue::new("status", status.to_string()),
            ],
        );
    }
}

impl Drop for RequestTimer<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.record("dropped");
        }
    }
}
