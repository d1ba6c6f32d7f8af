//! Prometheus metrics and tracing span helpers.
//!
//! Instruments are created once, on first use, against a meter provider whose
//! reader is the Prometheus exporter bound to the default registry, so
//! `prometheus::gather()` sees them.

#[cfg(feature = "metrics")]
pub use self::instruments::{LarderMetrics, METRICS};

#[cfg(feature = "metrics")]
mod instruments {
    use once_cell::sync::Lazy;
    use opentelemetry::metrics::{Counter, Histogram, Meter, MeterProvider as _};
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::metrics::SdkMeterProvider;
    use std::time::Duration;

    pub static METRICS: Lazy<LarderMetrics> = Lazy::new(LarderMetrics::init);

    pub struct LarderMetrics {
        // Keeps the Prometheus reader alive for the life of the process
        _provider: Option<SdkMeterProvider>,
        pub query_duration: Histogram<f64>,
        pub query_errors: Counter<u64>,
        pub connection_wait: Histogram<f64>,
        pub bookings: Counter<u64>,
        pub booking_conflicts: Counter<u64>,
        pub swept_slots: Counter<u64>,
    }

    impl LarderMetrics {
        pub fn init() -> Self {
            let exporter = opentelemetry_prometheus::exporter()
                .with_registry(prometheus::default_registry().clone())
                .build();

            let (provider, meter): (Option<SdkMeterProvider>, Meter) = match exporter {
                Ok(exporter) => {
                    let provider = SdkMeterProvider::builder().with_reader(exporter).build();
                    let meter = provider.meter("larder");
                    (Some(provider), meter)
                }
                Err(e) => {
                    log::warn!("prometheus exporter unavailable, metrics will not be exported: {e}");
                    (None, opentelemetry::global::meter("larder"))
                }
            };

            Self {
                _provider: provider,
                query_duration: meter
                    .f64_histogram("larder_query_duration_seconds")
                    .with_description("Duration of statements sent to PostgreSQL")
                    .build(),
                query_errors: meter
                    .u64_counter("larder_query_errors_total")
                    .with_description("Statements that failed in the driver")
                    .build(),
                connection_wait: meter
                    .f64_histogram("larder_connection_wait_seconds")
                    .with_description("Time spent opening or checking out a connection")
                    .build(),
                bookings: meter
                    .u64_counter("larder_bookings_total")
                    .with_description("Committed booking writes by operation")
                    .build(),
                booking_conflicts: meter
                    .u64_counter("larder_booking_conflicts_total")
                    .with_description("Booking writes refused because the slot was held")
                    .build(),
                swept_slots: meter
                    .u64_counter("larder_swept_slots_total")
                    .with_description("Slot flags corrected by the availability sweep")
                    .build(),
            }
        }

        pub fn record_query_duration(&self, elapsed: Duration) {
            self.query_duration.record(elapsed.as_secs_f64(), &[]);
        }

        pub fn record_query_error(&self) {
            self.query_errors.add(1, &[]);
        }

        pub fn record_connection_wait(&self, elapsed: Duration) {
            self.connection_wait.record(elapsed.as_secs_f64(), &[]);
        }

        pub fn record_booking(&self, operation: &'static str) {
            self.bookings.add(1, &[KeyValue::new("operation", operation)]);
        }

        pub fn record_booking_conflict(&self) {
            self.booking_conflicts.add(1, &[]);
        }

        pub fn record_sweep(&self, released: usize, reserved: usize) {
            self.swept_slots
                .add(released as u64, &[KeyValue::new("direction", "released")]);
            self.swept_slots
                .add(reserved as u64, &[KeyValue::new("direction", "reserved")]);
        }
    }
}

/// Span constructors used around connections, statements and ledger operations.
#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::{info_span, Span};

    pub fn acquire_connection_span() -> Span {
        info_span!("larder.acquire_connection")
    }

    pub fn execute_query_span(query: &str) -> Span {
        info_span!("larder.execute_query", db.statement = %truncate(query))
    }

    pub fn begin_transaction_span() -> Span {
        info_span!("larder.begin_transaction")
    }

    pub fn commit_transaction_span() -> Span {
        info_span!("larder.commit_transaction")
    }

    pub fn rollback_transaction_span() -> Span {
        info_span!("larder.rollback_transaction")
    }

    pub fn operation_span(operation: &'static str) -> Span {
        info_span!("larder.operation", operation)
    }

    fn truncate(query: &str) -> &str {
        let trimmed = query.trim();
        match trimmed.char_indices().nth(120) {
            Some((idx, _)) => &trimmed[..idx],
            None => trimmed,
        }
    }

}
