use reqwest::Method;
use tracing::{error, info, warn};

/// One outbound call as seen by a [`RequestLogger`].
#[derive(Debug, Clone, Copy)]
pub struct RequestLogEntry<'a> {
    pub service: &'a str,
    pub method: &'a Method,
    pub url: &'a str,
    /// `None` when the call never produced a response (connect failure, timeout, reset).
    pub status: Option<u16>,
    pub elapsed_ms: u128,
    pub request_id: Option<&'a str>,
}

/// Sink for per-request outcome logging. Implementations must not fail.
pub trait RequestLogger: Send + Sync {
    fn log(&self, entry: &RequestLogEntry<'_>);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRequestLogger;

impl RequestLogger for NoopRequestLogger {
    fn log(&self, _entry: &RequestLogEntry<'_>) {}
}

/// Emits every call through `tracing`, picking the level from the status.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingRequestLogger;

impl RequestLogger for TracingRequestLogger {
    fn log(&self, entry: &RequestLogEntry<'_>) {
        let method = entry.method.as_str();
        match entry.status {
            None => error!(
                service = entry.service,
                method,
                url = entry.url,
                elapsed_ms = entry.elapsed_ms as u64,
                "outbound request failed without a response"
            ),
            Some(status) if status >= 500 => error!(
                service = entry.service,
                method,
                url = entry.url,
                status,
                elapsed_ms = entry.elapsed_ms as u64,
                request_id = entry.request_id,
                "outbound request"
            ),
            Some(status) if status >= 400 => warn!(
                service = entry.service,
                method,
                url = entry.url,
                status,
                elapsed_ms = entry.elapsed_ms as u64,
                request_id = entry.request_id,
                "outbound request"
            ),
            Some(status) => info!(
                service = entry.service,
                method,
                url = entry.url,
                status,
                elapsed_ms = entry.elapsed_ms as u64,
                request_id = entry.request_id,
                "outbound request"
            ),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::{RequestLogEntry, RequestLogger};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct RecordedRequest {
        pub method: String,
        pub url: String,
        pub status: Option<u16>,
        pub request_id: Option<String>,
    }

    /// Captures log entries so tests can assert on them.
    #[derive(Debug, Default)]
    pub struct RecordingRequestLogger {
        pub entries: Mutex<Vec<RecordedRequest>>,
    }

    impl RequestLogger for RecordingRequestLogger {
        fn log(&self, entry: &RequestLogEntry<'_>) {
            self.entries.lock().unwrap().push(RecordedRequest {
                method: entry.method.to_string(),
                url: entry.url.to_string(),
                status: entry.status,
                request_id: entry.request_id.map(str::to_string),
            });
        }
    }
}
