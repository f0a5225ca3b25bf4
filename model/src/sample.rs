use chrono::{DateTime, Utc};

/// The outcome of one assertion attached to a sample.
#[derive(Debug, Clone, Default)]
pub struct AssertionOutcome {
    pub name: String,
    /// The assertion condition was not met.
    pub failure: bool,
    /// The assertion could not be evaluated at all.
    pub error: bool,
    pub message: String,
}

/// One completed unit of work as reported by the host test-execution engine.
///
/// This is read-only input to the row builder. The host constructs one of these per
/// executed request and delivers them in batches.
#[derive(Debug, Clone, Default)]
pub struct SampleOutcome {
    /// The sample label, which is what the label filter patterns are matched against.
    pub label: String,
    /// Whether the request succeeded from the host's point of view.
    pub success: bool,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// When the sample was recorded.
    pub timestamp: DateTime<Utc>,
    pub latency_ms: i64,
    pub connect_time_ms: i64,
    pub idle_time_ms: i64,
    /// Total time taken by the sample, end to end.
    pub response_time_ms: i64,
    pub body_size: i64,
    /// Bytes received, including headers.
    pub bytes: i64,
    pub sent_bytes: i64,
    pub sample_count: i64,
    pub error_count: i64,
    /// Number of active threads across all thread groups when the sample ran.
    pub all_threads: i64,
    /// Number of active threads in the sample's own thread group.
    pub group_threads: i64,
    pub thread_name: String,
    pub url: Option<String>,
    pub response_code: String,
    pub response_message: String,
    pub content_type: String,
    pub data_type: String,
    /// Raw request headers, one `name: value` pair per line.
    pub request_headers: String,
    pub request_body: String,
    /// Raw response headers, one `name: value` pair per line.
    pub response_headers: String,
    pub response_body: String,
    pub assertions: Vec<AssertionOutcome>,
}
