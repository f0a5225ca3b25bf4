use std::collections::HashSet;

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, Utc};
use serde_json::{json, Map, Value};

use crate::{SampleMode, SampleOutcome, TimestampFormatter};

const SECONDS_PER_DAY: i64 = 86_400;

/// Settings that shape every row built during a run. Constructed once by the
/// configuration loader and shared across batches.
#[derive(Debug, Clone)]
pub struct RowSettings {
    pub mode: SampleMode,
    pub timestamp: TimestampFormatter,
    /// CI build identifier. Zero means the run was not launched from CI and no
    /// build-comparison fields are emitted.
    pub build_number: i64,
    pub expand_request_headers: bool,
    pub expand_response_headers: bool,
    /// Lower-cased field allow-list. When non-empty it is the exhaustive set of field
    /// names permitted in the output document.
    pub fields: HashSet<String>,
    /// User-defined key/value pairs merged into every document.
    pub custom_fields: Vec<(String, String)>,
}

impl Default for RowSettings {
    fn default() -> Self {
        Self {
            mode: SampleMode::Info,
            timestamp: TimestampFormatter::default(),
            build_number: 0,
            expand_request_headers: false,
            expand_response_headers: false,
            fields: HashSet::new(),
            custom_fields: Vec::new(),
        }
    }
}

/// Builds the flat JSON document for one sample.
///
/// The document is built fresh per sample and is meant to be serialized immediately;
/// it has no identity beyond its content and the ordering of keys is irrelevant.
pub struct MetricsRow<'a> {
    sample: &'a SampleOutcome,
    settings: &'a RowSettings,
    document: Map<String, Value>,
}

impl<'a> MetricsRow<'a> {
    pub fn new(sample: &'a SampleOutcome, settings: &'a RowSettings) -> Self {
        Self {
            sample,
            settings,
            document: Map::new(),
        }
    }

    /// Build the document. `test_start` is when the host started the run; it anchors
    /// `TestStartTime` and the elapsed time-of-day fields.
    pub fn into_document(self, test_start: DateTime<Utc>) -> Map<String, Value> {
        self.into_document_at(test_start, Utc::now())
    }

    fn into_document_at(mut self, test_start: DateTime<Utc>, now: DateTime<Utc>) -> Map<String, Value> {
        self.add_standard_fields(test_start);
        if self.settings.mode.includes_details(self.sample.success) {
            self.add_details();
        }
        self.add_assertions();
        self.add_elapsed_time(now.signed_duration_since(test_start));
        self.add_custom_fields();
        self.expand_headers();
        self.document
    }

    fn add_standard_fields(&mut self, test_start: DateTime<Utc>) {
        let sample = self.sample;

        self.push("AllThreads", sample.all_threads);
        self.push("BodySize", sample.body_size);
        self.push("Bytes", sample.bytes);
        self.push("SentBytes", sample.sent_bytes);
        self.push("ConnectTime", sample.connect_time_ms);
        self.push("ContentType", sample.content_type.clone());
        self.push("DataType", sample.data_type.clone());
        self.push("ErrorCount", sample.error_count);
        self.push("GrpThreads", sample.group_threads);
        self.push("IdleTime", sample.idle_time_ms);
        self.push("Latency", sample.latency_ms);
        self.push("ResponseTime", sample.response_time_ms);
        self.push("SampleCount", sample.sample_count);
        self.push("SampleLabel", sample.label.clone());
        self.push("ThreadName", sample.thread_name.clone());
        if let Some(url) = &sample.url {
            self.push("URL", url.clone());
        }
        self.push("ResponseCode", sample.response_code.clone());
        self.push("TestStartTime", test_start.timestamp_millis());
        let start = self.format_timestamp(sample.start_time);
        self.push("SampleStartTime", start);
        let end = self.format_timestamp(sample.end_time);
        self.push("SampleEndTime", end);
        let timestamp = self.format_timestamp(sample.timestamp);
        self.push("Timestamp", timestamp);
        self.push("InjectorHostname", injector_hostname());
    }

    /// Request and response details, included or not depending on the mode.
    fn add_details(&mut self) {
        let sample = self.sample;

        self.push("RequestHeaders", sample.request_headers.clone());
        self.push("RequestBody", sample.request_body.clone());
        self.push("ResponseHeaders", sample.response_headers.clone());
        self.push("ResponseBody", sample.response_body.clone());
        self.push("ResponseMessage", sample.response_message.clone());
    }

    /// Per-assertion results, plus one newline-joined failure message and an overall
    /// `Success` flag that is true when no assertion failed or errored.
    fn add_assertions(&mut self) {
        let mut failure_messages = String::new();
        let mut any_failed = false;
        let mut results = Vec::with_capacity(self.sample.assertions.len());

        for assertion in &self.sample.assertions {
            let failed = assertion.failure || assertion.error;
            any_failed = any_failed || failed;
            failure_messages.push_str(&assertion.message);
            failure_messages.push('\n');
            results.push(json!({
                "name": assertion.name,
                "failure": failed,
                "failureMessage": assertion.message,
            }));
        }

        self.push("AssertionResults", Value::Array(results));
        self.push("FailureMessage", failure_messages);
        self.push("Success", !any_failed);
    }

    /// Elapsed run time re-expressed as a wall-clock time of day, so that two runs can
    /// be visually overlaid on a time-series chart regardless of calendar date. With a
    /// non-zero build number, a second copy anchored to a fixed reference date allows
    /// repeated CI runs of the same build to line up as parallel series.
    fn add_elapsed_time(&mut self, elapsed: Duration) {
        let settings = self.settings;

        if settings.build_number != 0 {
            self.push("BuildNumber", settings.build_number);
            if let Some(anchored) = elapsed_time_of_day(elapsed, comparison_anchor_date()) {
                self.push("ElapsedTimeComparison", settings.timestamp.format(anchored));
            }
        }

        if let Some(anchored) = elapsed_time_of_day(elapsed, Local::now().date_naive()) {
            self.push("ElapsedTime", settings.timestamp.format(anchored));
        }
    }

    /// User-defined fields, numeric where they parse as integers and strings otherwise.
    fn add_custom_fields(&mut self) {
        let settings = self.settings;

        for (key, value) in &settings.custom_fields {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }

            match value.parse::<i64>() {
                Ok(number) => self.push(key, number),
                Err(_) => {
                    log::debug!("Custom field {key} is not numeric, keeping it as a string");
                    self.push(key, value.to_string());
                }
            }
        }
    }

    /// Split raw header blocks into individual document fields when the corresponding
    /// expansion flag is set. Header names may carry the reserved `kafka-` tag to
    /// smuggle host variables through as document fields; the tag is stripped from the
    /// emitted name. These fields bypass the allow-list.
    fn expand_headers(&mut self) {
        let sample = self.sample;
        let settings = self.settings;

        let mut blocks = Vec::new();
        if settings.expand_request_headers {
            blocks.push(sample.request_headers.as_str());
        }
        if settings.expand_response_headers {
            blocks.push(sample.response_headers.as_str());
        }

        for block in blocks {
            for line in block.lines() {
                let Some((name, value)) = line.split_once(':') else {
                    continue;
                };

                let name = name.replace("kafka-", "");
                self.document
                    .insert(name.trim().to_string(), Value::from(value.trim()));
            }
        }
    }

    fn format_timestamp(&self, value: DateTime<Utc>) -> String {
        self.settings.timestamp.format(value.with_timezone(&Local))
    }

    /// Insert a field, honouring the allow-list: when the list is non-empty it is the
    /// exhaustive set of emitted field names, compared case-insensitively.
    fn push(&mut self, key: &str, value: impl Into<Value>) {
        if self.settings.fields.is_empty() || self.settings.fields.contains(&key.to_lowercase()) {
            self.document.insert(key.to_string(), value.into());
        }
    }
}

/// Re-express an elapsed duration as a wall-clock time of day anchored to midnight of
/// `date`. Total minutes and seconds carry into hours and the hour wraps at 24, so the
/// field stays within one day however long the run lasted.
fn elapsed_time_of_day(elapsed: Duration, date: NaiveDate) -> Option<DateTime<Local>> {
    let seconds = elapsed.num_seconds().rem_euclid(SECONDS_PER_DAY);
    let time = NaiveTime::from_num_seconds_from_midnight_opt(seconds as u32, 0)?;

    // `earliest` picks the first valid instant on days with a DST transition.
    date.and_time(time).and_local_timezone(Local).earliest()
}

fn comparison_anchor_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2019, 7, 1).expect("anchor date is valid")
}

fn injector_hostname() -> String {
    sysinfo::System::host_name().unwrap_or_else(|| "unknown".to_string())
}
