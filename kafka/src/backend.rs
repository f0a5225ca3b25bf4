use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use backend_listener_model::{MetricsRow, SampleOutcome};
use chrono::{DateTime, Utc};
use rdkafka::producer::FutureProducer;
use tokio::runtime::Runtime;

use crate::config::ListenerConfig;
use crate::filter::SampleFilter;
use crate::publisher::KafkaMetricPublisher;

/// The listener driven by the host test-execution engine: configured once, handed
/// batches of completed samples zero or more times, then torn down exactly once.
///
/// The host guarantees at most one in-flight batch per listener instance; `&mut self`
/// on [KafkaBackendListener::handle_sample_results] makes that explicit in the API.
pub struct KafkaBackendListener {
    config: ListenerConfig,
    filter: SampleFilter,
    publisher: KafkaMetricPublisher,
    test_start: DateTime<Utc>,
    runtime: Runtime,
}

impl KafkaBackendListener {
    /// Load the configuration, connect the producer and record the run start time.
    /// Called once before any samples arrive.
    pub fn setup(params: &HashMap<String, String>) -> anyhow::Result<Self> {
        let config = ListenerConfig::from_parameters(params)?;

        let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
        let producer: FutureProducer = config
            .producer
            .client_config()
            .create()
            .context("Failed to create Kafka producer")?;
        let publisher = KafkaMetricPublisher::new(&runtime, producer, config.topic.clone());
        let filter = SampleFilter::new(config.mode, &config.sample_filters);

        log::info!(
            "Publishing samples to Kafka topic {} in {} mode",
            config.topic,
            config.mode
        );

        Ok(Self {
            config,
            filter,
            publisher,
            test_start: Utc::now(),
            runtime,
        })
    }

    /// Handle one batch of completed samples: filter, convert to JSON documents and
    /// flush to the producer before returning. A sample that fails to serialize is
    /// logged and skipped; it never aborts the rest of the batch.
    pub fn handle_sample_results(&mut self, results: &[SampleOutcome]) {
        for sample in results {
            if !self.filter.should_emit(&sample.label, sample.success) {
                continue;
            }

            let document = MetricsRow::new(sample, &self.config.row).into_document(self.test_start);
            match serde_json::to_string(&document) {
                Ok(json) => self.publisher.append(json),
                Err(e) => log::error!(
                    "Unable to serialize sample {:?}, it will not be published: {}",
                    sample.label,
                    e
                ),
            }
        }

        self.publisher.flush();
        self.publisher.clear();
    }

    /// Tear the listener down, flushing anything still pending and draining the
    /// producer. Called exactly once after all samples.
    pub fn teardown(mut self) -> anyhow::Result<()> {
        if !self.publisher.is_empty() {
            self.publisher.flush();
        }
        self.publisher.close();
        self.runtime.shutdown_timeout(Duration::from_secs(5));

        Ok(())
    }
}
