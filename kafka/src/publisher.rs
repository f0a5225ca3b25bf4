use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backend_listener_core::prelude::{DelegatedShutdownListener, ShutdownHandle};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use tokio::runtime::Runtime;
use tokio::select;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

/// One document handed to the delivery task. The key is derived from the flush time
/// plus the document's position in the batch so that two documents flushed in the same
/// cycle never collide.
struct PendingRecord {
    key: i64,
    payload: String,
}

/// Accumulates serialized documents in memory and hands them to an asynchronous
/// delivery task that publishes them to the configured topic.
///
/// Publishing is fire and forget: [KafkaMetricPublisher::flush] returns without
/// waiting for acknowledgments and delivery outcomes are logged as they arrive.
/// Retries, batching and partitioning are the producer client's own concern.
pub struct KafkaMetricPublisher {
    pending: Vec<String>,
    writer: UnboundedSender<PendingRecord>,
    join_handle: JoinHandle<()>,
    shutdown_handle: ShutdownHandle,
    flush_complete: Arc<AtomicBool>,
}

impl KafkaMetricPublisher {
    pub fn new(runtime: &Runtime, producer: FutureProducer, topic: String) -> Self {
        let shutdown_handle = ShutdownHandle::new();
        let flush_complete = Arc::new(AtomicBool::new(false));
        let (writer, receiver) = tokio::sync::mpsc::unbounded_channel();
        let join_handle = runtime.spawn(delivery_task(
            shutdown_handle.new_listener(),
            receiver,
            producer,
            topic,
            flush_complete.clone(),
        ));

        Self {
            pending: Vec::new(),
            writer,
            join_handle,
            shutdown_handle,
            flush_complete,
        }
    }

    /// Add one serialized document to the pending batch. No network I/O happens here.
    pub fn append(&mut self, document: String) {
        self.pending.push(document);
    }

    /// Number of documents awaiting publication.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drop all pending documents, whether or not they were flushed.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Hand every pending document to the delivery task. Returns immediately after
    /// queueing the sends. Pending documents stay in place until
    /// [KafkaMetricPublisher::clear] is called.
    pub fn flush(&mut self) {
        let time = chrono::Utc::now().timestamp_millis();
        for (position, document) in self.pending.iter().enumerate() {
            self.try_send(PendingRecord {
                key: time + position as i64,
                payload: document.clone(),
            });
        }
    }

    fn try_send(&self, record: PendingRecord) {
        if let Err(e) = self.writer.send(record) {
            if self.flush_complete.load(Ordering::Relaxed) {
                log::info!("Dropping document because the delivery task has finished: {e}");
            } else {
                log::warn!("Failed to hand document to the delivery task: {e}");
            }
        }
    }

    /// Stop the delivery task, waiting for queued documents to drain and for the
    /// producer to settle its in-flight sends. Consuming the publisher makes a second
    /// close impossible.
    pub fn close(self) {
        self.shutdown_handle.shutdown();

        let wait_started = std::time::Instant::now();
        let mut notify_timer = std::time::Instant::now();
        while !self.flush_complete.load(Ordering::Relaxed) {
            if notify_timer.elapsed().as_secs() > 10 {
                log::warn!(
                    "Still waiting for documents to flush after {} seconds.",
                    wait_started.elapsed().as_secs()
                );
                notify_timer = std::time::Instant::now();
            }

            // If the delivery task has exited there is no point waiting any longer.
            if self.join_handle.is_finished() {
                break;
            }

            std::thread::sleep(Duration::from_millis(100));
        }

        log::debug!(
            "Publisher closed after {} seconds",
            wait_started.elapsed().as_secs()
        );
    }
}

async fn delivery_task(
    mut shutdown_listener: DelegatedShutdownListener,
    mut receiver: UnboundedReceiver<PendingRecord>,
    producer: FutureProducer,
    topic: String,
    flush_complete: Arc<AtomicBool>,
) {
    loop {
        select! {
            _ = shutdown_listener.wait_for_shutdown() => {
                log::debug!("Shutting down the Kafka delivery task");
                break;
            }
            record = receiver.recv() => {
                match record {
                    Some(record) => deliver(&producer, &topic, record).await,
                    None => break,
                }
            }
        }
    }

    log::debug!("Draining any remaining documents before shutting down...");
    let mut drain_count = 0;
    while let Ok(record) = receiver.try_recv() {
        deliver(&producer, &topic, record).await;
        drain_count += 1;
    }
    log::debug!("Drained {} remaining documents", drain_count);

    // Wait out whatever librdkafka still has in flight before releasing the producer.
    if let Err(e) = producer.flush(Timeout::After(Duration::from_secs(10))) {
        log::warn!("Failed to flush the Kafka producer while closing: {e}");
    }

    flush_complete.store(true, Ordering::Relaxed);
}

async fn deliver(producer: &FutureProducer, topic: &str, record: PendingRecord) {
    let started = std::time::Instant::now();
    let key = record.key.to_be_bytes();
    let future_record = FutureRecord::to(topic).key(key.as_slice()).payload(&record.payload);

    match producer.send(future_record, Timeout::Never).await {
        Ok((partition, offset)) => {
            log::debug!(
                "Document sent with key={} meta(partition={}, offset={}) time={}ms",
                record.key,
                partition,
                offset,
                started.elapsed().as_millis()
            );
        }
        Err((e, _)) => {
            log::warn!("Unable to publish document to Kafka topic {topic}: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdkafka::ClientConfig;

    // Nothing listens on the bootstrap address; the short message timeout makes
    // queued sends fail fast instead of holding the delivery task open.
    fn test_producer() -> FutureProducer {
        ClientConfig::new()
            .set("bootstrap.servers", "localhost:9")
            .set("message.timeout.ms", "200")
            .create()
            .expect("failed to create producer")
    }

    fn test_publisher(runtime: &Runtime) -> KafkaMetricPublisher {
        KafkaMetricPublisher::new(runtime, test_producer(), "test-topic".to_string())
    }

    #[test]
    fn test_clear_is_idempotent() {
        let runtime = Runtime::new().unwrap();
        let mut publisher = test_publisher(&runtime);

        publisher.append("{\"a\":1}".to_string());
        publisher.append("{\"b\":2}".to_string());
        assert_eq!(publisher.len(), 2);

        publisher.clear();
        assert!(publisher.is_empty());
        publisher.clear();
        assert!(publisher.is_empty());

        publisher.close();
    }

    #[test]
    fn test_flush_on_empty_batch_sends_nothing() {
        let runtime = Runtime::new().unwrap();
        let mut publisher = test_publisher(&runtime);

        publisher.flush();
        assert!(publisher.is_empty());

        publisher.close();
    }

    #[test]
    fn test_flush_keeps_documents_pending_until_cleared() {
        let runtime = Runtime::new().unwrap();
        let mut publisher = test_publisher(&runtime);

        publisher.append("{\"a\":1}".to_string());
        publisher.append("{\"b\":2}".to_string());
        publisher.flush();
        assert_eq!(publisher.len(), 2);

        publisher.clear();
        assert!(publisher.is_empty());

        publisher.close();
    }
}
