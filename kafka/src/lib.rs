mod backend;
pub mod config;
mod filter;
mod publisher;

pub use backend::KafkaBackendListener;
pub use config::{ConfigError, ListenerConfig, ProducerSettings, TlsSettings};
pub use filter::SampleFilter;
pub use publisher::KafkaMetricPublisher;

/// Initialise logging for hosts that do not configure a `log` backend of their own.
///
/// Safe to call more than once; only the first call takes effect.
pub fn init_logging() {
    let _ = env_logger::builder().try_init();
}
