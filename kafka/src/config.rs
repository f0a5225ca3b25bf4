//! Configuration for the listener, loaded once from the flat string key/value pairs
//! supplied by the host and validated up front so that nothing fails per sample.

use std::collections::{HashMap, HashSet};

use backend_listener_model::{
    RowSettings, SampleMode, TimestampFormatError, TimestampFormatter, DEFAULT_TIMESTAMP_FORMAT,
};
use rdkafka::ClientConfig;

/// Parameter for setting the Kafka topic name.
pub const KAFKA_TOPIC: &str = "kafka.topic";
/// Semicolon-separated allow-list of document field names. Empty means all fields.
pub const KAFKA_FIELDS: &str = "kafka.fields";
/// Strftime pattern used for every formatted timestamp field.
pub const KAFKA_TIMESTAMP: &str = "kafka.timestamp";
/// Semicolon-separated label patterns; a sample is published when any of them matches
/// its label as a substring or as a regular expression.
pub const KAFKA_SAMPLE_FILTER: &str = "kafka.sample.filter";
/// Verbosity mode: `debug`, `info`, `error` or `quiet`.
pub const KAFKA_TEST_MODE: &str = "kafka.test.mode";
pub const KAFKA_PARSE_REQ_HEADERS: &str = "kafka.parse.all.req.headers";
pub const KAFKA_PARSE_RES_HEADERS: &str = "kafka.parse.all.res.headers";

/// Host/port pairs used for the initial connection to the Kafka cluster.
pub const KAFKA_BOOTSTRAP_SERVERS: &str = "kafka.bootstrap.servers";
/// Logical client identifier included in server-side request logging.
pub const KAFKA_CLIENT_ID: &str = "kafka.client.id";
/// Acknowledgment level the producer requires from the leader: `0`, `1` or `all`.
pub const KAFKA_ACKS: &str = "kafka.acks";
/// Compression codec for produced batches: `none`, `gzip`, `snappy`, `lz4` or `zstd`.
pub const KAFKA_COMPRESSION_TYPE: &str = "kafka.compression.type";
/// Producer batch size in bytes.
pub const KAFKA_BATCH_SIZE: &str = "kafka.batch.size";
/// Memory the producer may use for buffering unsent records, in bytes.
pub const KAFKA_BUFFER_MEMORY: &str = "kafka.buffer.memory";
/// How many times the producer client retries a failed send on its own.
pub const KAFKA_RETRIES: &str = "kafka.retries";
/// How long the producer waits for more records before sending a batch.
pub const KAFKA_LINGER_MS: &str = "kafka.linger.ms";
/// Upper bound on the time a record may spend in flight before being reported failed.
pub const KAFKA_DELIVERY_TIMEOUT_MS: &str = "kafka.delivery.timeout.ms";
/// Close idle connections after this many milliseconds.
pub const KAFKA_CONNECTIONS_MAX_IDLE_MS: &str = "kafka.connections.max.idle.ms";
pub const KAFKA_CLIENT_DNS_LOOKUP: &str = "kafka.client.dns.lookup";

/// Whether to connect over TLS; the remaining `kafka.ssl.*` settings only apply when
/// this is `true`.
pub const KAFKA_SSL_ENABLED: &str = "kafka.ssl.enabled";
pub const KAFKA_SSL_KEY_PASSWORD: &str = "kafka.ssl.key.password";
pub const KAFKA_SSL_KEYSTORE_LOCATION: &str = "kafka.ssl.keystore.location";
pub const KAFKA_SSL_KEYSTORE_PASSWORD: &str = "kafka.ssl.keystore.password";
pub const KAFKA_SSL_KEYSTORE_TYPE: &str = "kafka.ssl.keystore.type";
pub const KAFKA_SSL_TRUSTSTORE_LOCATION: &str = "kafka.ssl.truststore.location";
pub const KAFKA_SSL_TRUSTSTORE_PASSWORD: &str = "kafka.ssl.truststore.password";
pub const KAFKA_SSL_TRUSTSTORE_TYPE: &str = "kafka.ssl.truststore.type";
pub const KAFKA_SSL_ENABLED_PROTOCOLS: &str = "kafka.ssl.enabled.protocols";
pub const KAFKA_SSL_PROTOCOL: &str = "kafka.ssl.protocol";
pub const KAFKA_SSL_PROVIDER: &str = "kafka.ssl.provider";

/// CI build identifier; non-zero adds the build-comparison fields to every document.
pub const BUILD_NUMBER: &str = "BuildNumber";

/// Every service-specific parameter starts with this prefix. Anything else in the
/// parameter map is passed through verbatim as a custom document field.
pub const SERVICE_PREFIX: &str = "kafka.";

const DEFAULT_CLIENT_ID: &str = "LoadTestKafkaBackendListener";
const DEFAULT_ACKS: &str = "1";
const DEFAULT_BATCH_SIZE: u64 = 16_384;
const DEFAULT_CONNECTIONS_MAX_IDLE_MS: u64 = 180_000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required parameter `{0}`")]
    MissingParameter(&'static str),
    #[error("parameter `{key}` is not a valid number: {value}")]
    InvalidNumber { key: &'static str, value: String },
    #[error("parameter `{key}` is not a valid boolean: {value}")]
    InvalidBool { key: &'static str, value: String },
    #[error(transparent)]
    InvalidTimestampFormat(#[from] TimestampFormatError),
}

/// Producer-client settings, passed through to librdkafka.
#[derive(Debug, Clone)]
pub struct ProducerSettings {
    pub bootstrap_servers: String,
    pub client_id: String,
    pub acks: String,
    pub compression_type: Option<String>,
    pub batch_size: u64,
    pub buffer_memory: Option<u64>,
    pub retries: Option<u64>,
    pub linger_ms: Option<u64>,
    pub delivery_timeout_ms: Option<u64>,
    pub connections_max_idle_ms: u64,
    pub client_dns_lookup: Option<String>,
    pub tls: Option<TlsSettings>,
}

/// TLS settings, treated as opaque configuration for the producer client.
#[derive(Debug, Clone, Default)]
pub struct TlsSettings {
    pub key_password: Option<String>,
    pub keystore_location: Option<String>,
    pub keystore_password: Option<String>,
    pub keystore_type: Option<String>,
    pub truststore_location: Option<String>,
    pub truststore_password: Option<String>,
    pub truststore_type: Option<String>,
    pub enabled_protocols: Option<String>,
    pub protocol: Option<String>,
    pub provider: Option<String>,
}

impl ProducerSettings {
    /// Translate to librdkafka properties. Batching, retries and delivery timeouts are
    /// entirely the producer client's concern; this layer only forwards the knobs.
    pub fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.bootstrap_servers)
            .set("client.id", &self.client_id)
            .set("acks", &self.acks)
            .set("batch.size", self.batch_size.to_string())
            .set(
                "connections.max.idle.ms",
                self.connections_max_idle_ms.to_string(),
            );

        if let Some(compression) = &self.compression_type {
            config.set("compression.type", compression);
        }
        if let Some(buffer_memory) = self.buffer_memory {
            // librdkafka sizes its send buffer in kilobytes.
            config.set(
                "queue.buffering.max.kbytes",
                (buffer_memory / 1024).max(1).to_string(),
            );
        }
        if let Some(retries) = self.retries {
            config.set("retries", retries.to_string());
        }
        if let Some(linger) = self.linger_ms {
            config.set("linger.ms", linger.to_string());
        }
        if let Some(timeout) = self.delivery_timeout_ms {
            config.set("delivery.timeout.ms", timeout.to_string());
        }
        if let Some(lookup) = &self.client_dns_lookup {
            config.set("client.dns.lookup", lookup);
        }
        if let Some(tls) = &self.tls {
            tls.apply(&mut config);
        }

        config
    }
}

impl TlsSettings {
    fn apply(&self, config: &mut ClientConfig) {
        config.set("security.protocol", "ssl");

        if let Some(value) = &self.key_password {
            config.set("ssl.key.password", value);
        }
        if let Some(value) = &self.keystore_location {
            config.set("ssl.keystore.location", value);
        }
        if let Some(value) = &self.keystore_password {
            config.set("ssl.keystore.password", value);
        }
        if let Some(value) = &self.truststore_location {
            config.set("ssl.ca.location", value);
        }
        if let Some(value) = &self.provider {
            config.set("ssl.providers", value);
        }

        // JVM-client knobs with no librdkafka counterpart.
        for (name, value) in [
            (KAFKA_SSL_KEYSTORE_TYPE, &self.keystore_type),
            (KAFKA_SSL_TRUSTSTORE_PASSWORD, &self.truststore_password),
            (KAFKA_SSL_TRUSTSTORE_TYPE, &self.truststore_type),
            (KAFKA_SSL_ENABLED_PROTOCOLS, &self.enabled_protocols),
            (KAFKA_SSL_PROTOCOL, &self.protocol),
        ] {
            if value.is_some() {
                log::debug!("Ignoring TLS setting with no producer-client counterpart: {name}");
            }
        }
    }
}

/// Everything the listener needs, validated once at setup.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub topic: String,
    pub mode: SampleMode,
    /// Lower-cased, trimmed label filter patterns.
    pub sample_filters: Vec<String>,
    pub row: RowSettings,
    pub producer: ProducerSettings,
}

impl ListenerConfig {
    pub fn from_parameters(params: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let topic = required(params, KAFKA_TOPIC)?;
        let mode = SampleMode::parse(
            &optional(params, KAFKA_TEST_MODE).unwrap_or_else(|| "info".to_string()),
        );

        let timestamp = TimestampFormatter::new(
            &optional(params, KAFKA_TIMESTAMP)
                .unwrap_or_else(|| DEFAULT_TIMESTAMP_FORMAT.to_string()),
        )?;

        let mut custom_fields = params
            .iter()
            .filter(|(key, value)| {
                !key.starts_with(SERVICE_PREFIX)
                    && key.as_str() != BUILD_NUMBER
                    && !value.trim().is_empty()
            })
            .map(|(key, value)| (key.clone(), value.trim().to_string()))
            .collect::<Vec<_>>();
        // The parameter map is unordered; keep custom fields in a stable order.
        custom_fields.sort();

        let row = RowSettings {
            mode,
            timestamp,
            build_number: signed_number(params, BUILD_NUMBER)?.unwrap_or(0),
            expand_request_headers: boolean(params, KAFKA_PARSE_REQ_HEADERS, false)?,
            expand_response_headers: boolean(params, KAFKA_PARSE_RES_HEADERS, false)?,
            fields: list(params, KAFKA_FIELDS).into_iter().collect::<HashSet<_>>(),
            custom_fields,
        };

        let tls = if boolean(params, KAFKA_SSL_ENABLED, false)? {
            Some(TlsSettings {
                key_password: optional(params, KAFKA_SSL_KEY_PASSWORD),
                keystore_location: optional(params, KAFKA_SSL_KEYSTORE_LOCATION),
                keystore_password: optional(params, KAFKA_SSL_KEYSTORE_PASSWORD),
                keystore_type: optional(params, KAFKA_SSL_KEYSTORE_TYPE),
                truststore_location: optional(params, KAFKA_SSL_TRUSTSTORE_LOCATION),
                truststore_password: optional(params, KAFKA_SSL_TRUSTSTORE_PASSWORD),
                truststore_type: optional(params, KAFKA_SSL_TRUSTSTORE_TYPE),
                enabled_protocols: optional(params, KAFKA_SSL_ENABLED_PROTOCOLS),
                protocol: optional(params, KAFKA_SSL_PROTOCOL),
                provider: optional(params, KAFKA_SSL_PROVIDER),
            })
        } else {
            None
        };

        let producer = ProducerSettings {
            bootstrap_servers: required(params, KAFKA_BOOTSTRAP_SERVERS)?,
            client_id: optional(params, KAFKA_CLIENT_ID)
                .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string()),
            acks: optional(params, KAFKA_ACKS).unwrap_or_else(|| DEFAULT_ACKS.to_string()),
            compression_type: optional(params, KAFKA_COMPRESSION_TYPE),
            batch_size: number(params, KAFKA_BATCH_SIZE)?.unwrap_or(DEFAULT_BATCH_SIZE),
            buffer_memory: number(params, KAFKA_BUFFER_MEMORY)?,
            retries: number(params, KAFKA_RETRIES)?,
            linger_ms: number(params, KAFKA_LINGER_MS)?,
            delivery_timeout_ms: number(params, KAFKA_DELIVERY_TIMEOUT_MS)?,
            connections_max_idle_ms: number(params, KAFKA_CONNECTIONS_MAX_IDLE_MS)?
                .unwrap_or(DEFAULT_CONNECTIONS_MAX_IDLE_MS),
            client_dns_lookup: optional(params, KAFKA_CLIENT_DNS_LOOKUP),
            tls,
        };

        Ok(Self {
            topic,
            mode,
            sample_filters: list(params, KAFKA_SAMPLE_FILTER),
            row,
            producer,
        })
    }
}

/// The ordered parameter table, for hosts that pre-populate a configuration UI.
pub fn default_parameters() -> Vec<(&'static str, Option<&'static str>)> {
    vec![
        (KAFKA_ACKS, Some(DEFAULT_ACKS)),
        (KAFKA_BOOTSTRAP_SERVERS, None),
        (KAFKA_TOPIC, None),
        (KAFKA_SAMPLE_FILTER, None),
        (KAFKA_FIELDS, None),
        (KAFKA_TEST_MODE, Some("info")),
        (KAFKA_PARSE_REQ_HEADERS, Some("false")),
        (KAFKA_PARSE_RES_HEADERS, Some("false")),
        (KAFKA_TIMESTAMP, Some(DEFAULT_TIMESTAMP_FORMAT)),
        (KAFKA_COMPRESSION_TYPE, None),
        (KAFKA_SSL_ENABLED, Some("false")),
        (KAFKA_SSL_KEY_PASSWORD, None),
        (KAFKA_SSL_KEYSTORE_LOCATION, None),
        (KAFKA_SSL_KEYSTORE_PASSWORD, None),
        (KAFKA_SSL_KEYSTORE_TYPE, None),
        (KAFKA_SSL_TRUSTSTORE_LOCATION, None),
        (KAFKA_SSL_TRUSTSTORE_PASSWORD, None),
        (KAFKA_SSL_TRUSTSTORE_TYPE, None),
        (KAFKA_SSL_ENABLED_PROTOCOLS, None),
        (KAFKA_SSL_PROTOCOL, None),
        (KAFKA_SSL_PROVIDER, None),
        (KAFKA_BATCH_SIZE, Some("16384")),
        (KAFKA_CLIENT_ID, Some(DEFAULT_CLIENT_ID)),
        (KAFKA_CONNECTIONS_MAX_IDLE_MS, Some("180000")),
        (KAFKA_BUFFER_MEMORY, None),
        (KAFKA_RETRIES, None),
        (KAFKA_LINGER_MS, None),
        (KAFKA_DELIVERY_TIMEOUT_MS, None),
        (KAFKA_CLIENT_DNS_LOOKUP, None),
        (BUILD_NUMBER, Some("0")),
    ]
}

fn optional(params: &HashMap<String, String>, key: &str) -> Option<String> {
    params
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn required(params: &HashMap<String, String>, key: &'static str) -> Result<String, ConfigError> {
    optional(params, key).ok_or(ConfigError::MissingParameter(key))
}

fn number(params: &HashMap<String, String>, key: &'static str) -> Result<Option<u64>, ConfigError> {
    optional(params, key)
        .map(|value| {
            value
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidNumber { key, value })
        })
        .transpose()
}

fn signed_number(
    params: &HashMap<String, String>,
    key: &'static str,
) -> Result<Option<i64>, ConfigError> {
    optional(params, key)
        .map(|value| {
            value
                .parse::<i64>()
                .map_err(|_| ConfigError::InvalidNumber { key, value })
        })
        .transpose()
}

fn boolean(
    params: &HashMap<String, String>,
    key: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    match optional(params, key) {
        None => Ok(default),
        Some(value) => value
            .to_lowercase()
            .parse::<bool>()
            .map_err(|_| ConfigError::InvalidBool { key, value }),
    }
}

/// Split a semicolon-separated parameter into lower-cased, trimmed entries.
fn list(params: &HashMap<String, String>, key: &str) -> Vec<String> {
    optional(params, key)
        .map(|raw| {
            raw.split(';')
                .map(|entry| entry.trim().to_lowercase())
                .filter(|entry| !entry.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn params() -> HashMap<String, String> {
        let mut params = HashMap::new();
        params.insert(
            KAFKA_BOOTSTRAP_SERVERS.to_string(),
            "localhost:9092".to_string(),
        );
        params.insert(KAFKA_TOPIC.to_string(), "load-test-results".to_string());
        params
    }

    #[test]
    fn test_minimal_parameters_use_defaults() {
        let config = ListenerConfig::from_parameters(&params()).unwrap();

        assert_eq!(config.topic, "load-test-results");
        assert_eq!(config.mode, SampleMode::Info);
        assert_eq!(config.producer.acks, "1");
        assert_eq!(config.producer.client_id, DEFAULT_CLIENT_ID);
        assert_eq!(config.producer.batch_size, 16_384);
        assert_eq!(config.producer.connections_max_idle_ms, 180_000);
        assert!(config.producer.tls.is_none());
        assert!(config.sample_filters.is_empty());
        assert!(config.row.fields.is_empty());
        assert_eq!(config.row.build_number, 0);
    }

    #[test]
    fn test_missing_topic_is_rejected() {
        let mut params = params();
        params.remove(KAFKA_TOPIC);

        let result = ListenerConfig::from_parameters(&params);
        assert!(matches!(result, Err(ConfigError::MissingParameter(KAFKA_TOPIC))));
    }

    #[test]
    fn test_missing_bootstrap_servers_is_rejected() {
        let mut params = params();
        params.insert(KAFKA_BOOTSTRAP_SERVERS.to_string(), "  ".to_string());

        let result = ListenerConfig::from_parameters(&params);
        assert!(matches!(
            result,
            Err(ConfigError::MissingParameter(KAFKA_BOOTSTRAP_SERVERS))
        ));
    }

    #[test]
    fn test_semicolon_lists_are_lowercased_and_trimmed() {
        let mut params = params();
        params.insert(
            KAFKA_SAMPLE_FILTER.to_string(),
            "Login; Checkout ;;".to_string(),
        );
        params.insert(KAFKA_FIELDS.to_string(), "SampleLabel;Success".to_string());

        let config = ListenerConfig::from_parameters(&params).unwrap();

        assert_eq!(config.sample_filters, vec!["login", "checkout"]);
        assert!(config.row.fields.contains("samplelabel"));
        assert!(config.row.fields.contains("success"));
    }

    #[test]
    fn test_non_service_parameters_become_custom_fields() {
        let mut params = params();
        params.insert("TestEnvironment".to_string(), "staging".to_string());
        params.insert("EmptyValue".to_string(), "  ".to_string());
        params.insert(BUILD_NUMBER.to_string(), "7".to_string());

        let config = ListenerConfig::from_parameters(&params).unwrap();

        assert_eq!(
            config.row.custom_fields,
            vec![("TestEnvironment".to_string(), "staging".to_string())]
        );
        assert_eq!(config.row.build_number, 7);
    }

    #[test]
    fn test_invalid_timestamp_pattern_is_rejected() {
        let mut params = params();
        params.insert(KAFKA_TIMESTAMP.to_string(), "%Y-%Q".to_string());

        let result = ListenerConfig::from_parameters(&params);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidTimestampFormat(_))
        ));
    }

    #[test]
    fn test_invalid_boolean_is_rejected() {
        let mut params = params();
        params.insert(KAFKA_PARSE_REQ_HEADERS.to_string(), "yes".to_string());

        let result = ListenerConfig::from_parameters(&params);
        assert!(matches!(result, Err(ConfigError::InvalidBool { .. })));
    }

    #[test]
    fn test_tls_settings_only_load_when_enabled() {
        let mut params = params();
        params.insert(
            KAFKA_SSL_KEYSTORE_LOCATION.to_string(),
            "/etc/kafka/client.p12".to_string(),
        );

        let config = ListenerConfig::from_parameters(&params).unwrap();
        assert!(config.producer.tls.is_none());

        params.insert(KAFKA_SSL_ENABLED.to_string(), "true".to_string());
        let config = ListenerConfig::from_parameters(&params).unwrap();
        let tls = config.producer.tls.unwrap();
        assert_eq!(tls.keystore_location.as_deref(), Some("/etc/kafka/client.p12"));
    }

    #[test]
    fn test_default_parameter_table_covers_required_keys() {
        let defaults = default_parameters();
        let keys = defaults.iter().map(|(key, _)| *key).collect::<Vec<_>>();

        assert!(keys.contains(&KAFKA_BOOTSTRAP_SERVERS));
        assert!(keys.contains(&KAFKA_TOPIC));
        assert!(keys.contains(&KAFKA_TEST_MODE));
    }
}
