use thiserror::Error;

pub type Result<T> = std::result::Result<T, ShipError>;

#[derive(Debug, Error)]
pub enum ShipError {
    #[error("failed to decompress object {key}: {source}")]
    Decompress {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid timestamp {value:?} at line {line} of object {key}: {source}")]
    Timestamp {
        key: String,
        line: usize,
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("missing {field} in metadata of object key {key:?}")]
    MissingMetadata {
        field: &'static str,
        key: String,
    },

    #[error("unsupported log type {0}")]
    UnsupportedLogType(String),

    #[error("failed to get load balancer {name} in region {region}")]
    LoadBalancerNotFound {
        name: String,
        region: String,
    },

    #[error("failed to get tags from load balancer {name} in region {region}")]
    LoadBalancerTagsNotFound {
        name: String,
        region: String,
    },

    #[error("failed to get object {key} from bucket {bucket}: {message}")]
    ObjectStore {
        bucket: String,
        key: String,
        message: String,
    },

    #[error("load balancer lookup for {name} failed: {message}")]
    LbClient {
        name: String,
        message: String,
    },

    #[error("could not define labels from tag {tag}: invalid label name {name:?}")]
    InvalidLabelName {
        tag: String,
        name: String,
    },

    #[error("could not define labels from tag {tag}: invalid regular expression {pattern}")]
    InvalidTagPattern {
        tag: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("could not define labels from tag {tag}: capture group must be named")]
    UnnamedCaptureGroup {
        tag: String,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    ConfigSource(#[from] config::ConfigError),

    #[error("entry has an empty label set")]
    EmptyLabelSet,

    #[error("failed to push batch: {0}")]
    Sink(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
