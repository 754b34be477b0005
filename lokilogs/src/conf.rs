use std::env;
use std::time::Duration;
use std::collections::HashMap;
use log::warn;
use config::Config;
use serde::Deserialize;
use crate::error::{Result, ShipError};
use crate::labels::LabelPolicy;
use crate::tags::TagLabelMap;

const LOKILOGS_CONFIG_FILE_ENV: &str = "LOKILOGS_CONFIG_FILE";

const DEFAULT_STREAM_DESIRED_RATE: f64 = 1.0;
// in ms
const DEFAULT_STREAM_RATE_TRACKER_WINDOW_SIZE: u64 = 1000;

/// `elb_tags_as_labels` is a JSON object when it comes from the
/// environment and a table when it comes from a config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TagTable {
    Json(String),
    Table(HashMap<String, String>),
}

impl TagTable {
    fn into_map(self) -> Result<HashMap<String, String>> {
        match self {
            Self::Table(map) => Ok(map),
            Self::Json(s) if s.trim().is_empty() => Ok(HashMap::new()),
            Self::Json(s) => serde_json::from_str(&s)
                                .map_err(|e| ShipError::Config(format!("elb_tags_as_labels: {}", e))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShipperConfig {
    pub write_address: Option<String>,
    pub tenant_id: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub bearer_token: Option<String>,
    pub stream_desired_rate: f64,
    pub stream_rate_tracker_window_size: u64,
    pub extra_labels: String,
    pub omit_extra_labels_prefix: bool,
    pub drop_labels: String,
    pub print_log_line: bool,
    pub elb_tags_as_labels: Option<TagTable>,
}

impl Default for ShipperConfig {
    fn default() -> Self {
        Self {
            write_address: None,
            tenant_id: None,
            username: None,
            password: None,
            bearer_token: None,
            stream_desired_rate: DEFAULT_STREAM_DESIRED_RATE,
            stream_rate_tracker_window_size: DEFAULT_STREAM_RATE_TRACKER_WINDOW_SIZE,
            extra_labels: String::new(),
            omit_extra_labels_prefix: false,
            drop_labels: String::new(),
            print_log_line: false,
            elb_tags_as_labels: None,
        }
    }
}

/// Validated, compiled form of [`ShipperConfig`] used by the pipeline.
#[derive(Debug, Clone)]
pub struct Settings {
    pub stream_desired_rate: f64,
    pub stream_rate_window: Duration,
    pub print_log_line: bool,
    pub tag_labels: TagLabelMap,
    pub label_policy: LabelPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            stream_desired_rate: DEFAULT_STREAM_DESIRED_RATE,
            stream_rate_window: Duration::from_millis(DEFAULT_STREAM_RATE_TRACKER_WINDOW_SIZE),
            print_log_line: false,
            tag_labels: TagLabelMap::default(),
            label_policy: LabelPolicy::default(),
        }
    }
}

impl ShipperConfig {

    /// Optional file named by `LOKILOGS_CONFIG_FILE`, then the environment.
    pub fn load() -> Result<Self> {

        let mut builder = Config::builder();

        if let Ok(path) = env::var(LOKILOGS_CONFIG_FILE_ENV) {
            builder = builder.add_source(config::File::with_name(&path));
        }
        builder = builder.add_source(config::Environment::default());

        Self::from_config(builder.build()?)
    }

    pub fn from_config(config: Config) -> Result<Self> {
        Ok(config.try_deserialize::<Self>()?)
    }

    pub fn settings(&self) -> Result<Settings> {

        if !(self.stream_desired_rate.is_finite() && self.stream_desired_rate > 0.0) {
            return Err(ShipError::Config(
                format!("stream_desired_rate must be positive, got {}", self.stream_desired_rate)));
        }
        if self.stream_rate_tracker_window_size == 0 {
            return Err(ShipError::Config("stream_rate_tracker_window_size must be positive".to_string()));
        }

        let table = match &self.elb_tags_as_labels {
            Some(table) => table.clone().into_map()?,
            None => HashMap::new(),
        };
        let tag_labels = TagLabelMap::compile(&table)?;

        let label_policy = LabelPolicy::new(&self.extra_labels, self.omit_extra_labels_prefix, &self.drop_labels)?;

        if self.bearer_token.is_some() && (self.username.is_some() || self.password.is_some()) {
            warn!("both bearer token and basic auth configured, bearer token wins");
        }

        Ok(Settings {
            stream_desired_rate: self.stream_desired_rate,
            stream_rate_window: Duration::from_millis(self.stream_rate_tracker_window_size),
            print_log_line: self.print_log_line,
            tag_labels: tag_labels,
            label_policy: label_policy,
        })
    }
}
