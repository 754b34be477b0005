use std::sync::Arc;
use std::io::{BufRead, BufReader};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use chrono::{DateTime, Utc};
use flate2::read::MultiGzDecoder;
use regex::Regex;
use crate::batch::Entry;
use crate::error::{Result, ShipError};
use crate::labels::LabelSet;

pub const FLOW_LOG_TYPE: &str = "vpcflowlogs";
pub const LB_LOG_TYPE: &str = "elasticloadbalancing";

// AWS Application Load Balancers
// format:  bucket[/prefix]/AWSLogs/aws-account-id/elasticloadbalancing/region/yyyy/mm/dd/aws-account-id_elasticloadbalancing_region_app.load-balancer-id_end-time_ip-address_random-string.log.gz
// example: my-bucket/AWSLogs/123456789012/elasticloadbalancing/us-east-1/2022/01/24/123456789012_elasticloadbalancing_us-east-1_app.my-loadbalancer.b13ea9d19f16d015_20220124T0000Z_0.0.0.0_2et2e1mx.log.gz
// VPC Flow Logs
// format:  bucket-and-optional-prefix/AWSLogs/account_id/vpcflowlogs/region/year/month/day/aws_account_id_vpcflowlogs_region_flow_log_id_YYYYMMDDTHHmmZ_hash.log.gz
// example: 123456789012_vpcflowlogs_us-east-1_fl-1234abcd_20180620T1620Z_fe123456.log.gz
const S3_KEY_REGEX: &str = r"AWSLogs/(?P<account_id>\d+)/(?P<type>\w+)/(?P<region>[\w-]+)/(?P<year>\d+)/(?P<month>\d+)/(?P<day>\d+)/\d+_(?:elasticloadbalancing|vpcflowlogs)_\w+-\w+-\d_(?:(?:app|nlb|net)\.*?)?(?P<src>[a-zA-Z0-9\-]+)";

// first token of the line, then an RFC3339 timestamp with fractional seconds
const S3_LOG_REGEX_TIMESTAMP: &str = r"^\S+ (?P<timestamp>\d+-\d+-\d+T\d+:\d+:\d+\.\d+Z)";

fn key_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(S3_KEY_REGEX).expect("object key regex"))
}

fn timestamp_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(S3_LOG_REGEX_TIMESTAMP).expect("timestamp regex"))
}

/// The two log families stored under `AWSLogs/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S3LogFormat {
    VpcFlow,
    LoadBalancer,
}

impl S3LogFormat {

    pub fn from_type(log_type: &str) -> Option<Self> {
        match log_type {
            FLOW_LOG_TYPE => Some(Self::VpcFlow),
            LB_LOG_TYPE => Some(Self::LoadBalancer),
            _ => None,
        }
    }

    /// value of the `__aws_log_type` label
    pub fn log_type(&self) -> &'static str {
        match self {
            Self::VpcFlow => "s3_vpc_flow",
            Self::LoadBalancer => "s3_lb",
        }
    }

    /// flow logs start with a column header line
    pub fn skips_header(&self) -> bool {
        matches!(self, Self::VpcFlow)
    }
}

/// The object an S3 notification points at.
#[derive(Debug, Clone, PartialEq)]
pub struct S3ObjectRecord {
    pub region: String,
    pub bucket: String,
    pub key: String,
}

/// Structural fields pulled out of the object key with the `AWSLogs/` grammar.
///
/// A key outside the grammar leaves the set empty, lookups of a missing
/// field fail with [`ShipError::MissingMetadata`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectMetadata {
    key: String,
    fields: BTreeMap<String, String>,
}

impl ObjectMetadata {

    pub fn parse(key: &str) -> Self {

        let mut fields = BTreeMap::new();

        if let Some(caps) = key_regex().captures(key) {
            for name in key_regex().capture_names().flatten() {
                if let Some(m) = caps.name(name) {
                    fields.insert(name.to_string(), m.as_str().to_string());
                }
            }
        }

        Self {
            key: key.to_string(),
            fields: fields,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(|v| v.as_str())
    }

    pub fn require(&self, field: &'static str) -> Result<&str> {
        match self.get(field) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(ShipError::MissingMetadata {
                field: field,
                key: self.key.clone(),
            }),
        }
    }

    pub fn format(&self) -> Result<S3LogFormat> {
        let log_type = self.require("type")?;
        S3LogFormat::from_type(log_type)
            .ok_or_else(|| ShipError::UnsupportedLogType(log_type.to_string()))
    }

    /// log type, source and owning account labels
    pub fn base_labels(&self) -> Result<LabelSet> {
        let log_type = self.format()?.log_type();

        let mut labels = LabelSet::new();
        labels.insert("__aws_log_type", log_type);
        labels.insert(format!("__aws_{}", log_type), self.require("src")?);
        labels.insert(format!("__aws_{}_owner", log_type), self.require("account_id")?);
        Ok(labels)
    }
}

/// Lazily turns a gzip compressed S3 log object into entries.
///
/// Lines without an embedded timestamp reuse the previous one, or the wall
/// clock before the first match. A timestamp that matches the pattern but is
/// not valid RFC3339, or a decompression failure, ends the sequence with an error.
pub struct S3LogLines<R> {
    reader: R,
    key: String,
    format: S3LogFormat,
    labels: Arc<LabelSet>,
    timestamp: DateTime<Utc>,
    line_no: usize,
    print_log_line: bool,
    buf: Vec<u8>,
    done: bool,
}

impl<'a> S3LogLines<BufReader<MultiGzDecoder<&'a [u8]>>> {

    pub fn new(data: &'a [u8], key: &str, format: S3LogFormat, labels: Arc<LabelSet>) -> Self {
        Self::from_reader(BufReader::new(MultiGzDecoder::new(data)), key, format, labels)
    }
}

impl<R: BufRead> S3LogLines<R> {

    /// `reader` yields the decompressed object.
    pub fn from_reader(reader: R, key: &str, format: S3LogFormat, labels: Arc<LabelSet>) -> Self {
        Self {
            reader: reader,
            key: key.to_string(),
            format: format,
            labels: labels,
            timestamp: Utc::now(),
            line_no: 0,
            print_log_line: false,
            buf: Vec::new(),
            done: false,
        }
    }

    pub fn print_log_line(mut self, enabled: bool) -> Self {
        self.print_log_line = enabled;
        self
    }

    fn next_line(&mut self) -> Result<Option<String>> {
        self.buf.clear();
        let n = self.reader.read_until(b'\n', &mut self.buf)
                    .map_err(|e| ShipError::Decompress {
                        key: self.key.clone(),
                        source: e,
                    })?;
        if n == 0 {
            return Ok(None);
        }
        if self.buf.ends_with(b"\n") {
            self.buf.pop();
            if self.buf.ends_with(b"\r") {
                self.buf.pop();
            }
        }
        self.line_no += 1;
        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }

    fn parse_timestamp(&mut self, line: &str) -> Result<()> {
        if let Some(m) = timestamp_regex().captures(line).and_then(|c| c.name("timestamp")) {
            let ts = DateTime::parse_from_rfc3339(m.as_str())
                        .map_err(|e| ShipError::Timestamp {
                            key: self.key.clone(),
                            line: self.line_no,
                            value: m.as_str().to_string(),
                            source: e,
                        })?;
            self.timestamp = ts.with_timezone(&Utc);
        }
        Ok(())
    }
}

impl<R: BufRead> Iterator for S3LogLines<R> {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {

        if self.done {
            return None;
        }

        loop {
            let line = match self.next_line() {
                Ok(Some(line)) => line,
                Ok(None) => {
                    self.done = true;
                    return None;
                },
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                },
            };

            if self.line_no == 1 && self.format.skips_header() {
                continue;
            }
            if self.print_log_line {
                println!("{}", line);
            }

            if let Err(e) = self.parse_timestamp(&line) {
                self.done = true;
                return Some(Err(e));
            }

            return Some(Ok(Entry::new(self.labels.clone(), line, self.timestamp)));
        }
    }
}
