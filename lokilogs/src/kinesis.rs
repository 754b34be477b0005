use std::sync::Arc;
use chrono::{DateTime, SubsecRound, Utc};
use crate::batch::Entry;
use crate::labels::LabelSet;

pub const KINESIS_LOG_TYPE: &str = "kinesis";

/// One record of a Kinesis stream batch.
#[derive(Debug, Clone, PartialEq)]
pub struct KinesisRecord {
    pub event_source_arn: String,
    pub data: Vec<u8>,
    pub approximate_arrival: DateTime<Utc>,
}

impl KinesisRecord {

    pub fn labels(&self) -> LabelSet {
        let mut labels = LabelSet::new();
        labels.insert("__aws_log_type", KINESIS_LOG_TYPE);
        labels.insert("__aws_kinesis_event_source_arn", self.event_source_arn.as_str());
        labels
    }

    /// The payload becomes exactly one entry, stamped with the arrival time
    /// truncated to whole seconds.
    ///
    /// Loki only accepts UTF-8 lines, so invalid byte sequences are replaced
    /// with U+FFFD. Valid UTF-8 passes through byte for byte, and the rate
    /// tracker counts the bytes actually shipped.
    pub fn to_entry(&self, labels: Arc<LabelSet>) -> Entry {
        Entry::new(labels,
                String::from_utf8_lossy(&self.data).into_owned(),
                self.approximate_arrival.trunc_subsecs(0))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_record_to_entry() {
        let record = KinesisRecord {
            event_source_arn: "arn:aws:kinesis:us-east-1:123456789012:stream/logs".to_string(),
            data: b"multi\nline payload stays whole".to_vec(),
            approximate_arrival: Utc.timestamp_opt(1643018400, 987_000_000).unwrap(),
        };

        let labels = record.labels();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels.get("__aws_log_type"), Some("kinesis"));
        assert_eq!(labels.get("__aws_kinesis_event_source_arn"),
                    Some("arn:aws:kinesis:us-east-1:123456789012:stream/logs"));

        let entry = record.to_entry(Arc::new(labels));
        assert_eq!(entry.line, "multi\nline payload stays whole");
        assert_eq!(entry.timestamp, Utc.timestamp_opt(1643018400, 0).unwrap());
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let record = KinesisRecord {
            event_source_arn: "arn:aws:kinesis:us-east-1:123456789012:stream/logs".to_string(),
            data: vec![b'o', b'k', 0xff, b'!'],
            approximate_arrival: Utc.timestamp_opt(1643018400, 0).unwrap(),
        };

        let entry = record.to_entry(Arc::new(record.labels()));
        assert_eq!(entry.line, "ok\u{FFFD}!");
        assert_eq!(entry.line.len(), 6);
    }
}
