use serde::Serialize;
use crate::batch::{Batch, Stream};
use crate::error::{Result, ShipError};
use crate::labels::LabelSet;

/// Added to a stream's labels when its entries are spread over several shards.
pub const SHARD_LABEL: &str = "__stream_shard__";

/// JSON body of a Loki `/loki/api/v1/push` request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushRequest {
    pub streams: Vec<PushStream>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushStream {
    pub stream: LabelSet,
    /// `[unix epoch in nanoseconds, log line]`
    pub values: Vec<[String; 2]>,
}

impl PushStream {

    /// One push stream per shard. Shard 1 keeps the stream labels unchanged.
    fn from_stream(stream: &Stream) -> Result<Vec<Self>> {
        let mut out = Vec::new();
        for (shard, entries) in stream.by_shard() {
            let mut labels = stream.labels().clone();
            if shard > 1 {
                labels.insert(SHARD_LABEL, shard.to_string());
            }

            let mut values = Vec::with_capacity(entries.len());
            for e in entries {
                // nanoseconds since epoch only fit an i64 up to year 2262
                let ns = e.timestamp.timestamp_nanos_opt()
                            .ok_or_else(|| ShipError::Sink(
                                format!("timestamp {} of stream {} out of range", e.timestamp, stream.labels())))?;
                values.push([ns.to_string(), e.line.clone()]);
            }

            out.push(Self {
                stream: labels,
                values: values,
            });
        }
        Ok(out)
    }
}

impl PushRequest {

    pub fn from_batch(batch: &Batch) -> Result<Self> {
        let mut streams = Vec::new();
        for stream in batch.streams() {
            streams.extend(PushStream::from_stream(stream)?);
        }
        Ok(Self { streams: streams })
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use chrono::{TimeZone, Utc};
    use crate::batch::Entry;
    use crate::sharding::{RateTracker, StreamSharding};

    fn entry(labels: &Arc<LabelSet>, line: &str, secs: i64) -> Entry {
        Entry::new(labels.clone(), line.to_string(), Utc.timestamp_opt(secs, 1).unwrap())
    }

    #[test]
    fn test_body_layout() {
        let labels = Arc::new(LabelSet::from_iter(vec![("__aws_log_type", "kinesis")]));
        let mut batch = Batch::new(1.0, Duration::from_secs(1));
        batch.add(entry(&labels, "first", 1643018400)).unwrap();
        batch.add(entry(&labels, "second \"quoted\"", 1643018401)).unwrap();

        let req = PushRequest::from_batch(&batch).unwrap();
        let body = serde_json::to_value(&req).unwrap();
        assert_eq!(body, serde_json::json!({
            "streams": [{
                "stream": {"__aws_log_type": "kinesis"},
                "values": [
                    ["1643018400000000001", "first"],
                    ["1643018401000000001", "second \"quoted\""],
                ],
            }],
        }));
    }

    #[test]
    fn test_sharded_stream_gets_shard_label() {
        // 3 MiB over a one second window asks for three shards
        let start = Instant::now();
        let mut tracker = RateTracker::new_at(Duration::from_secs(1), start);
        tracker.update_at(3 * 1024 * 1024, start + Duration::from_secs(1));
        let mut batch = Batch::with_sharding(StreamSharding::with_tracker(1.0, tracker));

        let labels = Arc::new(LabelSet::from_iter(vec![("job", "x")]));
        for i in 0..64 {
            batch.add(entry(&labels, "line", 1643018400 + i)).unwrap();
        }

        let req = PushRequest::from_batch(&batch).unwrap();
        let total: usize = req.streams.iter().map(|s| s.values.len()).sum();
        assert_eq!(total, 64);

        for stream in &req.streams {
            assert_eq!(stream.stream.get("job"), Some("x"));
            match stream.stream.get(SHARD_LABEL) {
                None => {},
                Some(shard) => assert!(shard == "2" || shard == "3"),
            }
        }
    }

    #[test]
    fn test_timestamp_out_of_nanosecond_range() {
        let labels = Arc::new(LabelSet::from_iter(vec![("job", "x")]));
        let mut batch = Batch::new(1.0, Duration::from_secs(1));
        let far = Utc.with_ymd_and_hms(9999, 1, 1, 0, 0, 0).unwrap();
        batch.add(Entry::new(labels, "late".to_string(), far)).unwrap();

        assert!(matches!(PushRequest::from_batch(&batch), Err(ShipError::Sink(_))));
    }

    #[test]
    fn test_empty_batch() {
        let batch = Batch::new(1.0, Duration::from_secs(1));
        assert!(PushRequest::from_batch(&batch).unwrap().is_empty());
    }
}
