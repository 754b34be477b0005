use std::sync::Arc;
use std::time::Duration;
use std::collections::BTreeMap;
use chrono::{DateTime, Utc};
use crate::error::{Result, ShipError};
use crate::labels::LabelSet;
use crate::sharding::StreamSharding;

/// One normalized log line, as produced by a parser.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub labels: Arc<LabelSet>,
    pub line: String,
    pub timestamp: DateTime<Utc>,
}

impl Entry {
    pub fn new(labels: Arc<LabelSet>, line: String, timestamp: DateTime<Utc>) -> Self {
        Self {
            labels: labels,
            line: line,
            timestamp: timestamp,
        }
    }
}

/// An entry once it sits in a stream, tagged with the shard it is sent on.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEntry {
    pub timestamp: DateTime<Utc>,
    pub line: String,
    pub shard: i64,
}

/// Entries sharing one exact label set, in arrival order.
#[derive(Debug, Clone)]
pub struct Stream {
    labels: Arc<LabelSet>,
    entries: Vec<StreamEntry>,
}

impl Stream {

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn entries(&self) -> &[StreamEntry] {
        &self.entries
    }

    /// Splits the stream by shard, keeping arrival order inside each shard.
    pub fn by_shard(&self) -> BTreeMap<i64, Vec<&StreamEntry>> {
        let mut shards: BTreeMap<i64, Vec<&StreamEntry>> = BTreeMap::new();
        for entry in &self.entries {
            shards.entry(entry.shard).or_default().push(entry);
        }
        shards
    }
}

/// Everything one invocation collected, pushed once as a whole.
#[derive(Debug)]
pub struct Batch {
    streams: BTreeMap<Arc<LabelSet>, Stream>,
    size: usize,
    entries: usize,
    sharding: StreamSharding,
}

impl Batch {

    pub fn new(desired_rate: f64, window: Duration) -> Self {
        Self::with_sharding(StreamSharding::new(desired_rate, window))
    }

    pub fn with_sharding(sharding: StreamSharding) -> Self {
        Self {
            streams: BTreeMap::new(),
            size: 0,
            entries: 0,
            sharding: sharding,
        }
    }

    pub fn add(&mut self, entry: Entry) -> Result<()> {

        if entry.labels.is_empty() {
            return Err(ShipError::EmptyLabelSet);
        }

        let bytes = entry.line.len();
        self.sharding.update(bytes as u64);
        let shard = self.sharding.pick_shard();

        let stream = self.streams
                        .entry(entry.labels.clone())
                        .or_insert_with(|| Stream {
                            labels: entry.labels.clone(),
                            entries: Vec::new(),
                        });
        stream.entries.push(StreamEntry {
            timestamp: entry.timestamp,
            line: entry.line,
            shard: shard,
        });

        self.size += bytes;
        self.entries += 1;
        Ok(())
    }

    pub fn streams(&self) -> impl Iterator<Item = &Stream> {
        self.streams.values()
    }

    pub fn stream(&self, labels: &LabelSet) -> Option<&Stream> {
        self.streams.get(labels)
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    pub fn entry_count(&self) -> usize {
        self.entries
    }

    /// Total bytes of log lines added.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    pub fn shards(&self) -> i64 {
        self.sharding.shards()
    }

    /// Hands the whole batch to the sink, consuming it.
    pub async fn push<S: SinkClient>(self, sink: &S) -> Result<()> {
        sink.push(&self).await
    }
}

/// Receiving end of a batch, e.g. a Loki push client.
pub trait SinkClient {
    async fn push(&self, batch: &Batch) -> Result<()>;
}
