use std::sync::Arc;
use log::{info, debug};
use crate::batch::{Batch, SinkClient};
use crate::conf::Settings;
use crate::error::Result;
use crate::kinesis::KinesisRecord;
use crate::labels::LabelSet;
use crate::s3::{ObjectMetadata, S3LogFormat, S3LogLines, S3ObjectRecord};
use crate::stats::InvocationStats;
use crate::transfer::{LbTagClient, ObjectStore};

/// Runs one provider event batch through parsing, labeling and delivery.
///
/// Records are visited in delivery order and every failure aborts the whole
/// invocation before anything reaches the sink.
pub struct Shipper<C, S> {
    settings: Settings,
    clients: C,
    sink: S,
}

impl<C, S> Shipper<C, S>
where
    C: ObjectStore + LbTagClient,
    S: SinkClient,
{

    pub fn new(settings: Settings, clients: C, sink: S) -> Self {
        Self {
            settings: settings,
            clients: clients,
            sink: sink,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Rate tracking and sharding live exactly as long as the batch.
    pub fn new_batch(&self) -> Batch {
        Batch::new(self.settings.stream_desired_rate, self.settings.stream_rate_window)
    }

    pub async fn process_s3_event(&self, records: &[S3ObjectRecord]) -> Result<InvocationStats> {

        let mut batch = self.new_batch();
        let mut stats = InvocationStats::new();

        for record in records {
            let meta = ObjectMetadata::parse(&record.key);
            let format = meta.format()?;

            let mut labels = meta.base_labels()?;
            if format == S3LogFormat::LoadBalancer && !self.settings.tag_labels.is_empty() {
                info!("fetching elb tags: {}", meta.require("src")?);
                labels.merge(&self.lb_tag_labels(&meta).await?);
            }
            let labels = Arc::new(self.settings.label_policy.apply(labels));

            info!("fetching s3 file: s3://{}/{}", record.bucket, record.key);
            let data = self.clients.get_object(&record.region, &record.bucket, &record.key).await?;

            let lines = S3LogLines::new(&data, &record.key, format, labels)
                            .print_log_line(self.settings.print_log_line);
            for entry in lines {
                let entry = entry?;
                stats.entries += 1;
                stats.bytes += entry.line.len();
                batch.add(entry)?;
            }
            stats.records += 1;
        }

        self.push(batch, stats).await
    }

    pub async fn process_kinesis_event(&self, records: &[KinesisRecord]) -> Result<InvocationStats> {

        let mut batch = self.new_batch();
        let mut stats = InvocationStats::new();

        for record in records {
            let labels = Arc::new(self.settings.label_policy.apply(record.labels()));
            let entry = record.to_entry(labels);
            stats.entries += 1;
            stats.bytes += entry.line.len();
            batch.add(entry)?;
            stats.records += 1;
        }

        self.push(batch, stats).await
    }

    /// Tags of the load balancer named by the object key, mapped to labels.
    pub async fn lb_tag_labels(&self, meta: &ObjectMetadata) -> Result<LabelSet> {
        let region = meta.require("region")?;
        let name = meta.require("src")?;

        let tags = self.clients.describe_tags(region, name).await?;
        let labels = self.settings.tag_labels.resolve(&tags);
        debug!("elb {} tags resolved to labels {}", name, labels);
        Ok(labels)
    }

    async fn push(&self, batch: Batch, mut stats: InvocationStats) -> Result<InvocationStats> {

        stats.streams = batch.stream_count();
        if batch.is_empty() {
            info!("nothing to push, {}", stats);
            return Ok(stats);
        }

        debug!("pushing {} streams over {} shards", batch.stream_count(), batch.shards());
        batch.push(&self.sink).await?;
        info!("batch pushed, {}", stats);
        Ok(stats)
    }
}
