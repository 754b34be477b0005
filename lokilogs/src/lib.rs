pub mod error;
pub mod labels;
pub mod tags;
pub mod s3;
pub mod kinesis;
pub mod sharding;
pub mod batch;
pub mod push;
pub mod transfer;
pub mod conf;
pub mod stats;
pub mod shipper;

pub use error::{Result, ShipError};
pub use labels::{LabelPolicy, LabelSet};
pub use batch::{Batch, Entry, SinkClient};
pub use kinesis::KinesisRecord;
pub use s3::S3ObjectRecord;
pub use conf::{Settings, ShipperConfig};
pub use shipper::Shipper;
pub use transfer::{LbTagClient, ObjectStore, TransferManager};
