use std::path::PathBuf;
use std::collections::HashMap;
use env_logger;
use structopt::StructOpt;
use lokilogs::{Batch, LbTagClient, ObjectStore, Result, Shipper, ShipperConfig, SinkClient, TransferManager};
use lokilogs::push::PushRequest;
use lokilogs::s3::S3ObjectRecord;

#[derive(Debug, StructOpt)]
#[structopt(about = "replay AWS S3 log objects through the loki shipping pipeline")]
enum SubCmd {
    #[structopt(about = "replay a gzip log file from local filesystem")]
    Local {
        #[structopt(short, long, display_order = 1, help = "S3 object key the file is treated as")]
        key: String,
        #[structopt(parse(from_os_str), display_order = 2, help = "log file from local filesystem")]
        file: PathBuf,
    },
    #[structopt(about = "replay a log object from S3")]
    S3 {
        #[structopt(short, display_order = 1, help = "region")]
        region: String,
        #[structopt(short, display_order = 2, help = "bucket")]
        bucket: String,
        #[structopt(short, display_order = 3, help = "key")]
        key: String,
    },
}

/// Serves object bodies from a local file, load balancer tags from AWS.
struct LocalObjectStore {
    file: PathBuf,
    aws: TransferManager,
}

impl ObjectStore for LocalObjectStore {
    async fn get_object(&self, _region: &str, _bucket: &str, _key: &str) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(&self.file).await?)
    }
}

impl LbTagClient for LocalObjectStore {
    async fn describe_tags(&self, region: &str, name: &str) -> Result<HashMap<String, String>> {
        self.aws.describe_tags(region, name).await
    }
}

/// Prints every pushed stream as one JSON line.
struct StdoutSink;

impl SinkClient for StdoutSink {
    async fn push(&self, batch: &Batch) -> Result<()> {
        let req = PushRequest::from_batch(batch)?;
        for stream in &req.streams {
            match serde_json::to_string(stream) {
                Ok(line) => println!("{}", line),
                Err(e) => return Err(lokilogs::ShipError::Sink(e.to_string())),
            }
        }
        Ok(())
    }
}

async fn cli_main(opt: SubCmd) -> Result<()> {

    let settings = ShipperConfig::load()?.settings()?;

    match opt {
        SubCmd::Local {key, file} => {
            let record = S3ObjectRecord {
                region: String::new(),
                bucket: String::new(),
                key: key,
            };
            let store = LocalObjectStore {
                file: file,
                aws: TransferManager::new(),
            };
            let shipper = Shipper::new(settings, store, StdoutSink);
            let stats = shipper.process_s3_event(&[record]).await?;
            eprintln!("{}", stats);
        },
        SubCmd::S3 {region, bucket, key} => {
            let record = S3ObjectRecord {
                region: region,
                bucket: bucket,
                key: key,
            };
            let shipper = Shipper::new(settings, TransferManager::new(), StdoutSink);
            let stats = shipper.process_s3_event(&[record]).await?;
            eprintln!("{}", stats);
        },
    }

    Ok(())
}

fn main() -> Result<()> {

    env_logger::init_from_env(
            env_logger::Env::default()
                        .filter_or(env_logger::DEFAULT_FILTER_ENV, format!("{}=info", env!("CARGO_PKG_NAME")))
    );

    let opt = SubCmd::from_args();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(cli_main(opt))
}
