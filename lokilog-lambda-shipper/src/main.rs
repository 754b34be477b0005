use std::sync::Arc;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;
use lokilogs::{Shipper, ShipperConfig, TransferManager};

mod event;
mod sink;

use event::ShipperEvent;
use sink::LokiPushClient;

type LambdaShipper = Shipper<TransferManager, LokiPushClient>;

async fn function_handler(shipper: &LambdaShipper, event: LambdaEvent<Value>) -> Result<(), Error> {

    let request_id = event.context.request_id.clone();

    let stats = match ShipperEvent::from_payload(event.payload)? {
        ShipperEvent::S3(records) => {
            info!("request {}: {} s3 records", request_id, records.len());
            shipper.process_s3_event(&records).await?
        },
        ShipperEvent::Kinesis(records) => {
            info!("request {}: {} kinesis records", request_id, records.len());
            shipper.process_kinesis_event(&records).await?
        },
    };

    info!("request {} done, {}", request_id, stats);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        // disabling time is handy because CloudWatch will add the ingestion time.
        .without_time()
        .init();

    let conf = ShipperConfig::load()?;
    let settings = conf.settings()?;
    let sink = LokiPushClient::from_config(&conf)?;
    info!("shipping to {}, {} elb tag mappings", sink.write_address(), settings.tag_labels.len());

    let shipper = Arc::new(Shipper::new(settings, TransferManager::new(), sink));

    run(service_fn(move |event: LambdaEvent<Value>| {
        let shipper = shipper.clone();
        async move { function_handler(&shipper, event).await }
    })).await
}
