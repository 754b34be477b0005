use aws_lambda_events::event::kinesis::{KinesisEvent, KinesisEventRecord};
use aws_lambda_events::event::sqs::SqsEvent;
use aws_lambda_events::s3::{S3Event, S3EventRecord};
use lambda_runtime::Error;
use serde_json::Value;
use tracing::info;
use lokilogs::{KinesisRecord, S3ObjectRecord};

const S3_EVENT_SOURCE: &str = "aws:s3";
const KINESIS_EVENT_SOURCE: &str = "aws:kinesis";
const SQS_EVENT_SOURCE: &str = "aws:sqs";

// sent once by S3 when a notification is configured
const S3_TEST_EVENT: &str = "s3:TestEvent";

#[derive(Debug)]
pub struct EventError {
    pub body: String,
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.body)
    }
}

impl std::error::Error for EventError {}

fn event_error(body: String) -> Error {
    Box::new(EventError { body: body })
}

/// One invocation's records, converted to library types.
#[derive(Debug, PartialEq)]
pub enum ShipperEvent {
    S3(Vec<S3ObjectRecord>),
    Kinesis(Vec<KinesisRecord>),
}

impl ShipperEvent {

    /// Dispatches on the event source of the first record.
    pub fn from_payload(payload: Value) -> Result<Self, Error> {

        let source = payload["Records"][0]["eventSource"]
                        .as_str()
                        .map(|s| s.to_string())
                        .ok_or_else(|| event_error(format!("unrecognized event payload: {}", payload)))?;

        match source.as_str() {
            S3_EVENT_SOURCE => {
                let event: S3Event = serde_json::from_value(payload)?;
                Ok(Self::S3(s3_records(event)?))
            },
            SQS_EVENT_SOURCE => {
                let event: SqsEvent = serde_json::from_value(payload)?;
                Ok(Self::S3(sqs_records(event)?))
            },
            KINESIS_EVENT_SOURCE => {
                let event: KinesisEvent = serde_json::from_value(payload)?;
                Ok(Self::Kinesis(kinesis_records(event)?))
            },
            other => Err(event_error(format!("unsupported event source: {}", other))),
        }
    }
}

fn s3_record(record: S3EventRecord) -> Result<Option<S3ObjectRecord>, Error> {

    let event_name = record.event_name.unwrap_or_default();
    if !event_name.starts_with("ObjectCreated:") {
        info!("skip non object created event: {}", event_name);
        return Ok(None);
    }

    let region = record.aws_region
                    .ok_or_else(|| event_error("s3 record without awsRegion".to_string()))?;
    let bucket = record.s3.bucket.name
                    .ok_or_else(|| event_error("s3 record without bucket name".to_string()))?;
    let key = record.s3.object.key
                    .ok_or_else(|| event_error("s3 record without object key".to_string()))?;

    Ok(Some(S3ObjectRecord {
        region: region,
        bucket: bucket,
        key: key,
    }))
}

fn s3_records(event: S3Event) -> Result<Vec<S3ObjectRecord>, Error> {
    let mut records = Vec::with_capacity(event.records.len());
    for record in event.records {
        if let Some(record) = s3_record(record)? {
            records.push(record);
        }
    }
    Ok(records)
}

/// Every message body is an S3 notification, all of them form one batch.
fn sqs_records(event: SqsEvent) -> Result<Vec<S3ObjectRecord>, Error> {

    let mut records = Vec::new();

    for message in event.records {
        let message_id = message.message_id.unwrap_or_default();
        let body = message.body
                    .ok_or_else(|| event_error(format!("sqs message {} without body", message_id)))?;

        let value: Value = serde_json::from_str(&body)?;
        if value["Event"].as_str() == Some(S3_TEST_EVENT) {
            info!("skip s3 test event in sqs message {}", message_id);
            continue;
        }

        let s3event: S3Event = serde_json::from_value(value)?;
        records.extend(s3_records(s3event)?);
    }

    Ok(records)
}

fn kinesis_record(record: KinesisEventRecord) -> Result<KinesisRecord, Error> {
    let arn = record.event_source_arn
                .ok_or_else(|| event_error("kinesis record without eventSourceARN".to_string()))?;

    Ok(KinesisRecord {
        event_source_arn: arn,
        data: record.kinesis.data.0,
        approximate_arrival: record.kinesis.approximate_arrival_timestamp.0,
    })
}

fn kinesis_records(event: KinesisEvent) -> Result<Vec<KinesisRecord>, Error> {
    event.records.into_iter().map(kinesis_record).collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    const LB_KEY: &str = "my-bucket/AWSLogs/123456789012/elasticloadbalancing/us-east-1/2022/01/24/123456789012_elasticloadbalancing_us-east-1_app.my-loadbalancer.b13ea9d19f16d015_20220124T0000Z_0.0.0.0_2et2e1mx.log.gz";

    fn s3_event(event_name: &str, key: &str) -> Value {
        json!({
            "Records": [{
                "eventVersion": "2.1",
                "eventSource": "aws:s3",
                "awsRegion": "us-east-1",
                "eventTime": "2022-01-24T10:00:00.000Z",
                "eventName": event_name,
                "userIdentity": {"principalId": "AWS:AIDAEXAMPLE"},
                "requestParameters": {"sourceIPAddress": "127.0.0.1"},
                "responseElements": {
                    "x-amz-request-id": "EXAMPLE123456789",
                    "x-amz-id-2": "EXAMPLE123/5678abcdefghijklambdaisawesome/mnopqrstuvwxyzABCDEFGH"
                },
                "s3": {
                    "s3SchemaVersion": "1.0",
                    "configurationId": "lokilogs",
                    "bucket": {
                        "name": "my-bucket",
                        "ownerIdentity": {"principalId": "A3NL1KOZZKExample"},
                        "arn": "arn:aws:s3:::my-bucket"
                    },
                    "object": {
                        "key": key,
                        "size": 1024,
                        "eTag": "0123456789abcdef0123456789abcdef",
                        "sequencer": "0A1B2C3D4E5F678901"
                    }
                }
            }]
        })
    }

    fn sqs_event(bodies: &[Value]) -> Value {
        let records: Vec<Value> = bodies.iter().enumerate().map(|(i, body)| json!({
            "messageId": format!("059f36b4-87a3-44ab-83d2-66197583000{}", i),
            "receiptHandle": "AQEBwJnKyrHigUMZj6rYigCgxlaS3SLy0a",
            "body": body.to_string(),
            "attributes": {
                "ApproximateReceiveCount": "1",
                "SentTimestamp": "1545082649183",
                "SenderId": "AIDAIENQZJOLO23YVJ4VO",
                "ApproximateFirstReceiveTimestamp": "1545082649185"
            },
            "messageAttributes": {},
            "md5OfBody": "e4e68fb7bd0e697a0ae8f1bb342846b3",
            "eventSource": "aws:sqs",
            "eventSourceARN": "arn:aws:sqs:us-east-1:123456789012:lokilogs",
            "awsRegion": "us-east-1"
        })).collect();
        json!({ "Records": records })
    }

    #[test]
    fn test_s3_event() {
        let event = ShipperEvent::from_payload(s3_event("ObjectCreated:Put", LB_KEY)).unwrap();
        assert_eq!(event, ShipperEvent::S3(vec![S3ObjectRecord {
            region: "us-east-1".to_string(),
            bucket: "my-bucket".to_string(),
            key: LB_KEY.to_string(),
        }]));
    }

    #[test]
    fn test_s3_non_create_event_skipped() {
        let event = ShipperEvent::from_payload(s3_event("ObjectRemoved:Delete", LB_KEY)).unwrap();
        assert_eq!(event, ShipperEvent::S3(vec![]));
    }

    #[test]
    fn test_sqs_wrapped_s3_events_form_one_batch() {
        let test_event = json!({
            "Service": "Amazon S3",
            "Event": "s3:TestEvent",
            "Time": "2022-01-24T10:00:00.000Z",
            "Bucket": "my-bucket",
            "RequestId": "5582815E1AEA5ADF",
            "HostId": "8cLeGAmw098X5cv4Zkwcmo8vvZa3eH3eKxsPzbB9wrR+YstdA6Knx4Ip8EXAMPLE"
        });
        let payload = sqs_event(&[
            s3_event("ObjectCreated:Put", LB_KEY),
            test_event,
            s3_event("ObjectCreated:CompleteMultipartUpload", "my-bucket/other.log.gz"),
        ]);

        match ShipperEvent::from_payload(payload).unwrap() {
            ShipperEvent::S3(records) => {
                assert_eq!(records.len(), 2);
                assert_eq!(records[0].key, LB_KEY);
                assert_eq!(records[1].key, "my-bucket/other.log.gz");
            },
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_sqs_bad_body_fails() {
        let mut payload = sqs_event(&[json!({})]);
        payload["Records"][0]["body"] = json!("not json");
        assert!(ShipperEvent::from_payload(payload).is_err());
    }

    #[test]
    fn test_kinesis_event() {
        let payload = json!({
            "Records": [{
                "kinesis": {
                    "kinesisSchemaVersion": "1.0",
                    "partitionKey": "1",
                    "sequenceNumber": "49590338271490256608559692538361571095921575989136588898",
                    "data": "SGVsbG8sIHRoaXMgaXMgYSB0ZXN0Lg==",
                    "approximateArrivalTimestamp": 1545084650.987,
                    "encryptionType": "NONE"
                },
                "eventSource": "aws:kinesis",
                "eventVersion": "1.0",
                "eventID": "shardId-000000000006:49590338271490256608559692538361571095921575989136588898",
                "eventName": "aws:kinesis:record",
                "invokeIdentityArn": "arn:aws:iam::123456789012:role/lambda-role",
                "awsRegion": "us-east-2",
                "eventSourceARN": "arn:aws:kinesis:us-east-2:123456789012:stream/lambda-stream"
            }]
        });

        match ShipperEvent::from_payload(payload).unwrap() {
            ShipperEvent::Kinesis(records) => {
                assert_eq!(records.len(), 1);
                assert_eq!(records[0].event_source_arn, "arn:aws:kinesis:us-east-2:123456789012:stream/lambda-stream");
                assert_eq!(records[0].data, b"Hello, this is a test.".to_vec());
                assert_eq!(records[0].approximate_arrival.timestamp(), 1545084650);
            },
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_unsupported_source() {
        let payload = json!({"Records": [{"eventSource": "aws:dynamodb"}]});
        assert!(ShipperEvent::from_payload(payload).is_err());
        assert!(ShipperEvent::from_payload(json!({"detail": {}})).is_err());
    }
}
