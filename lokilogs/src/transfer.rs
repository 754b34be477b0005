use std::future::Future;
use std::collections::HashMap;
use log::{debug, warn};
use tokio::sync::Mutex;
use aws_config::meta::region::RegionProviderChain;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_s3::config::Region;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_elasticloadbalancingv2 as elbv2;
use crate::error::{Result, ShipError};

/// Source of raw S3 log objects.
pub trait ObjectStore {
    async fn get_object(&self, region: &str, bucket: &str, key: &str) -> Result<Vec<u8>>;
}

/// Control plane lookup of load balancer tags.
///
/// Fails when the load balancer or its tag description does not exist.
pub trait LbTagClient {
    async fn describe_tags(&self, region: &str, name: &str) -> Result<HashMap<String, String>>;
}

/// Region keyed clients shared by every invocation of the process.
pub struct ClientCache<C> {
    clients: Mutex<HashMap<String, C>>,
}

impl<C: Clone> ClientCache<C> {

    pub fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Lock is held while a missing client is built, so one region is
    /// never initialized twice.
    pub async fn get_or_init<F, Fut>(&self, region: &str, init: F) -> C
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = C>,
    {
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(region) {
            return client.clone();
        }

        debug!("initializing client for region {}", region);
        let client = init(region.to_string()).await;
        clients.insert(region.to_string(), client.clone());
        client
    }

    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }
}

impl<C: Clone> Default for ClientCache<C> {
    fn default() -> Self {
        Self::new()
    }
}

async fn load_region_config(region: String) -> SdkConfig {
    let region_provider = RegionProviderChain::first_try(Region::new(region))
                                                .or_default_provider()
                                                .or_else(Region::new("us-west-2"));

    aws_config::defaults(BehaviorVersion::latest()).region(region_provider).load().await
}

/// AWS SDK backed S3 and ELBv2 access with per region client reuse.
#[derive(Default)]
pub struct TransferManager {
    s3: ClientCache<aws_sdk_s3::Client>,
    elb: ClientCache<elbv2::Client>,
}

impl TransferManager {

    pub fn new() -> Self {
        Self::default()
    }

    async fn s3_client(&self, region: &str) -> aws_sdk_s3::Client {
        self.s3.get_or_init(region, |r| async move {
            aws_sdk_s3::Client::new(&load_region_config(r).await)
        }).await
    }

    async fn elb_client(&self, region: &str) -> elbv2::Client {
        self.elb.get_or_init(region, |r| async move {
            elbv2::Client::new(&load_region_config(r).await)
        }).await
    }
}

impl ObjectStore for TransferManager {

    async fn get_object(&self, region: &str, bucket: &str, key: &str) -> Result<Vec<u8>> {

        let client = self.s3_client(region).await;
        let res = client.get_object()
                        .bucket(bucket)
                        .key(key)
                        .send()
                        .await;

        let output = match res {
            Ok(output) => output,
            Err(err) => {
                match err.as_service_error() {
                    Some(GetObjectError::NoSuchKey(msg)) => {
                        warn!("no such key error {}", msg);
                    },
                    Some(GetObjectError::InvalidObjectState(msg)) => {
                        warn!("invalid object state error {}", msg);
                    },
                    _ => {},
                }
                return Err(ShipError::ObjectStore {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    message: aws_sdk_s3::error::DisplayErrorContext(&err).to_string(),
                });
            },
        };

        read_body(output.body, bucket, key).await
    }
}

/// Drains an object body, copying the aggregated segments once.
async fn read_body(body: ByteStream, bucket: &str, key: &str) -> Result<Vec<u8>> {
    let body = body.collect().await
                    .map_err(|e| ShipError::ObjectStore {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                        message: e.to_string(),
                    })?;
    Ok(body.to_vec())
}

impl LbTagClient for TransferManager {

    async fn describe_tags(&self, region: &str, name: &str) -> Result<HashMap<String, String>> {

        let client = self.elb_client(region).await;

        let lbs = match client.describe_load_balancers().names(name).send().await {
            Ok(output) => output,
            Err(err) => {
                let not_found = err.as_service_error()
                                    .map(|e| e.is_load_balancer_not_found_exception())
                                    .unwrap_or(false);
                if not_found {
                    return Err(ShipError::LoadBalancerNotFound {
                        name: name.to_string(),
                        region: region.to_string(),
                    });
                }
                return Err(ShipError::LbClient {
                    name: name.to_string(),
                    message: elbv2::error::DisplayErrorContext(&err).to_string(),
                });
            },
        };

        let arn = lbs.load_balancers()
                    .first()
                    .and_then(|lb| lb.load_balancer_arn())
                    .ok_or_else(|| ShipError::LoadBalancerNotFound {
                        name: name.to_string(),
                        region: region.to_string(),
                    })?;

        let tags = client.describe_tags()
                        .resource_arns(arn)
                        .send()
                        .await
                        .map_err(|err| ShipError::LbClient {
                            name: name.to_string(),
                            message: elbv2::error::DisplayErrorContext(&err).to_string(),
                        })?;

        let description = tags.tag_descriptions()
                            .first()
                            .ok_or_else(|| ShipError::LoadBalancerTagsNotFound {
                                name: name.to_string(),
                                region: region.to_string(),
                            })?;

        let mut out = HashMap::new();
        for tag in description.tags() {
            let key: Option<&str> = tag.key().into();
            let value: Option<&str> = tag.value().into();
            if let Some(key) = key {
                out.insert(key.to_string(), value.unwrap_or_default().to_string());
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_client_cache_builds_once_per_region() {
        let cache: ClientCache<String> = ClientCache::new();
        let built = AtomicUsize::new(0);

        for region in ["us-east-1", "us-east-1", "eu-west-1", "us-east-1"] {
            let client = cache.get_or_init(region, |r| {
                built.fetch_add(1, Ordering::SeqCst);
                async move { format!("client-{}", r) }
            }).await;
            assert_eq!(client, format!("client-{}", region));
        }

        assert_eq!(built.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn test_read_body() {
        let data: Vec<u8> = (0..64 * 1024).map(|i| (i % 251) as u8).collect();
        let body = read_body(ByteStream::from(data.clone()), "my-bucket", "k").await.unwrap();
        assert_eq!(body, data);

        let empty = read_body(ByteStream::from(Vec::<u8>::new()), "my-bucket", "k").await.unwrap();
        assert!(empty.is_empty());
    }
}
