use std::time::{Duration, Instant};
use tracing::{debug, info};
use lokilogs::{Batch, Result, ShipError, ShipperConfig, SinkClient};
use lokilogs::push::PushRequest;

const PUSH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq)]
pub enum Auth {
    None,
    Basic {
        username: String,
        password: Option<String>,
    },
    Bearer(String),
}

impl Auth {

    /// A bearer token wins over basic credentials.
    pub fn from_config(conf: &ShipperConfig) -> Self {
        if let Some(token) = &conf.bearer_token {
            return Self::Bearer(token.clone());
        }
        match &conf.username {
            Some(username) => Self::Basic {
                username: username.clone(),
                password: conf.password.clone(),
            },
            None => Self::None,
        }
    }
}

/// Posts a batch as one Loki JSON push request.
#[derive(Debug, Clone)]
pub struct LokiPushClient {
    client: reqwest::Client,
    write_address: String,
    tenant_id: Option<String>,
    auth: Auth,
}

impl LokiPushClient {

    pub fn from_config(conf: &ShipperConfig) -> Result<Self> {

        let write_address = match &conf.write_address {
            Some(addr) if !addr.trim().is_empty() => addr.trim().to_string(),
            _ => return Err(ShipError::Config("write_address is required".to_string())),
        };

        let client = reqwest::Client::builder()
                        .timeout(PUSH_TIMEOUT)
                        .build()
                        .map_err(|e| ShipError::Sink(e.to_string()))?;

        Ok(Self {
            client: client,
            write_address: write_address,
            tenant_id: conf.tenant_id.clone(),
            auth: Auth::from_config(conf),
        })
    }

    pub fn write_address(&self) -> &str {
        &self.write_address
    }

    fn request(&self, body: &PushRequest) -> reqwest::RequestBuilder {
        let mut req = self.client
                        .post(&self.write_address)
                        .json(body);

        if let Some(tenant) = &self.tenant_id {
            req = req.header("X-Scope-OrgID", tenant);
        }
        match &self.auth {
            Auth::None => req,
            Auth::Basic { username, password } => req.basic_auth(username, password.as_ref()),
            Auth::Bearer(token) => req.bearer_auth(token),
        }
    }
}

impl SinkClient for LokiPushClient {

    async fn push(&self, batch: &Batch) -> Result<()> {

        let body = PushRequest::from_batch(batch)?;
        if body.is_empty() {
            debug!("empty push request, skipped");
            return Ok(());
        }

        let now = Instant::now();
        let resp = self.request(&body)
                        .send()
                        .await
                        .map_err(|e| ShipError::Sink(format!("push to {} failed: {}", self.write_address, e)))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ShipError::Sink(format!("push to {} returned {}: {}", self.write_address, status, text)));
        }

        info!("pushed {} streams to {}, status: {}, cost: {:?}",
            body.streams.len(), self.write_address, status, now.elapsed());
        Ok(())
    }
}
