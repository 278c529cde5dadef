//! HTTP debug proxy transport.
//!
//! During development a device can be exposed by a proxy process that relays
//! APDUs over HTTP. The provider is configured with a static list of proxy
//! URLs; discovery reports each proxy that answers a probe, and a connection
//! POSTs `{"apduHex": "<hex>"}` and expects `{"data": "<hex>"}` back.

use crate::{
    Result, TransportError,
    providers::AnyConnection,
    traits::{DeviceConnection, NativeDescriptor, Sighting, TransportProvider},
};
use bytes::Bytes;
use devlink_core::constants::HTTP_DEBUG_TAG;
use devlink_core::{DeviceId, LinkConfig, TransportKind};
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeRequest {
    apdu_hex: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeReply {
    data: String,
}

/// Provider for devices exposed by HTTP debug proxies.
#[derive(Debug, Clone)]
pub struct HttpDebugProvider {
    urls: Vec<String>,
    client: reqwest::Client,
    probe_timeout: Duration,
}

impl HttpDebugProvider {
    /// Create a provider for a fixed list of proxy URLs.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn new(urls: Vec<String>, probe_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            urls,
            client,
            probe_timeout,
        })
    }

    /// Create a provider from the proxy list and probe timeout in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn from_config(config: &LinkConfig) -> Result<Self> {
        Self::new(config.proxy_urls(), config.probe_timeout())
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }
}

/// Check that something answers HTTP at `url`. Any status counts.
async fn probe(client: &reqwest::Client, url: &str, timeout: Duration) -> Result<()> {
    client.get(url).timeout(timeout).send().await?;
    Ok(())
}

impl TransportProvider for HttpDebugProvider {
    fn tag(&self) -> &str {
        HTTP_DEBUG_TAG
    }

    fn kind(&self) -> TransportKind {
        TransportKind::HttpDebug
    }

    fn discover(&self) -> BoxStream<'static, Result<Sighting>> {
        let client = self.client.clone();
        let timeout = self.probe_timeout;

        stream::iter(self.urls.clone())
            .filter_map(move |url| {
                let client = client.clone();
                async move {
                    match probe(&client, &url, timeout).await {
                        Ok(()) => Some(Ok(Sighting::added(
                            url.clone(),
                            NativeDescriptor::Text(url),
                        ))),
                        Err(error) => {
                            debug!(%url, %error, "Debug proxy unreachable");
                            None
                        }
                    }
                }
            })
            .boxed()
    }

    async fn open(&self, id: &DeviceId) -> Result<Option<AnyConnection>> {
        if !self.owns(id) {
            return Ok(None);
        }

        let url = id.payload().to_string();
        probe(&self.client, &url, self.probe_timeout)
            .await
            .map_err(|error| TransportError::open_failed(id, error.to_string()))?;

        debug!(%url, "Connected to debug proxy");
        Ok(Some(AnyConnection::HttpDebug(HttpDebugConnection {
            id: id.clone(),
            url,
            client: self.client.clone(),
            debug: false,
            closed: false,
        })))
    }
}

/// Connection relaying APDUs through one debug proxy.
#[derive(Debug)]
pub struct HttpDebugConnection {
    id: DeviceId,
    url: String,
    client: reqwest::Client,
    debug: bool,
    closed: bool,
}

impl HttpDebugConnection {
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl DeviceConnection for HttpDebugConnection {
    fn id(&self) -> &DeviceId {
        &self.id
    }

    async fn exchange(&mut self, apdu: &[u8]) -> Result<Bytes> {
        if self.closed {
            return Err(TransportError::disconnected(self.id.to_string()));
        }

        let request = ExchangeRequest {
            apdu_hex: hex::encode(apdu),
        };
        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|error| {
                if error.is_connect() {
                    TransportError::disconnected(self.id.to_string())
                } else {
                    error.into()
                }
            })?
            .error_for_status()?;

        let reply: ExchangeReply = response.json().await?;
        let data = hex::decode(&reply.data).map_err(|error| {
            TransportError::invalid_response(format!("proxy reply is not hex: {error}"))
        })?;

        Ok(Bytes::from(data))
    }

    fn set_debug_mode(&mut self, enabled: bool) {
        self.debug = enabled;
    }

    fn debug_mode(&self) -> bool {
        self.debug
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
