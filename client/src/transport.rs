use std::time::Duration;

use comms::{
    ClientId,
    msg::{
        Ack, CLIENT_UPDATE_PATH, ClientUpdateRequest, ErrorResponse, GLOBAL_MODEL_PATH,
        GlobalModelResponse, REGISTER_PATH, RegisterRequest, UpdateResponse,
    },
};
use log::debug;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;

use crate::error::TransportErr;

/// The client's view of the coordinator.
#[trait_variant::make(Transport: Send)]
pub trait TransportTemplate {
    /// Registers this client with the coordinator.
    async fn register(&self, client_id: ClientId) -> Result<(), TransportErr>;

    /// Fetches the current global model.
    async fn fetch_global(&self) -> Result<GlobalModelResponse, TransportErr>;

    /// Submits locally trained weights.
    ///
    /// # Arguments
    /// * `update` - The client's weights and metrics.
    async fn submit(&self, update: &ClientUpdateRequest) -> Result<UpdateResponse, TransportErr>;
}

/// `Transport` speaking the coordinator's HTTP/JSON api.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: Client,
    base: String,
}

impl HttpTransport {
    /// Creates a new `HttpTransport`.
    ///
    /// # Arguments
    /// * `server_address` - The coordinator's base url, e.g. `http://localhost:5001`.
    /// * `timeout` - Upper bound for every request, `None` waits forever.
    pub fn new(server_address: &str, timeout: Option<Duration>) -> Result<Self, TransportErr> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            http: builder.build()?,
            base: server_address.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }
}

impl Transport for HttpTransport {
    async fn register(&self, client_id: ClientId) -> Result<(), TransportErr> {
        let res = self
            .http
            .post(self.url(REGISTER_PATH))
            .json(&RegisterRequest { client_id })
            .send()
            .await?;

        let _: Ack = decode(res).await?;
        Ok(())
    }

    async fn fetch_global(&self) -> Result<GlobalModelResponse, TransportErr> {
        let res = self.http.get(self.url(GLOBAL_MODEL_PATH)).send().await?;
        decode(res).await
    }

    async fn submit(&self, update: &ClientUpdateRequest) -> Result<UpdateResponse, TransportErr> {
        let res = self
            .http
            .post(self.url(CLIENT_UPDATE_PATH))
            .json(update)
            .send()
            .await?;

        decode(res).await
    }
}

/// Decodes a successful response body, or turns a failure status into a `TransportErr`.
async fn decode<T: DeserializeOwned>(res: Response) -> Result<T, TransportErr> {
    let status = res.status();
    if status.is_success() {
        let body = res.bytes().await?;
        return Ok(serde_json::from_slice(&body)?);
    }

    let body = res.text().await.unwrap_or_default();
    debug!("coordinator answered {status}: {body}");

    let (kind, message) = match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(err) => (Some(err.kind), err.error),
        Err(_) => (None, body),
    };

    Err(TransportErr::Status {
        status: status.as_u16(),
        kind,
        message,
    })
}
