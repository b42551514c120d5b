use async_trait::async_trait;
use cratedrop_models::{Context, Crate, QueueItem};
use std::sync::OnceLock;
use tokio::sync::Mutex;
use tracing::info;

use crate::{
    Result, error::Error, resource::CredentialRefresher, transport::TrackSource,
};

type ApiClient = cratedrop_client::Client;

/// Library client that logs in on first use.
#[derive(Debug)]
pub struct Client {
    api_client: OnceLock<ApiClient>,
    server_url: String,
    email: String,
    password: String,
    client_initiated: Mutex<bool>,
}

impl Client {
    pub fn new(server_url: String, email: String, password: String) -> Self {
        Self {
            api_client: Default::default(),
            server_url,
            email,
            password,
            client_initiated: Mutex::new(false),
        }
    }

    async fn init_client(&self) -> Result<ApiClient> {
        info!("Logging in to {}", self.server_url);
        let client =
            cratedrop_client::client::new(&self.server_url, &self.email, &self.password).await?;
        info!("Done");
        Ok(client)
    }

    async fn get_client(&self) -> Result<&ApiClient> {
        if let Some(client) = self.api_client.get() {
            return Ok(client);
        }

        let mut initiated = self.client_initiated.lock().await;

        if !*initiated {
            let client = self.init_client().await?;

            self.api_client.set(client).or(Err(Error::Client {
                message: "Unable to set client".to_string(),
            }))?;
            *initiated = true;
            drop(initiated);
        }

        self.api_client.get().ok_or_else(|| Error::Client {
            message: "Client not initialized".to_string(),
        })
    }

    pub async fn login(&self) -> Result<()> {
        self.get_client().await.map(|_| ())
    }

    pub async fn track(&self, id: &str) -> Result<QueueItem> {
        let client = self.get_client().await?;
        let track = client.track(id).await?;
        let stream_url = client.stream_url(&track.id)?;
        Ok(QueueItem::from_track(track, stream_url))
    }

    pub async fn crates(&self) -> Result<Vec<Crate>> {
        let client = self.get_client().await?;
        Ok(client.crates().await?)
    }

    pub async fn stream(&self, stream_url: &str) -> Result<Vec<u8>> {
        let client = self.get_client().await?;
        Ok(client.stream(stream_url).await?)
    }
}

#[async_trait]
impl TrackSource for Client {
    async fn tracks(&self, context: &Context, limit: u32) -> Result<Vec<QueueItem>> {
        let client = self.get_client().await?;
        let query = cratedrop_client::TrackQuery::new(context.clone(), limit);
        let list = client.tracks(&query).await?;

        list.tracks
            .into_iter()
            .map(|track| -> Result<QueueItem> {
                let stream_url = client.stream_url(&track.id)?;
                Ok(QueueItem::from_track(track, stream_url))
            })
            .collect()
    }
}

#[async_trait]
impl CredentialRefresher for Client {
    async fn refresh(&self) -> Result<()> {
        let client = self.get_client().await?;
        Ok(client.refresh().await?)
    }
}
