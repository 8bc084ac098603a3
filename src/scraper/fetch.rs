use std::time::Duration;

use reqwest::{Client, StatusCode, Url};
use thiserror::Error;
use tracing::{debug, instrument, warn};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build http client")]
    Client(#[source] reqwest::Error),
    #[error("request to {url} failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} responded with {status}")]
    Status { url: String, status: StatusCode },
}

#[derive(Debug)]
pub struct FetchedPage {
    pub status: StatusCode,
    pub body: String,
}

/// Downloads the occupancy page. Transport failures get one retry after `retry_delay`; an
/// error status is final.
#[derive(Clone, Debug)]
pub struct Fetcher {
    client: Client,
    url: String,
    retry_delay: Duration,
}

impl Fetcher {
    pub fn new(
        url: &str,
        user_agent: &str,
        timeout: Duration,
        retry_delay: Duration,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self {
            client,
            url: url.to_string(),
            retry_delay,
        })
    }

    #[instrument(level = "debug", skip(self), fields(url = %redact(&self.url)))]
    pub async fn fetch(&self) -> Result<FetchedPage, FetchError> {
        match self.attempt().await {
            Err(FetchError::Transport { source, .. }) => {
                warn!(error = %source, retry_in = ?self.retry_delay, "request failed, retrying once");
                tokio::time::sleep(self.retry_delay).await;
                self.attempt().await
            }
            result => result,
        }
    }

    /// One request, from connecting through reading the whole body.
    async fn attempt(&self) -> Result<FetchedPage, FetchError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|source| self.transport(source))?;

        let status = response.status();
        debug!(%status, "got response");
        if !status.is_success() {
            return Err(FetchError::Status {
                url: redact(&self.url),
                status,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|source| self.transport(source))?;
        Ok(FetchedPage { status, body })
    }

    fn transport(&self, source: reqwest::Error) -> FetchError {
        FetchError::Transport {
            url: redact(&self.url),
            source,
        }
    }
}

// the query string carries the access key
fn redact(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut url) => {
            url.set_query(None);
            url.to_string()
        }
        Err(_) => "<invalid url>".to_string(),
    }
}
