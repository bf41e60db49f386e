//! Client for the external per-guild paid subscription API
//!
//! Feature-flagged: when the API is not configured, server benefit lookups
//! degrade to supporter-record aggregation only.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// A guild's externally-managed paid subscription
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct GuildSubscription {
    pub refresh_rate_seconds: u32,
    pub max_feeds: u32,
}

pub struct GuildSubscriptionClient {
    client: reqwest::Client,
    base_url: Url,
    access_token: Option<String>,
}

impl GuildSubscriptionClient {
    pub fn new(base_url: String, access_token: Option<String>) -> Result<Self> {
        let mut base_url = Url::parse(&base_url)
            .with_context(|| format!("Invalid guild subscription base url '{base_url}'"))?;
        // Url::join drops the last path segment unless the base ends in '/'
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build guild subscription HTTP client")?;

        Ok(Self {
            client,
            base_url,
            access_token,
        })
    }

    /// Fetch the guild's subscription, if any. A 404 means no subscription.
    pub async fn subscription(&self, guild_id: &str) -> Result<Option<GuildSubscription>> {
        let url = self
            .base_url
            .join(&format!("guilds/{guild_id}/subscription"))
            .with_context(|| format!("Invalid guild subscription path for guild {guild_id}"))?;
        debug!("Querying guild subscription API: {}", url);

        let mut request = self.client.get(url);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Guild subscription request failed for guild {guild_id}"))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = response
            .error_for_status()
            .with_context(|| format!("Guild subscription API error for guild {guild_id}"))?;

        let subscription = response
            .json::<GuildSubscription>()
            .await
            .with_context(|| format!("Invalid guild subscription payload for guild {guild_id}"))?;

        Ok(Some(subscription))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscription_found() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/guilds/guild-1/subscription")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"refresh_rate_seconds": 60, "max_feeds": 200}"#)
            .create_async()
            .await;

        let client = GuildSubscriptionClient::new(server.url(), None).unwrap();
        let subscription = client.subscription("guild-1").await.unwrap();

        mock.assert_async().await;
        assert_eq!(
            subscription,
            Some(GuildSubscription {
                refresh_rate_seconds: 60,
                max_feeds: 200,
            })
        );
    }

    #[tokio::test]
    async fn test_subscription_absent_on_404() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/guilds/guild-2/subscription")
            .with_status(404)
            .create_async()
            .await;

        let client = GuildSubscriptionClient::new(server.url(), None).unwrap();
        let subscription = client.subscription("guild-2").await.unwrap();
        assert_eq!(subscription, None);
    }

    #[tokio::test]
    async fn test_server_error_is_propagated() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/guilds/guild-3/subscription")
            .with_status(500)
            .create_async()
            .await;

        let client = GuildSubscriptionClient::new(server.url(), None).unwrap();
        assert!(client.subscription("guild-3").await.is_err());
    }
}
