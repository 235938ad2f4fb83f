//! HTTP client for the upstream film-diary API.
//!
//! Authenticated with OAuth2 bearer tokens. Member-scoped calls take the
//! token of the member's session; public reads use an app-level
//! client-credentials token.

use std::time::{Duration, Instant};

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::types::{
    ActivityItem, FilmQuery, FilmRelationship, FilmSummary, ListEntry, ListSummary, LogEntry,
    MemberSummary, Page, PageRequest, RelationshipUpdate, TokenGrant,
};
use super::{UpstreamApi, UpstreamError};
use crate::metrics::{UPSTREAM_REQUESTS, UPSTREAM_REQUEST_DURATION};

/// Upstream client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamClientConfig {
    /// OAuth client id (required).
    pub client_id: String,
    /// OAuth client secret (required).
    pub client_secret: String,
    /// Base URL (default: https://api.letterboxd.com/api/v0).
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Request timeout in seconds (default: 30).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.letterboxd.com/api/v0".to_string()
}

fn default_timeout() -> u64 {
    30
}

/// Upstream API client.
pub struct HttpUpstreamClient {
    client: Client,
    base_url: String,
    client_id: String,
    client_secret: String,
}

impl HttpUpstreamClient {
    /// Create a new upstream client.
    pub fn new(config: UpstreamClientConfig) -> Result<Self, UpstreamError> {
        if config.client_id.is_empty() || config.client_secret.is_empty() {
            return Err(UpstreamError::NotConfigured(
                "upstream client_id and client_secret are required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client_id: config.client_id,
            client_secret: config.client_secret,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn get(&self, token: &str, path: &str) -> RequestBuilder {
        self.client.get(self.url(path)).bearer_auth(token)
    }

    fn paged(builder: RequestBuilder, request: &PageRequest) -> RequestBuilder {
        let mut builder = builder.query(&[("perPage", request.per_page.to_string())]);
        if let Some(cursor) = &request.cursor {
            builder = builder.query(&[("cursor", cursor.as_str())]);
        }
        if let Some(sort) = request.sort {
            builder = builder.query(&[("sort", sort.as_str())]);
        }
        builder
    }

    /// Send a request, map error statuses and decode the JSON body.
    async fn send_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        builder: RequestBuilder,
    ) -> Result<T, UpstreamError> {
        let started = Instant::now();
        let result = async {
            let response = builder.send().await?;
            let response = check_status(operation, response).await?;
            response.json::<T>().await.map_err(|e| {
                UpstreamError::Parse(format!("Failed to parse {} response: {}", operation, e))
            })
        }
        .await;

        UPSTREAM_REQUEST_DURATION
            .with_label_values(&[operation])
            .observe(started.elapsed().as_secs_f64());
        UPSTREAM_REQUESTS
            .with_label_values(&[operation, if result.is_ok() { "success" } else { "error" }])
            .inc();

        result
    }

    async fn token_grant(&self, form: &[(&str, &str)]) -> Result<TokenGrant, UpstreamError> {
        let builder = self.client.post(self.url("/auth/token")).form(form);
        self.send_json("auth_token", builder).await
    }
}

async fn check_status(operation: &str, response: Response) -> Result<Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(match status.as_u16() {
        401 => UpstreamError::Unauthorized(format!("{}: {}", operation, body)),
        404 => UpstreamError::NotFound(operation.to_string()),
        429 => UpstreamError::RateLimited,
        code => UpstreamError::Api {
            status: code,
            message: body,
        },
    })
}

#[async_trait::async_trait]
impl UpstreamApi for HttpUpstreamClient {
    async fn watchlist_page(
        &self,
        token: &str,
        member_id: &str,
        request: &PageRequest,
    ) -> Result<Page<FilmSummary>, UpstreamError> {
        debug!("Upstream watchlist page: member={}, cursor={:?}", member_id, request.cursor);
        let builder = Self::paged(
            self.get(token, &format!("/member/{}/watchlist", member_id)),
            request,
        );
        self.send_json("watchlist", builder).await
    }

    async fn log_entries_page(
        &self,
        token: &str,
        member_id: &str,
        request: &PageRequest,
    ) -> Result<Page<LogEntry>, UpstreamError> {
        debug!("Upstream diary page: member={}, cursor={:?}", member_id, request.cursor);
        let builder = Self::paged(self.get(token, "/log-entries"), request).query(&[
            ("member", member_id),
            ("memberRelationship", "Owner"),
            ("where", "HasDiaryDate"),
        ]);
        self.send_json("log_entries", builder).await
    }

    async fn list_entries_page(
        &self,
        token: &str,
        list_id: &str,
        request: &PageRequest,
    ) -> Result<Page<ListEntry>, UpstreamError> {
        debug!("Upstream list page: list={}, cursor={:?}", list_id, request.cursor);
        let builder = Self::paged(
            self.get(token, &format!("/list/{}/entries", list_id)),
            request,
        );
        self.send_json("list_entries", builder).await
    }

    async fn friends_activity_page(
        &self,
        token: &str,
        member_id: &str,
        request: &PageRequest,
    ) -> Result<Page<ActivityItem>, UpstreamError> {
        debug!("Upstream activity page: member={}, cursor={:?}", member_id, request.cursor);
        let builder = Self::paged(
            self.get(token, &format!("/member/{}/activity", member_id)),
            request,
        )
        .query(&[("where", "NotOwnActivity"), ("include", "FilmActivity")]);
        self.send_json("activity", builder).await
    }

    async fn films_page(
        &self,
        token: &str,
        query: &FilmQuery,
        request: &PageRequest,
    ) -> Result<Page<FilmSummary>, UpstreamError> {
        debug!("Upstream films page: query={:?}, cursor={:?}", query, request.cursor);
        let mut builder = Self::paged(self.get(token, "/films"), request);
        if let FilmQuery::Member {
            member_id,
            relationship,
        } = query
        {
            builder = builder.query(&[
                ("member", member_id.as_str()),
                ("memberRelationship", relationship.as_str()),
            ]);
        }
        self.send_json("films", builder).await
    }

    async fn film(&self, token: &str, film_id: &str) -> Result<FilmSummary, UpstreamError> {
        debug!("Upstream get film: id={}", film_id);
        self.send_json("film", self.get(token, &format!("/film/{}", film_id)))
            .await
    }

    async fn film_by_external_id(
        &self,
        token: &str,
        external_id: &str,
    ) -> Result<Option<FilmSummary>, UpstreamError> {
        debug!("Upstream film search: external_id={}", external_id);
        let builder = self.get(token, "/search").query(&[
            ("input", format!("imdb:{}", external_id).as_str()),
            ("include", "FilmSearchItem"),
            ("perPage", "1"),
        ]);
        let page: Page<SearchItem> = self.send_json("search_film", builder).await?;

        Ok(page
            .items
            .into_iter()
            .filter_map(|item| item.film)
            .find(|film| film.link_id("imdb") == Some(external_id)))
    }

    async fn member_id(&self, token: &str, username: &str) -> Result<Option<String>, UpstreamError> {
        debug!("Upstream member search: username={}", username);
        let builder = self.get(token, "/search").query(&[
            ("input", username),
            ("include", "MemberSearchItem"),
            ("perPage", "5"),
        ]);
        let page: Page<SearchItem> = self.send_json("search_member", builder).await?;

        Ok(page
            .items
            .into_iter()
            .filter_map(|item| item.member)
            .find(|member| member.username.eq_ignore_ascii_case(username))
            .map(|member| member.id))
    }

    async fn list(&self, token: &str, list_id: &str) -> Result<ListSummary, UpstreamError> {
        debug!("Upstream get list: id={}", list_id);
        self.send_json("list", self.get(token, &format!("/list/{}", list_id)))
            .await
    }

    async fn film_relationship(
        &self,
        token: &str,
        film_id: &str,
    ) -> Result<FilmRelationship, UpstreamError> {
        self.send_json(
            "film_relationship",
            self.get(token, &format!("/film/{}/me", film_id)),
        )
        .await
    }

    async fn update_film_relationship(
        &self,
        token: &str,
        film_id: &str,
        update: &RelationshipUpdate,
    ) -> Result<FilmRelationship, UpstreamError> {
        debug!("Upstream update relationship: film={}, update={:?}", film_id, update);
        let builder = self
            .client
            .patch(self.url(&format!("/film/{}/me", film_id)))
            .bearer_auth(token)
            .json(update);
        let response: RelationshipUpdateResponse =
            self.send_json("update_relationship", builder).await?;
        Ok(response.data)
    }

    async fn refresh_credential(&self, refresh_token: &str) -> Result<TokenGrant, UpstreamError> {
        self.token_grant(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
        ])
        .await
    }

    async fn client_credential(&self) -> Result<TokenGrant, UpstreamError> {
        self.token_grant(&[
            ("grant_type", "client_credentials"),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
        ])
        .await
    }
}

// ============================================================================
// Upstream API Response Types (private)
// ============================================================================

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default)]
    film: Option<FilmSummary>,
    #[serde(default)]
    member: Option<MemberSummary>,
}

#[derive(Debug, Deserialize)]
struct RelationshipUpdateResponse {
    data: FilmRelationship,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> UpstreamClientConfig {
        UpstreamClientConfig {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            base_url: "https://api.example.test/v0/".to_string(),
            timeout_secs: 5,
        }
    }

    #[test]
    fn test_new_requires_credentials() {
        let mut cfg = config();
        cfg.client_secret = String::new();
        let result = HttpUpstreamClient::new(cfg);
        assert!(matches!(result, Err(UpstreamError::NotConfigured(_))));
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = HttpUpstreamClient::new(config()).unwrap();
        assert_eq!(
            client.url("/film/abc"),
            "https://api.example.test/v0/film/abc"
        );
    }

    #[test]
    fn test_config_defaults() {
        let cfg: UpstreamClientConfig =
            serde_json::from_str(r#"{"client_id": "a", "client_secret": "b"}"#).unwrap();
        assert_eq!(cfg.base_url, "https://api.letterboxd.com/api/v0");
        assert_eq!(cfg.timeout_secs, 30);
    }

    #[test]
    fn test_search_item_parses_film_or_member() {
        let page: Page<SearchItem> = serde_json::from_str(
            r#"{"items": [
                {"type": "MemberSearchItem", "member": {"id": "m1", "username": "ann"}},
                {"type": "FilmSearchItem", "film": {"id": "f1", "name": "Heat"}}
            ]}"#,
        )
        .unwrap();
        assert!(page.items[0].member.is_some());
        assert!(page.items[1].film.is_some());
    }
}
