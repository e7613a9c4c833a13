//! Gitea REST API client.
//!
//! [`TeamApi`] is the narrow org/team membership surface the sync engine
//! needs; [`GiteaClient`] implements it over HTTP.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::errors::GiteaError;

/// Page size requested from list endpoints. Servers may serve fewer.
const PAGE_LIMIT: usize = 50;

/// Header carrying the full item count of a list endpoint.
const TOTAL_COUNT_HEADER: &str = "x-total-count";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub username: String,
}

/// Org/team membership operations of the target system.
///
/// Read operations failing is fatal for a run; the engine treats failures of
/// [`add_member`](Self::add_member) and [`remove_member`](Self::remove_member)
/// as warnings.
#[allow(async_fn_in_trait)]
pub trait TeamApi {
    async fn list_orgs(&self) -> Result<Vec<Organization>, GiteaError>;

    async fn list_teams(&self, org: &str) -> Result<Vec<Team>, GiteaError>;

    async fn list_members(&self, team_id: u64) -> Result<Vec<Member>, GiteaError>;

    async fn add_member(&self, team_id: u64, username: &str) -> Result<(), GiteaError>;

    async fn remove_member(&self, team_id: u64, username: &str) -> Result<(), GiteaError>;
}

/// Asynchronous Gitea REST API client.
#[derive(Clone)]
pub struct GiteaClient {
    http: reqwest::Client,
    base: Url,
    token: String,
}

impl GiteaClient {
    /// Create a client for the Gitea instance at `host` (without `/api/v1`).
    pub fn new(host: &str, token: impl Into<String>) -> Result<Self, GiteaError> {
        let base = Url::parse(host.trim_end_matches('/'))
            .map_err(|e| GiteaError::InvalidUrl(format!("{host}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(GiteaError::InvalidUrl(host.to_string()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("ldap-team-sync/", env!("CARGO_PKG_VERSION"))),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;
        info!(host = %base, "created GiteaClient");
        Ok(Self {
            http,
            base,
            token: token.into(),
        })
    }

    /// Build `{host}/api/v1/{segments...}`, percent-encoding each segment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        // `new` rejects cannot-be-a-base URLs, so segments are always available.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(["api", "v1"]).extend(segments);
        }
        url
    }

    async fn send(&self, method: Method, url: Url) -> Result<reqwest::Response, GiteaError> {
        let resp = self
            .http
            .request(method.clone(), url.clone())
            .header(AUTHORIZATION, format!("token {}", self.token))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(GiteaError::ApiError {
                method: method.to_string(),
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(resp)
    }

    /// Fetch every page of a list endpoint.
    ///
    /// A short page does not end the listing, since the server may cap the
    /// page size below [`PAGE_LIMIT`]. Paging stops once `X-Total-Count`
    /// items are collected, on an empty page, or when the server ignores
    /// paging (a page larger than requested, or a repeat of the last page).
    async fn get_all<T>(&self, segments: &[&str]) -> Result<Vec<T>, GiteaError>
    where
        T: DeserializeOwned + Clone + PartialEq,
    {
        let mut items: Vec<T> = Vec::new();
        let mut previous: Option<Vec<T>> = None;
        let mut total: Option<usize> = None;
        let mut page = 1usize;
        loop {
            let mut url = self.endpoint(segments);
            url.query_pairs_mut()
                .append_pair("page", &page.to_string())
                .append_pair("limit", &PAGE_LIMIT.to_string());

            let resp = self.send(Method::GET, url).await?;
            if total.is_none() {
                total = resp
                    .headers()
                    .get(TOTAL_COUNT_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse().ok());
            }
            let batch: Vec<T> = resp
                .json()
                .await
                .map_err(|e| GiteaError::ParseError(e.to_string()))?;

            if batch.is_empty() || previous.as_ref() == Some(&batch) {
                break;
            }
            let unpaged = batch.len() > PAGE_LIMIT;
            items.extend_from_slice(&batch);
            if unpaged || total.is_some_and(|total| items.len() >= total) {
                break;
            }
            previous = Some(batch);
            page += 1;
        }
        debug!(pages = page, count = items.len(), ?total, "listed all pages");
        Ok(items)
    }
}

impl TeamApi for GiteaClient {
    #[instrument(skip(self))]
    async fn list_orgs(&self) -> Result<Vec<Organization>, GiteaError> {
        let orgs: Vec<Organization> = self.get_all(&["admin", "orgs"]).await?;
        debug!(count = orgs.len(), "fetched organizations");
        Ok(orgs)
    }

    #[instrument(skip(self))]
    async fn list_teams(&self, org: &str) -> Result<Vec<Team>, GiteaError> {
        let teams: Vec<Team> = self.get_all(&["orgs", org, "teams"]).await?;
        debug!(count = teams.len(), "fetched teams");
        Ok(teams)
    }

    #[instrument(skip(self))]
    async fn list_members(&self, team_id: u64) -> Result<Vec<Member>, GiteaError> {
        let id = team_id.to_string();
        let members: Vec<Member> = self.get_all(&["teams", &id, "members"]).await?;
        debug!(count = members.len(), "fetched team members");
        Ok(members)
    }

    #[instrument(skip(self))]
    async fn add_member(&self, team_id: u64, username: &str) -> Result<(), GiteaError> {
        let id = team_id.to_string();
        let url = self.endpoint(&["teams", &id, "members", username]);
        self.send(Method::PUT, url).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_member(&self, team_id: u64, username: &str) -> Result<(), GiteaError> {
        let id = team_id.to_string();
        let url = self.endpoint(&["teams", &id, "members", username]);
        self.send(Method::DELETE, url).await?;
        Ok(())
    }
}
