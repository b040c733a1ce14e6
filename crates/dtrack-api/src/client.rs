//! Dependency-Track HTTP client (reqwest-based).
//!
//! Authenticates every request with the `X-Api-Key` header. Reads go through
//! the configured [`RetryPolicy`]; writes are sent exactly once.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::error::{ApiError, ApiResult};
use crate::models::{
    AclMappingRequest, ConfigProperty, CreateOidcGroupRequest, CreateTeamRequest,
    DeleteTeamRequest, NewProject, OidcGroup, OidcMappingRequest, Project, ProjectUpdate, Team,
    ACL_PROPERTY_GROUP, ACL_PROPERTY_NAME,
};
use crate::retry::RetryPolicy;
use crate::traits::DependencyTrackApi;

const API_KEY_HEADER: &str = "X-Api-Key";
const TOTAL_COUNT_HEADER: &str = "X-Total-Count";

/// Upper bound on pages fetched for one listing.
pub const MAX_PAGES: u32 = 1000;

/// HTTP client for a Dependency-Track API server.
#[derive(Clone)]
pub struct DependencyTrackClient {
    base_url: String,
    api_key: String,
    http_client: Client,
    page_size: u32,
    retry: RetryPolicy,
}

impl std::fmt::Debug for DependencyTrackClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyTrackClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("page_size", &self.page_size)
            .field("retry", &self.retry)
            .finish()
    }
}

impl DependencyTrackClient {
    /// Build a client from configuration.
    pub fn new(config: &ClientConfig) -> ApiResult<Self> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http_client = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .danger_accept_invalid_certs(!config.tls_verify)
            .default_headers(headers)
            .user_agent(concat!("dtrack-reconcile/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;

        if !config.tls_verify {
            warn!(base_url = %config.base_url, "TLS certificate verification is disabled");
        }

        Ok(Self::with_http_client(config, http_client))
    }

    /// Create a client with a pre-built `reqwest::Client` (for testing).
    #[must_use]
    pub fn with_http_client(config: &ClientConfig, http_client: Client) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            http_client,
            page_size: config.page_size,
            retry: config.retry.clone(),
        }
    }

    /// Get the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http_client
            .request(method, url)
            .header(API_KEY_HEADER, &self.api_key)
    }

    // ── Request helpers ───────────────────────────────────────────────

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> ApiResult<T> {
        debug!(url = %url, "GET");
        let response = self.request(Method::GET, url).send().await?;
        self.handle_response(response).await
    }

    /// GET with retry.
    async fn read<T: DeserializeOwned>(&self, operation: &str, path: &str) -> ApiResult<T> {
        let url = self.url(path);
        let url = &url;
        self.retry
            .execute(operation, move || self.get_json::<T>(url))
            .await
    }

    /// Fetch every page of a paginated listing.
    ///
    /// Stops when the server-reported total is reached, or, when the server
    /// sends no `X-Total-Count`, at the first short page. A page identical to
    /// the previous one means paging is ignored and ends the listing, as does
    /// reaching [`MAX_PAGES`].
    async fn read_all<T: DeserializeOwned>(&self, operation: &str, path: &str) -> ApiResult<Vec<T>> {
        let mut raw: Vec<serde_json::Value> = Vec::new();
        let mut previous: Option<Vec<serde_json::Value>> = None;
        let mut page: u32 = 1;

        loop {
            let separator = if path.contains('?') { '&' } else { '?' };
            let url = self.url(&format!(
                "{path}{separator}pageNumber={page}&pageSize={}",
                self.page_size
            ));
            let url = &url;
            let (batch, total) = self
                .retry
                .execute(operation, move || self.get_page(url))
                .await?;

            if !batch.is_empty() && previous.as_ref() == Some(&batch) {
                warn!(operation, page, "Server repeated a page, ignoring paging");
                break;
            }

            let received = batch.len();
            raw.extend(batch.iter().cloned());
            previous = Some(batch);

            let done = match total {
                Some(total) => raw.len() >= total || received == 0,
                None => received < self.page_size as usize,
            };
            if done {
                break;
            }
            if page >= MAX_PAGES {
                warn!(operation, pages = page, "Page limit reached, listing may be incomplete");
                break;
            }
            page += 1;
        }

        debug!(operation, count = raw.len(), pages = page, "Listing complete");
        raw.into_iter()
            .map(|item| serde_json::from_value(item).map_err(ApiError::from))
            .collect()
    }

    async fn get_page(&self, url: &str) -> ApiResult<(Vec<serde_json::Value>, Option<usize>)> {
        debug!(url = %url, "GET page");
        let response = self.request(Method::GET, url).send().await?;
        let total = response
            .headers()
            .get(TOTAL_COUNT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<usize>().ok());
        let items = self.handle_response(response).await?;
        Ok((items, total))
    }

    async fn send_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> ApiResult<T> {
        let url = self.url(path);
        debug!(url = %url, method = %method, "Sending request");
        let response = self.request(method, &url).json(body).send().await?;
        self.handle_response(response).await
    }

    async fn send_empty<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> ApiResult<()> {
        let url = self.url(path);
        debug!(url = %url, method = %method, "Sending request");
        let mut builder = self.request(method, &url);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let response = builder.send().await?;
        let status = response.status();

        // 304 means the server already had the requested state.
        if status.is_success() || status == StatusCode::NOT_MODIFIED {
            Ok(())
        } else {
            self.handle_error_response(response).await
        }
    }

    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> ApiResult<T> {
        let status = response.status();

        if status.is_success() {
            let body = response.text().await?;
            serde_json::from_str(&body)
                .map_err(|e| ApiError::Parse(format!("failed to parse response: {e}")))
        } else {
            self.handle_error_response(response).await
        }
    }

    async fn handle_error_response<T>(&self, response: reqwest::Response) -> ApiResult<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());

        let detail = if body.trim().is_empty() {
            format!("HTTP {status}")
        } else {
            body
        };

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            warn!(status = status.as_u16(), "API key rejected by server");
        }

        Err(ApiError::from_status(status.as_u16(), detail))
    }
}

#[async_trait]
impl DependencyTrackApi for DependencyTrackClient {
    async fn list_oidc_groups(&self) -> ApiResult<Vec<OidcGroup>> {
        self.read("list_oidc_groups", "/oidc/group").await
    }

    async fn create_oidc_group(&self, name: &str) -> ApiResult<OidcGroup> {
        let body = CreateOidcGroupRequest {
            name: name.to_string(),
        };
        self.send_json(Method::PUT, "/oidc/group", &body).await
    }

    async fn delete_oidc_group(&self, group: Uuid) -> ApiResult<()> {
        self.send_empty::<()>(Method::DELETE, &format!("/oidc/group/{group}"), None)
            .await
    }

    async fn list_teams(&self) -> ApiResult<Vec<Team>> {
        self.read_all("list_teams", "/team").await
    }

    async fn create_team(&self, name: &str) -> ApiResult<Team> {
        let body = CreateTeamRequest {
            name: name.to_string(),
        };
        self.send_json(Method::PUT, "/team", &body).await
    }

    async fn delete_team(&self, team: Uuid) -> ApiResult<()> {
        let body = DeleteTeamRequest { uuid: team };
        self.send_empty(Method::DELETE, "/team", Some(&body)).await
    }

    async fn add_permission(&self, team: Uuid, permission: &str) -> ApiResult<()> {
        self.send_empty::<()>(
            Method::POST,
            &format!("/permission/{permission}/team/{team}"),
            None,
        )
        .await
    }

    async fn remove_permission(&self, team: Uuid, permission: &str) -> ApiResult<()> {
        self.send_empty::<()>(
            Method::DELETE,
            &format!("/permission/{permission}/team/{team}"),
            None,
        )
        .await
    }

    async fn link_oidc_group(&self, team: Uuid, group: Uuid) -> ApiResult<()> {
        let body = OidcMappingRequest { team, group };
        self.send_empty(Method::PUT, "/oidc/mapping", Some(&body))
            .await
    }

    async fn unlink_oidc_group(&self, team: Uuid, group: Uuid) -> ApiResult<()> {
        self.send_empty::<()>(
            Method::DELETE,
            &format!("/oidc/group/{group}/team/{team}/mapping"),
            None,
        )
        .await
    }

    async fn list_projects(&self) -> ApiResult<Vec<Project>> {
        self.read_all("list_projects", "/project").await
    }

    async fn create_project(&self, project: &NewProject) -> ApiResult<Project> {
        self.send_json(Method::PUT, "/project", project).await
    }

    async fn update_project(&self, update: &ProjectUpdate) -> ApiResult<Project> {
        self.send_json(Method::POST, "/project", update).await
    }

    async fn delete_project(&self, project: Uuid) -> ApiResult<()> {
        self.send_empty::<()>(Method::DELETE, &format!("/project/{project}"), None)
            .await
    }

    async fn get_team_acl(&self, team: Uuid) -> ApiResult<Vec<Project>> {
        self.read_all("get_team_acl", &format!("/acl/team/{team}"))
            .await
    }

    async fn add_acl_mapping(&self, team: Uuid, project: Uuid) -> ApiResult<()> {
        let body = AclMappingRequest { team, project };
        self.send_empty(Method::PUT, "/acl/mapping", Some(&body))
            .await
    }

    async fn remove_acl_mapping(&self, team: Uuid, project: Uuid) -> ApiResult<()> {
        self.send_empty::<()>(
            Method::DELETE,
            &format!("/acl/mapping/team/{team}/project/{project}"),
            None,
        )
        .await
    }

    async fn acl_enabled(&self) -> ApiResult<bool> {
        let properties: Vec<ConfigProperty> =
            self.read("acl_enabled", "/configProperty").await?;
        Ok(properties
            .iter()
            .find(|p| p.is_acl_switch())
            .is_some_and(ConfigProperty::is_enabled))
    }

    async fn enable_acl(&self) -> ApiResult<()> {
        let body = vec![ConfigProperty {
            group_name: ACL_PROPERTY_GROUP.to_string(),
            property_name: ACL_PROPERTY_NAME.to_string(),
            property_value: Some("true".to_string()),
        }];
        // The endpoint echoes the stored properties back.
        let _: Vec<ConfigProperty> = self
            .send_json(Method::POST, "/configProperty/aggregate", &body)
            .await?;
        Ok(())
    }
}
