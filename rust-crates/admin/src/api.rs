use crate::{
    catalog::ShopCatalog,
    dispatch::BatchRequest,
    error::ConsoleError,
    model::{
        PlayerRecord,
        TelegramId,
    },
    session::AuthToken,
};
use anyhow::Context;
use reqwest::{
    RequestBuilder,
    Response,
    StatusCode,
    header::AUTHORIZATION,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    future::Future,
    time::Duration,
};

/// Upper bound for any single call, so a hung request surfaces as a failure.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Authenticated operations of the game-operations API.
pub trait AdminApi {
    fn list_users(
        &self,
    ) -> impl Future<Output = Result<Vec<PlayerRecord>, ConsoleError>> + Send;

    fn grant_diamonds(
        &self,
        request: &BatchRequest,
    ) -> impl Future<Output = Result<(), ConsoleError>> + Send;

    fn fetch_catalog(
        &self,
    ) -> impl Future<Output = Result<ShopCatalog, ConsoleError>> + Send;

    fn save_catalog(
        &self,
        catalog: &ShopCatalog,
    ) -> impl Future<Output = Result<(), ConsoleError>> + Send;
}

/// The one unauthenticated operation.
pub trait Authenticator {
    fn login(
        &self,
        username: &str,
        password: &str,
    ) -> impl Future<Output = Result<AuthToken, ConsoleError>> + Send;
}

#[derive(Clone)]
pub struct HttpAdminApi {
    base_url: String,
    http: reqwest::Client,
    token: Option<AuthToken>,
}

impl HttpAdminApi {
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        Self::with_request_timeout(base_url, REQUEST_TIMEOUT)
    }

    pub fn with_request_timeout(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client for admin API")?;
        Ok(Self {
            base_url,
            http,
            token: None,
        })
    }

    pub fn with_token(mut self, token: AuthToken) -> Self {
        self.token = Some(token);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// The token goes into the header verbatim; the API does not expect a scheme.
    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, ConsoleError> {
        let token = self.token.as_ref().ok_or(ConsoleError::AuthRequired)?;
        Ok(request.header(AUTHORIZATION, token.expose()))
    }

    async fn send(
        endpoint: &'static str,
        request: RequestBuilder,
    ) -> Result<Response, ConsoleError> {
        let res = request
            .send()
            .await
            .map_err(|err| ConsoleError::network(endpoint, err))?;
        let status = res.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            tracing::warn!(endpoint, %status, "admin API rejected session");
            return Err(ConsoleError::AuthRequired);
        }
        if !status.is_success() {
            let body = res
                .text()
                .await
                .unwrap_or_else(|_| "<unavailable body>".to_string());
            return Err(ConsoleError::network(
                endpoint,
                format!("admin API responded with {status}: {body}"),
            ));
        }
        Ok(res)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GrantDiamondsDto<'a> {
    telegram_ids: &'a [TelegramId],
    diamonds: u64,
}

#[derive(Serialize)]
struct LoginDto<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponseDto {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    token: Option<String>,
}

impl AdminApi for HttpAdminApi {
    async fn list_users(&self) -> Result<Vec<PlayerRecord>, ConsoleError> {
        const ENDPOINT: &str = "GET /users";
        let request = self.authorized(self.http.get(self.url("/users")))?;
        let res = Self::send(ENDPOINT, request).await?;
        let users: Vec<PlayerRecord> = res.json().await.map_err(|err| {
            ConsoleError::network(ENDPOINT, format!("invalid users payload: {err}"))
        })?;
        tracing::debug!(count = users.len(), "fetched users");
        Ok(users)
    }

    async fn grant_diamonds(&self, request: &BatchRequest) -> Result<(), ConsoleError> {
        let body = GrantDiamondsDto {
            telegram_ids: request.targets(),
            diamonds: request.amount().get(),
        };
        let http_request = self
            .authorized(self.http.post(self.url("/users/update-diamonds")))?
            .json(&body);
        Self::send("POST /users/update-diamonds", http_request).await?;
        Ok(())
    }

    async fn fetch_catalog(&self) -> Result<ShopCatalog, ConsoleError> {
        const ENDPOINT: &str = "GET /shop";
        let request = self.authorized(self.http.get(self.url("/shop")))?;
        let res = Self::send(ENDPOINT, request).await?;
        res.json().await.map_err(|err| {
            ConsoleError::network(ENDPOINT, format!("invalid shop payload: {err}"))
        })
    }

    async fn save_catalog(&self, catalog: &ShopCatalog) -> Result<(), ConsoleError> {
        let request = self
            .authorized(self.http.put(self.url("/shop")))?
            .json(catalog);
        Self::send("PUT /shop", request).await?;
        Ok(())
    }
}

impl Authenticator for HttpAdminApi {
    async fn login(&self, username: &str, password: &str) -> Result<AuthToken, ConsoleError> {
        const ENDPOINT: &str = "POST /login";
        let res = self
            .http
            .post(self.url("/login"))
            .json(&LoginDto { username, password })
            .send()
            .await
            .map_err(|err| ConsoleError::network(ENDPOINT, err))?;
        let status = res.status();
        if status.is_client_error() {
            return Err(ConsoleError::InvalidCredentials);
        }
        if !status.is_success() {
            return Err(ConsoleError::network(
                ENDPOINT,
                format!("admin API responded with {status}"),
            ));
        }
        let dto: LoginResponseDto = res.json().await.map_err(|err| {
            ConsoleError::network(ENDPOINT, format!("invalid login payload: {err}"))
        })?;
        match dto.token {
            Some(token) if dto.success && !token.is_empty() => Ok(AuthToken::new(token)),
            _ => Err(ConsoleError::InvalidCredentials),
        }
    }
}
