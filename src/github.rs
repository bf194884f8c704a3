//! `reqwest` client for the three GitHub REST endpoints the patcher uses.
//!
//! The client owns the credentials it was built with and a semaphore that
//! bounds how many requests may be in flight at once. It is cheap to clone:
//! every clone shares the same connection pool and the same limiter.
//!
//! Status codes are checked before any JSON parsing, so an HTML error page
//! or a `{"message": "Not Found"}` body never reaches a deserializer.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{header, Client, Method};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::config::{Config, Credentials};
use crate::error::ApiError;
use crate::model::{Hook, PatchRequest, Repository};

/// Upper bound on pages fetched for a single listing.
const MAX_PAGES: usize = 100;

/// How list endpoints are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pagination {
    /// One request, whatever GitHub's default page holds.
    SinglePage,
    /// Request `per_page` items and follow `Link: rel="next"` to the end.
    FollowLinks { per_page: u32 },
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub api_base: String,
    pub max_concurrency: usize,
    pub pagination: Pagination,
    pub timeout: Option<Duration>,
}

impl ClientOptions {
    pub fn from_config(config: &Config) -> Self {
        let pagination = if config.paginate {
            Pagination::FollowLinks {
                per_page: config.per_page,
            }
        } else {
            Pagination::SinglePage
        };
        Self {
            api_base: config.api_base.clone(),
            max_concurrency: config.max_concurrency,
            pagination,
            timeout: config.request_timeout_secs.map(Duration::from_secs),
        }
    }
}

#[derive(Clone)]
pub struct GitHubClient {
    http: Client,
    api_base: Arc<str>,
    credentials: Arc<Credentials>,
    limiter: Arc<Semaphore>,
    pagination: Pagination,
}

impl GitHubClient {
    pub fn new(credentials: Credentials, options: ClientOptions) -> Result<Self, ApiError> {
        let mut builder = Client::builder();
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|err| ApiError::Client(err.to_string()))?;

        Ok(Self {
            http,
            api_base: Arc::from(options.api_base.trim_end_matches('/')),
            credentials: Arc::new(credentials),
            limiter: Arc::new(Semaphore::new(options.max_concurrency.max(1))),
            pagination: options.pagination,
        })
    }

    /// Issue one request against `path` and return the parsed JSON body.
    ///
    /// `path` must begin with `/`. An empty 2xx body is returned as
    /// [`Value::Null`].
    pub async fn call_api(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        check_path(path)?;
        let url = format!("{}{path}", self.api_base);
        let page = self.send(method, &url, path, None, body).await?;
        parse_body(path, page.body)
    }

    /// All repositories of `org`, across pages unless configured otherwise.
    pub async fn list_repositories(&self, org: &str) -> Result<Vec<Repository>, ApiError> {
        self.get_all_pages(&repos_path(org)).await
    }

    /// All webhooks of `org/repo`, across pages unless configured otherwise.
    pub async fn list_hooks(&self, org: &str, repo: &str) -> Result<Vec<Hook>, ApiError> {
        self.get_all_pages(&hooks_path(org, repo)).await
    }

    /// Submit `patch` for hook `id` and return GitHub's response verbatim.
    pub async fn patch_hook(
        &self,
        org: &str,
        repo: &str,
        id: u64,
        patch: &PatchRequest,
    ) -> Result<Value, ApiError> {
        let body = serde_json::to_value(patch).map_err(ApiError::Serialize)?;
        self.call_api(Method::PATCH, &hook_path(org, repo, id), Some(&body))
            .await
    }

    /// Login of the account the credentials belong to.
    pub async fn authenticated_login(&self) -> Result<String, ApiError> {
        let user = self.call_api(Method::GET, "/user", None).await?;
        Ok(user
            .get("login")
            .and_then(Value::as_str)
            .unwrap_or("<unknown>")
            .to_string())
    }

    /// Read the repositories of `org` one page at a time.
    pub fn repository_pages(&self, org: &str) -> Result<PageCursor<'_, Repository>, ApiError> {
        self.pages(&repos_path(org))
    }

    fn pages<T: DeserializeOwned>(&self, path: &str) -> Result<PageCursor<'_, T>, ApiError> {
        check_path(path)?;
        let (per_page, follow) = match self.pagination {
            Pagination::SinglePage => (None, false),
            Pagination::FollowLinks { per_page } => (Some(per_page), true),
        };
        Ok(PageCursor {
            client: self,
            path: path.to_string(),
            next_url: Some(format!("{}{path}", self.api_base)),
            per_page,
            follow,
            pages: 0,
            _items: PhantomData,
        })
    }

    async fn get_all_pages<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, ApiError> {
        let mut cursor = self.pages(path)?;
        let mut all = Vec::new();
        while let Some(items) = cursor.next_page().await? {
            all.extend(items);
        }
        Ok(all)
    }

    /// Send a request to an absolute `url`, holding a limiter permit until
    /// the whole body has been read. `path` is only used to label errors.
    async fn send(
        &self,
        method: Method,
        url: &str,
        path: &str,
        per_page: Option<u32>,
        body: Option<&Value>,
    ) -> Result<Page, ApiError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|err| ApiError::Network {
                path: path.to_string(),
                message: format!("request limiter unavailable: {err}"),
            })?;

        tracing::debug!(%method, url, "GitHub API request");

        let mut request = self
            .http
            .request(method, url)
            .header(header::USER_AGENT, self.credentials.identity())
            .header(header::AUTHORIZATION, self.credentials.authorization())
            .header(header::ACCEPT, "application/vnd.github+json");
        if let Some(per_page) = per_page {
            request = request.query(&[("per_page", per_page)]);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let network = |err: reqwest::Error| ApiError::Network {
            path: path.to_string(),
            message: err.to_string(),
        };

        let response = request.send().await.map_err(network)?;
        let status = response.status();
        let next = parse_link_next(response.headers());
        let text = response.text().await.map_err(network)?;

        if !status.is_success() {
            return Err(ApiError::Status {
                path: path.to_string(),
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(Page { body: text, next })
    }
}

struct Page {
    body: String,
    next: Option<String>,
}

/// A list endpoint read one page per [`PageCursor::next_page`] call.
///
/// Next-page links are only followed while they stay under the client's
/// `api_base`, so the token is never sent to another host.
pub struct PageCursor<'a, T> {
    client: &'a GitHubClient,
    path: String,
    next_url: Option<String>,
    per_page: Option<u32>,
    follow: bool,
    pages: usize,
    _items: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> PageCursor<'_, T> {
    /// The next page of items, or `None` once the listing is exhausted.
    pub async fn next_page(&mut self) -> Result<Option<Vec<T>>, ApiError> {
        let Some(url) = self.next_url.take() else {
            return Ok(None);
        };
        if self.pages > 0 && !is_under(&self.client.api_base, &url) {
            return Err(ApiError::ForeignLink {
                path: self.path.clone(),
                url,
            });
        }

        // `per_page` rides on the first request; next links already carry it.
        let per_page = if self.pages == 0 { self.per_page } else { None };
        let page = self
            .client
            .send(Method::GET, &url, &self.path, per_page, None)
            .await?;
        self.pages += 1;

        let items: Vec<T> =
            serde_json::from_str(&page.body).map_err(|source| ApiError::Malformed {
                path: self.path.clone(),
                body: page.body.clone(),
                source,
            })?;

        match page.next {
            Some(_) if !self.follow => {}
            Some(_) if self.pages >= MAX_PAGES => {
                tracing::warn!(
                    path = %self.path,
                    pages = self.pages,
                    "page limit reached, listing truncated"
                );
            }
            Some(next) => {
                tracing::debug!(path = %self.path, next = %next, "following next page");
                self.next_url = Some(next);
            }
            None => {}
        }

        Ok(Some(items))
    }
}

fn check_path(path: &str) -> Result<(), ApiError> {
    if path.starts_with('/') {
        Ok(())
    } else {
        Err(ApiError::InvalidPath(path.to_string()))
    }
}

fn parse_body(path: &str, body: String) -> Result<Value, ApiError> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body).map_err(|source| ApiError::Malformed {
        path: path.to_string(),
        body,
        source,
    })
}

pub fn repos_path(org: &str) -> String {
    format!("/orgs/{}/repos", urlencoding::encode(org))
}

pub fn hooks_path(org: &str, repo: &str) -> String {
    format!(
        "/repos/{}/{}/hooks",
        urlencoding::encode(org),
        urlencoding::encode(repo)
    )
}

pub fn hook_path(org: &str, repo: &str, id: u64) -> String {
    format!("{}/{id}", hooks_path(org, repo))
}

/// True when `url` is `base` itself or a path or query beneath it.
fn is_under(base: &str, url: &str) -> bool {
    url.strip_prefix(base)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'))
}

/// Extract the `rel="next"` target from a `Link` header.
fn parse_link_next(headers: &header::HeaderMap) -> Option<String> {
    let link = headers.get(header::LINK)?.to_str().ok()?;
    for part in link.split(',') {
        let part = part.trim();
        if part.contains("rel=\"next\"") {
            let start = part.find('<')? + 1;
            let end = part.find('>')?;
            return Some(part[start..end].to_string());
        }
    }
    None
}
