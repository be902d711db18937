/**
 * Upstream Fetching
 *
 * The worker's view of the real network. Two clients are kept:
 * - `client` follows redirects, like a fetch issued from the worker
 * - `passthrough` does not, so redirects reach the caller unchanged
 *
 * Neither client keeps cookies. Intercepted requests forward the caller's
 * `Cookie` header as-is. Install fetches have no caller, so they carry the
 * configured session cookie instead.
 */

use crate::shared::config::EngineConfig;
use crate::shared::WorkerError;
use crate::worker::cache::CachedResponse;
use crate::worker::interceptor::InterceptedRequest;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE, HOST};
use reqwest::{redirect, Client, Url};

#[derive(Debug, Clone)]
pub struct Upstream {
    client: Client,
    passthrough: Client,
    origin: Url,
    session_cookie: Option<HeaderValue>,
}

impl Upstream {
    pub fn new(config: &EngineConfig) -> Result<Self, WorkerError> {
        let mut client = Client::builder().redirect(redirect::Policy::limited(10));
        let mut passthrough = Client::builder().redirect(redirect::Policy::none());

        if let Some(timeout) = config.request_timeout {
            client = client.timeout(timeout);
            passthrough = passthrough.timeout(timeout);
        }

        let session_cookie = match config.session_cookie.as_deref() {
            Some(cookie) => {
                let mut value = HeaderValue::from_str(cookie)?;
                value.set_sensitive(true);
                Some(value)
            }
            None => None,
        };

        Ok(Self {
            client: client.build()?,
            passthrough: passthrough.build()?,
            origin: config.origin.clone(),
            session_cookie,
        })
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// GET a URL with the configured session, any status counts as a response
    pub async fn get(&self, url: &Url) -> Result<CachedResponse, WorkerError> {
        let mut request = self.client.get(url.clone());
        if let Some(cookie) = &self.session_cookie {
            request = request.header(COOKIE, cookie.clone());
        }
        read_response(request.send().await?).await
    }

    /// GET with the caller's headers
    pub async fn fetch(&self, request: &InterceptedRequest) -> Result<CachedResponse, WorkerError> {
        let mut url = request.url.clone();
        url.set_fragment(None);
        let response = self
            .client
            .get(url)
            .headers(forwarded_headers(&request.headers))
            .send()
            .await?;
        read_response(response).await
    }

    /// Forward a request unmodified, without following redirects
    pub async fn forward(&self, request: InterceptedRequest) -> Result<CachedResponse, WorkerError> {
        tracing::debug!("Passthrough {} {}", request.method, request.url);
        let response = self
            .passthrough
            .request(request.method.clone(), request.url.clone())
            .headers(forwarded_headers(&request.headers))
            .body(request.body)
            .send()
            .await?;
        read_response(response).await
    }
}

fn forwarded_headers(headers: &HeaderMap) -> HeaderMap {
    let mut headers = headers.clone();
    headers.remove(HOST);
    headers
}

/// Buffer a response, recording the URL it finally came from
async fn read_response(response: reqwest::Response) -> Result<CachedResponse, WorkerError> {
    let url = response.url().to_string();
    let status = response.status().as_u16();
    let headers = response.headers().clone();
    let body = response.bytes().await?;
    Ok(CachedResponse::new(url, status, body).with_headers(&headers))
}
