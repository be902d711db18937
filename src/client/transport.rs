/**
 * Action Transport
 *
 * Delivers pending actions to the origin as form-encoded POSTs with the
 * session cookie, following redirects. Success is any 2xx status.
 *
 * The two endpoints signal outcomes differently:
 * - `/punch` redirects; the final URL is where the page should navigate,
 *   and it may carry a `msg` or `error` notice
 * - `/vacations` reports validation failures through an `error` query
 *   parameter on the final URL instead of a non-2xx status
 */

use crate::shared::config::EngineConfig;
use crate::shared::{ActionKind, FormPayload, TransportError};
use reqwest::{redirect, Client, Url};

/// Acknowledged delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Final HTTP status after redirects
    pub status: u16,
    /// Redirect target the page should navigate to, if the server redirected
    pub navigate_to: Option<String>,
    /// `msg` notice carried on the final URL
    pub notice: Option<String>,
    /// `error` notice on the final URL of a punch (vacation errors are rejections)
    pub server_error: Option<String>,
}

/// HTTP client for the two action endpoints
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    origin: Url,
}

impl HttpTransport {
    pub fn new(config: &EngineConfig) -> Result<Self, TransportError> {
        let mut builder = Client::builder()
            .cookie_store(true)
            .redirect(redirect::Policy::limited(10));

        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            origin: config.origin.clone(),
        })
    }

    /// Endpoint URL of an action kind
    pub fn endpoint(&self, kind: ActionKind) -> Url {
        self.origin
            .join(kind.endpoint())
            .unwrap_or_else(|_| self.origin.clone())
    }

    /// POST one payload to its kind's endpoint
    pub async fn deliver(
        &self,
        kind: ActionKind,
        payload: &FormPayload,
    ) -> Result<Delivery, TransportError> {
        let url = self.endpoint(kind);

        let response = self.client.post(url.clone()).form(payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("{} delivery answered with {}", kind, status);
            return Err(TransportError::Status(status.as_u16()));
        }

        let final_url = response.url().clone();
        let error = query_param(&final_url, "error");

        if kind == ActionKind::Vacation {
            if let Some(message) = error {
                tracing::info!("Vacation request rejected by server: {}", message);
                return Err(TransportError::Rejected(message));
            }
        }

        let navigate_to = (final_url != url).then(|| final_url.to_string());

        Ok(Delivery {
            status: status.as_u16(),
            navigate_to,
            notice: query_param(&final_url, "msg"),
            server_error: if kind == ActionKind::Punch { error } else { None },
        })
    }
}

fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}
