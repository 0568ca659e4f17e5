//! HTTP client for the seller platform API.

use chrono::Utc;
use reqwest::header::{self, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde::Serialize;

use crate::config::PlatformConfig;
use crate::error::PlatformError;

/// Envelope code the platform uses for success.
const CODE_SUCCESS: i64 = 200;
const MAX_IDLE_PER_HOST: usize = 20;

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Request signature and trace id the seller console sends with every call.
const SIGNATURE: &str = "sjsWZBOksgvb02qvs2dUO2sCO25bOl5WZjs+ZjdBslM3";
const TRACE_ID: &str = "eb0416aad8a8cf9f";

/// Session cookie; `{token}` appears in both access-token slots.
const COOKIE_TEMPLATE: &str = "access-token=; sso-type=customer; subsystem=ark; \
     access-token-ark.xiaohongshu.com=customer.ark.{token}; \
     access-token-ark.beta.xiaohongshu.com=customer.ark.{token}";

/// Authenticated client for the seller platform.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct PlatformClient {
    http: reqwest::Client,
    base_url: String,
    authorization: HeaderValue,
    cookie: HeaderValue,
}

impl PlatformClient {
    pub fn new(config: &PlatformConfig) -> Result<Self, PlatformError> {
        let token = config.auth_token.expose_secret();
        let authorization = sensitive_header(token)?;
        let cookie = sensitive_header(&render_cookie(token))?;

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(MAX_IDLE_PER_HOST)
            .default_headers(browser_headers(&config.base_url))
            .build()
            .map_err(|e| PlatformError::RequestFailed {
                url: config.base_url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            authorization,
            cookie,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST a JSON body to `path` and return the accepted response envelope.
    pub(crate) async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        referer: &str,
        body: &B,
    ) -> Result<Envelope, PlatformError> {
        let url = format!("{}{path}", self.base_url);
        let referer = format!("{}{referer}", self.base_url);

        let response = self
            .http
            .post(&url)
            .header(header::AUTHORIZATION, self.authorization.clone())
            .header(header::COOKIE, self.cookie.clone())
            .header(header::REFERER, referer)
            .header("x-t", Utc::now().timestamp_millis().to_string())
            .json(body)
            .send()
            .await
            .map_err(|e| PlatformError::RequestFailed {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| PlatformError::RequestFailed {
                url: url.clone(),
                reason: format!("failed to read body: {e}"),
            })?;

        if !status.is_success() {
            tracing::error!(url = %url, status = status.as_u16(), "Platform request failed");
            return Err(PlatformError::BadStatus {
                url,
                status: status.as_u16(),
                body: text,
            });
        }

        Envelope::decode(&url, &text)
    }
}

/// The `{code, success, msg, data}` wrapper every platform response uses.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope {
    code: Option<i64>,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: serde_json::Value,
    #[serde(skip)]
    url: String,
}

impl Envelope {
    /// Parse `text` and accept it only when the code is the success code.
    pub(crate) fn decode(url: &str, text: &str) -> Result<Self, PlatformError> {
        let mut envelope: Envelope =
            serde_json::from_str(text).map_err(|e| PlatformError::InvalidResponse {
                url: url.to_string(),
                reason: format!("not a JSON envelope: {e}"),
            })?;
        envelope.url = url.to_string();

        match envelope.code {
            Some(CODE_SUCCESS) => Ok(envelope),
            Some(code) => Err(PlatformError::Rejected {
                code,
                message: envelope.msg,
            }),
            None => Err(PlatformError::InvalidResponse {
                url: url.to_string(),
                reason: "missing code".into(),
            }),
        }
    }

    /// The `data` element, which must be a JSON object.
    pub(crate) fn into_data<T: serde::de::DeserializeOwned>(self) -> Result<T, PlatformError> {
        if !self.data.is_object() {
            return Err(PlatformError::InvalidResponse {
                url: self.url,
                reason: format!("data is not an object: {}", self.data),
            });
        }
        Ok(serde_json::from_value(self.data)?)
    }
}

fn render_cookie(token: &str) -> String {
    COOKIE_TEMPLATE.replace("{token}", token)
}

fn sensitive_header(value: &str) -> Result<HeaderValue, PlatformError> {
    let mut header = HeaderValue::from_str(value).map_err(|_| {
        PlatformError::InvalidParameters("auth token contains invalid header characters".into())
    })?;
    header.set_sensitive(true);
    Ok(header)
}

fn browser_headers(origin: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let mut set = |name: &'static str, value: &str| {
        if let Ok(value) = HeaderValue::from_str(value) {
            headers.insert(name, value);
        }
    };
    set("accept", "application/json, text/plain, */*");
    set("accept-language", "en");
    set("cache-control", "no-cache");
    set("dnt", "1");
    set("origin", origin.trim_end_matches('/'));
    set("user-agent", USER_AGENT);
    set(
        "sec-ch-ua",
        r#""Not/A)Brand";v="8", "Chromium";v="126", "Google Chrome";v="126""#,
    );
    set("sec-ch-ua-mobile", "?0");
    set("sec-ch-ua-platform", r#""macOS""#);
    set("sec-fetch-dest", "empty");
    set("sec-fetch-mode", "cors");
    set("sec-fetch-site", "same-origin");
    set("x-s", SIGNATURE);
    set("x-b3-traceid", TRACE_ID);
    headers
}
