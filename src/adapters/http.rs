use crate::utils::error::Result;
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// 完整讀取後的 HTTP 回應
///
/// 重試迴圈需要讀取錯誤訊息後仍能把最後一個回應交回呼叫端，所以 body 一律先緩衝。
#[derive(Debug, Clone, Default)]
pub struct ApiResponse {
    pub status: u16,
    /// header 名稱一律小寫
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn header_u64(&self, name: &str) -> Option<u64> {
        self.header(name).and_then(|v| v.trim().parse().ok())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// 錯誤回應中的 `message` 欄位；非 JSON 時回傳原始內容
    pub fn message(&self) -> String {
        serde_json::from_str::<Value>(&self.body)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| self.body.clone())
    }
}

#[derive(Debug, Clone)]
pub enum Auth {
    None,
    /// `Authorization: token <token>`
    Token(String),
    Basic { user: String, password: String },
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, method: Method, url: &str, body: Option<&Value>) -> Result<ApiResponse>;
}

/// reqwest 實作，帶入驗證與 Accept header
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    auth: Auth,
    accept: String,
}

impl ReqwestTransport {
    pub fn new(auth: Auth, accept: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("tracker-migrate/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            auth,
            accept: accept.into(),
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, method: Method, url: &str, body: Option<&Value>) -> Result<ApiResponse> {
        tracing::debug!("🌐 {} {}", method, url);

        let mut request = self
            .client
            .request(method, url)
            .header("Accept", &self.accept);

        request = match &self.auth {
            Auth::None => request,
            Auth::Token(token) => request.header("Authorization", format!("token {}", token)),
            Auth::Basic { user, password } => request.basic_auth(user, Some(password)),
        };

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.text().await?;

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}
