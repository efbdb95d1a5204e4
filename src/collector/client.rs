//! Solr HTTP 클라이언트
//!
//! Connection pooling, 타임아웃, Basic Auth, 재시도를 지원하는 비동기 HTTP
//! 클라이언트입니다. 모든 요청에 `wt=json`이 붙습니다.

use reqwest::{Client, ClientBuilder, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

use super::parser::{extract_base_urls, parse_response, CollectResult};
use crate::error::CollectorError;

/// Solr HTTP 클라이언트
///
/// 내부 `reqwest::Client`는 `Arc`로 공유되므로 복제 비용이 작습니다.
#[derive(Clone)]
pub struct SolrClient {
    client: Client,
    base_url: String,
    timeout: Duration,
    auth: Option<(String, String)>,
}

impl std::fmt::Debug for SolrClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolrClient")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("auth", &self.auth.as_ref().map(|(user, _)| user))
            .finish()
    }
}

/// 재시도 설정
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// 최대 재시도 횟수
    pub max_retries: u32,
    /// 초기 지연 시간
    pub initial_delay: Duration,
    /// 최대 지연 시간
    pub max_delay: Duration,
    /// 지연 시간 증가 배수
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// 재시도 횟수만 지정한 설정
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }
}

fn normalize_base_url(base_url: &str) -> CollectResult<String> {
    let invalid = |reason: String| CollectorError::InvalidUrl {
        url: base_url.to_string(),
        reason,
    };

    let parsed = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", parsed.scheme())));
    }

    Ok(base_url.trim_end_matches('/').to_string())
}

impl SolrClient {
    /// 새 클라이언트 생성
    ///
    /// # Arguments
    /// * `base_url` - Solr URL (예: "http://localhost:8983/solr")
    /// * `timeout_ms` - 요청 타임아웃 (밀리초)
    ///
    /// # Example
    /// ```ignore
    /// let client = SolrClient::new("http://localhost:8983/solr", 5000)?;
    /// ```
    pub fn new(base_url: &str, timeout_ms: u64) -> CollectResult<Self> {
        let base_url = normalize_base_url(base_url)?;
        let timeout = Duration::from_millis(timeout_ms);

        let client = ClientBuilder::new()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(CollectorError::HttpClientInit)?;

        Ok(Self {
            client,
            base_url,
            timeout,
            auth: None,
        })
    }

    /// Basic Auth 설정
    pub fn with_auth(mut self, username: &str, password: &str) -> Self {
        self.auth = Some((username.to_string(), password.to_string()));
        self
    }

    /// 같은 연결 풀과 인증 정보로 다른 노드를 가리키는 클라이언트
    pub fn for_node(&self, base_url: &str) -> CollectResult<Self> {
        Ok(Self {
            base_url: normalize_base_url(base_url)?,
            ..self.clone()
        })
    }

    /// 노드 base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// 요청 URL 생성
    ///
    /// `target`과 `path`의 각 세그먼트는 퍼센트 인코딩됩니다.
    fn url(&self, target: Option<&str>, path: &str) -> CollectResult<Url> {
        let invalid = |reason: String| CollectorError::InvalidUrl {
            url: self.base_url.clone(),
            reason,
        };

        let mut url = Url::parse(&self.base_url).map_err(|e| invalid(e.to_string()))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| invalid("URL cannot have path segments".to_string()))?;
            segments.pop_if_empty();
            if let Some(target) = target {
                segments.push(target);
            }
            segments.extend(path.split('/').filter(|s| !s.is_empty()));
        }
        Ok(url)
    }

    fn map_error(&self, err: reqwest::Error) -> CollectorError {
        if err.is_timeout() {
            CollectorError::timeout_with_duration(self.timeout.as_millis() as u64)
        } else {
            CollectorError::from(err)
        }
    }

    /// 단일 요청
    ///
    /// `target`이 있으면 `{base_url}/{target}{path}`, 없으면
    /// `{base_url}{path}`로 요청합니다.
    #[instrument(skip(self, params), fields(base_url = %self.base_url))]
    pub async fn request(
        &self,
        target: Option<&str>,
        path: &str,
        params: &[(String, String)],
    ) -> CollectResult<Value> {
        let url = self.url(target, path)?;
        debug!(url = %url, params = params.len(), "Sending Solr request");

        let mut req = self
            .client
            .get(url)
            .query(&[("wt", "json")])
            .query(params);

        if let Some((username, password)) = &self.auth {
            req = req.basic_auth(username, Some(password));
        }

        let response = req.send().await.map_err(|e| self.map_error(e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(CollectorError::AuthenticationFailed);
        }

        let body = response.text().await.map_err(|e| self.map_error(e))?;

        if !status.is_success() {
            // Solr error bodies carry a better message than the status line
            return match parse_response(&body) {
                Err(e @ CollectorError::SolrError { .. }) if !status.is_server_error() => Err(e),
                _ => Err(CollectorError::HttpStatus(status.as_u16())),
            };
        }

        parse_response(&body)
    }

    /// 재시도 로직이 포함된 요청
    pub async fn request_with_retry(
        &self,
        target: Option<&str>,
        path: &str,
        params: &[(String, String)],
        config: &RetryConfig,
    ) -> CollectResult<Value> {
        let mut delay = config.initial_delay;
        let mut last_error = None;

        for attempt in 0..=config.max_retries {
            match self.request(target, path, params).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if !e.is_retryable() {
                        return Err(e);
                    }

                    if attempt < config.max_retries {
                        warn!(
                            attempt = attempt + 1,
                            max = config.max_retries,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Request failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        delay = std::cmp::min(
                            Duration::from_secs_f64(delay.as_secs_f64() * config.multiplier),
                            config.max_delay,
                        );
                    }

                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(CollectorError::MaxRetriesExceeded))
    }

    /// CoreAdmin STATUS
    pub async fn core_status(&self, config: &RetryConfig) -> CollectResult<Value> {
        let params = [("action".to_string(), "STATUS".to_string())];
        self.request_with_retry(None, "/admin/cores", &params, config)
            .await
    }

    /// 코어 ping
    pub async fn ping(&self, core: &str, config: &RetryConfig) -> CollectResult<Value> {
        self.request_with_retry(Some(core), "/admin/ping", &[], config)
            .await
    }

    /// 코어 MBean 통계
    pub async fn mbeans(
        &self,
        core: &str,
        category: Option<&str>,
        key: Option<&str>,
        config: &RetryConfig,
    ) -> CollectResult<Value> {
        let mut params = vec![("stats".to_string(), "true".to_string())];
        if let Some(category) = category {
            params.push(("cat".to_string(), category.to_string()));
        }
        if let Some(key) = key {
            params.push(("key".to_string(), key.to_string()));
        }
        self.request_with_retry(Some(core), "/admin/mbeans", &params, config)
            .await
    }

    /// Metrics API
    pub async fn metrics(
        &self,
        groups: &[String],
        types: &[String],
        prefixes: &[String],
        config: &RetryConfig,
    ) -> CollectResult<Value> {
        let repeated = |name: &str, values: &[String]| {
            values
                .iter()
                .map(|v| (name.to_string(), v.clone()))
                .collect::<Vec<_>>()
        };
        let mut params = vec![("compact".to_string(), "false".to_string())];
        params.extend(repeated("group", groups));
        params.extend(repeated("type", types));
        params.extend(repeated("prefix", prefixes));

        self.request_with_retry(None, "/admin/metrics", &params, config)
            .await
    }

    /// Collections API CLUSTERSTATUS
    pub async fn cluster_status(
        &self,
        collection: Option<&str>,
        config: &RetryConfig,
    ) -> CollectResult<Value> {
        let mut params = vec![("action".to_string(), "CLUSTERSTATUS".to_string())];
        if let Some(collection) = collection {
            params.push(("collection".to_string(), collection.to_string()));
        }
        self.request_with_retry(None, "/admin/collections", &params, config)
            .await
    }

    /// Collections API OVERSEERSTATUS
    pub async fn overseer_status(&self, config: &RetryConfig) -> CollectResult<Value> {
        let params = [("action".to_string(), "OVERSEERSTATUS".to_string())];
        self.request_with_retry(None, "/admin/collections", &params, config)
            .await
    }

    /// 클러스터 레플리카가 있는 노드의 base URL 목록
    pub async fn live_base_urls(&self, config: &RetryConfig) -> CollectResult<Vec<String>> {
        Ok(extract_base_urls(&self.cluster_status(None, config).await?))
    }
}
