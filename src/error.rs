//! Error types for rSolr-Exporter
//!
//! This module defines the error types used throughout the application.
//! None of the per-endpoint, per-rule or per-query errors escapes a scrape
//! cycle; they are logged where they happen and the cycle continues.

use thiserror::Error;

/// Rule 파싱 및 regex 관련 에러
#[derive(Error, Debug)]
pub enum RuleError {
    /// 정규식 패턴 컴파일 실패
    #[error("Invalid regex pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// 메트릭명 템플릿 오류
    #[error("Invalid metric name template '{template}': {reason}")]
    InvalidNameTemplate { template: String, reason: String },

    /// 유효하지 않은 라벨명
    #[error("Invalid label name '{name}': {reason}")]
    InvalidLabel { name: String, reason: String },

    /// 규칙 검증 실패
    #[error("Rule validation error: {0}")]
    ValidationError(String),
}

/// 추출 쿼리 컴파일 및 실행 에러
#[derive(Error, Debug)]
pub enum QueryError {
    /// 경로 표현식 문법 오류
    #[error("Invalid extraction expression '{expression}': {reason}")]
    InvalidExpression { expression: String, reason: String },

    /// 패턴 기반 추출의 규칙 오류
    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),

    /// 쿼리 스펙 구성 오류
    #[error("Invalid query '{query}': {reason}")]
    InvalidSpec { query: String, reason: String },

    /// 응답 평가 중 오류 (해당 쿼리/응답 쌍에만 영향)
    #[error("Failed to evaluate '{expression}': {reason}")]
    Evaluation { expression: String, reason: String },
}

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Collector error
    #[error("Collector error: {0}")]
    Collector(#[from] CollectorError),

    /// Built-in rule table error
    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),

    /// User query that does not compile
    #[error("Query '{name}' is invalid: {source}")]
    InvalidQuery {
        name: String,
        #[source]
        source: QueryError,
    },
}

/// Collector 모듈 에러 타입
#[derive(Error, Debug)]
pub enum CollectorError {
    /// HTTP 클라이언트 초기화 실패
    #[error("Failed to initialize HTTP client: {0}")]
    HttpClientInit(#[source] reqwest::Error),

    /// 잘못된 Solr URL
    #[error("Invalid Solr URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// HTTP 요청 실패
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[source] reqwest::Error),

    /// HTTP 응답 읽기 실패
    #[error("Failed to read HTTP response: {0}")]
    HttpResponse(#[source] reqwest::Error),

    /// HTTP 상태 코드 에러
    #[error("HTTP error status: {0}")]
    HttpStatus(u16),

    /// JSON 파싱 에러
    #[error("JSON parse error: {0}")]
    JsonParse(String),

    /// Solr 에러 응답 (`error` 객체 또는 responseHeader.status != 0)
    #[error("Solr error (status {status}): {message}")]
    SolrError { status: i64, message: String },

    /// 타임아웃
    /// The value is the configured timeout in milliseconds, if known.
    #[error("Request timed out{}", .0.map(|ms| format!(" after {}ms", ms)).unwrap_or_default())]
    Timeout(Option<u64>),

    /// 연결 실패
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// 최대 재시도 초과
    #[error("Maximum retries exceeded")]
    MaxRetriesExceeded,

    /// 인증 실패
    #[error("Authentication failed")]
    AuthenticationFailed,
}

impl CollectorError {
    /// 재시도 가능한 에러인지 확인
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CollectorError::HttpRequest(_)
                | CollectorError::HttpResponse(_)
                | CollectorError::Timeout(..)
                | CollectorError::ConnectionFailed(_)
                | CollectorError::HttpStatus(500..=599)
        )
    }

    /// HTTP 상태 코드 추출
    pub fn http_status(&self) -> Option<u16> {
        match self {
            CollectorError::HttpStatus(code) => Some(*code),
            CollectorError::AuthenticationFailed => Some(401),
            _ => None,
        }
    }

    /// Create a Timeout error with known duration
    pub fn timeout_with_duration(ms: u64) -> Self {
        CollectorError::Timeout(Some(ms))
    }
}

impl From<reqwest::Error> for CollectorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // reqwest doesn't expose the configured duration
            CollectorError::Timeout(None)
        } else if err.is_connect() {
            CollectorError::ConnectionFailed(err.to_string())
        } else if err.is_request() {
            CollectorError::HttpRequest(err)
        } else {
            CollectorError::HttpResponse(err)
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;
