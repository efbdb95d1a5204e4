//! Solr 메트릭 수집 모듈
//!
//! Solr admin API를 호출하고 응답을 메트릭 테이블로 변환합니다. 한 번의
//! 수집 사이클은 노드 발견, 코어 목록 조회, 엔드포인트별 작업 실행,
//! 결과 병합 순서로 진행됩니다.
//!
//! # Example
//!
//! ```ignore
//! use rsolr_exporter::collector::{extract_core_names, Collector, SolrClient};
//! use rsolr_exporter::config::Config;
//!
//! let client = SolrClient::new("http://localhost:8983/solr", 5000)?;
//! let cores = extract_core_names(&client.core_status(&Default::default()).await?);
//!
//! let collector = Collector::new(&Config::default())?;
//! let families = collector.collect().await;
//! ```

mod client;
mod parser;
mod scrape;

pub use client::{RetryConfig, SolrClient};
pub use parser::{
    extract_base_urls, extract_core_names, extract_overseer_leader, normalize_named_lists,
    parse_response, CollectResult,
};
pub use scrape::Collector;
