//! Solr JSON 응답 파서
//!
//! Solr admin API 응답을 파싱하고, NamedList 쌍 배열을 객체로 정규화하며,
//! 코어/노드 목록을 추출합니다.

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::CollectorError;

/// Collector 작업 결과 타입
pub type CollectResult<T> = Result<T, CollectorError>;

/// 응답 본문 파싱
///
/// `preserve_order`로 키 순서를 보존합니다. Solr 에러 응답(`error` 객체 또는
/// `responseHeader.status != 0`)은 `CollectorError::SolrError`로 변환됩니다.
pub fn parse_response(body: &str) -> CollectResult<Value> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| CollectorError::JsonParse(e.to_string()))?;

    let header_status = value
        .pointer("/responseHeader/status")
        .and_then(Value::as_i64)
        .unwrap_or(0);

    if let Some(error) = value.get("error") {
        let message = error
            .get("msg")
            .and_then(Value::as_str)
            .or_else(|| error.get("trace").and_then(Value::as_str))
            .unwrap_or("unknown error")
            .to_string();
        let status = error
            .get("code")
            .and_then(Value::as_i64)
            .filter(|code| *code != 0)
            .unwrap_or(if header_status != 0 { header_status } else { 500 });
        return Err(CollectorError::SolrError { status, message });
    }

    if header_status != 0 {
        return Err(CollectorError::SolrError {
            status: header_status,
            message: "non-zero responseHeader.status".to_string(),
        });
    }

    Ok(value)
}

/// NamedList 쌍 배열 정규화
///
/// `paths`의 각 경로에 있는 `[k1, v1, k2, v2, ...]` 배열을 순서가 보존되는
/// 객체로 바꿉니다. `*` 세그먼트는 모든 객체 키와 매칭됩니다. 같은 키가
/// 반복되면 처음 값이 유지됩니다. 길이가 홀수이거나 키가 문자열이 아닌
/// 배열은 그대로 둡니다.
///
/// 정규화된 배열 수를 반환합니다.
pub fn normalize_named_lists(tree: &mut Value, paths: &[&[&str]]) -> usize {
    paths
        .iter()
        .map(|path| normalize_at(tree, path))
        .sum()
}

fn normalize_at(node: &mut Value, path: &[&str]) -> usize {
    match path.split_first() {
        None => usize::from(pairs_to_object(node)),
        Some((&"*", rest)) => match node {
            Value::Object(map) => map.values_mut().map(|child| normalize_at(child, rest)).sum(),
            _ => 0,
        },
        Some((segment, rest)) => match node.get_mut(*segment) {
            Some(child) => normalize_at(child, rest),
            None => 0,
        },
    }
}

fn pairs_to_object(node: &mut Value) -> bool {
    let Value::Array(items) = node else {
        return false;
    };

    let well_formed = items.len() % 2 == 0 && items.iter().step_by(2).all(Value::is_string);
    if !well_formed {
        debug!(len = items.len(), "Array is not a NamedList, leaving as is");
        return false;
    }

    let mut map = Map::with_capacity(items.len() / 2);
    let mut iter = std::mem::take(items).into_iter();
    while let (Some(Value::String(key)), Some(value)) = (iter.next(), iter.next()) {
        map.entry(key).or_insert(value);
    }
    *node = Value::Object(map);
    true
}

/// CoreAdmin STATUS 응답에서 코어 이름 추출
pub fn extract_core_names(response: &Value) -> Vec<String> {
    match response.get("status") {
        Some(Value::Object(status)) => status.keys().cloned().collect(),
        _ => Vec::new(),
    }
}

/// CLUSTERSTATUS 응답에서 노드 base URL 추출
///
/// 레플리카의 `base_url` 값을 등장 순서대로, 중복 없이 반환합니다.
pub fn extract_base_urls(response: &Value) -> Vec<String> {
    let mut urls = Vec::new();
    if let Some(collections) = response.pointer("/cluster/collections") {
        collect_base_urls(collections, &mut urls);
    }
    urls
}

fn collect_base_urls(node: &Value, urls: &mut Vec<String>) {
    match node {
        Value::Object(map) => {
            for (key, value) in map {
                match (key.as_str(), value) {
                    ("base_url", Value::String(url)) => {
                        if !urls.contains(url) {
                            urls.push(url.clone());
                        }
                    }
                    _ => collect_base_urls(value, urls),
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_base_urls(item, urls)),
        _ => {}
    }
}

/// OVERSEERSTATUS 응답에서 리더 노드 이름 추출
pub fn extract_overseer_leader(response: &Value) -> Option<String> {
    response
        .get("leader")
        .and_then(Value::as_str)
        .map(str::to_string)
}
