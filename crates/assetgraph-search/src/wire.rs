//! Wire forms of a search request.
//!
//! A filter is written `rel1:dir1:...:field:value`. Colons inside the value
//! are escaped to `%3A` first so they never read as separators. The query
//! string then percent-encodes each parameter value once, which turns an
//! in-value colon into `%253A` and a separator colon into `%3A`. The
//! multi-value map carries the same strings unencoded, one per filter.

use std::collections::BTreeMap;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::{Number, Value};

use assetgraph_core::types::Direction;

use crate::error::{Result, SearchError};
use crate::model::{Operator, SearchFilter, SearchRequest, SearchRequestBuilder, TraversalHop};

pub const TYPE_PARAM: &str = "type";
pub const ANCESTOR_PATH_PARAM: &str = "ancestorPath";
pub const SUMMARIZE_PARAM: &str = "summarize";

const ESCAPED_COLON: &str = "%3A";

/// Characters `encodeURIComponent` leaves alone.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

fn encode_component(s: &str) -> String {
    utf8_percent_encode(s, URI_COMPONENT).to_string()
}

fn decode_component(name: &str, s: &str) -> Result<String> {
    percent_decode_str(s)
        .decode_utf8()
        .map(|c| c.into_owned())
        .map_err(|e| SearchError::Decode {
            name: name.to_string(),
            reason: e.to_string(),
        })
}

/// `rel:dir:...:field:value` with in-value colons escaped.
///
/// The escape is not itself escaped: a value that already holds the text
/// `%3A` reads back with a `:` in its place.
pub fn filter_to_wire(filter: &SearchFilter) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(filter.traversals.len() * 2 + 2);
    for hop in &filter.traversals {
        parts.push(hop.relation.clone());
        parts.push(hop.direction.as_str().to_string());
    }
    parts.push(filter.field.clone());
    parts.push(filter.value_text().replace(':', ESCAPED_COLON));
    parts.join(":")
}

/// Parameters in wire order with their unencoded values.
fn wire_params(request: &SearchRequest) -> Vec<(&'static str, Vec<String>)> {
    let mut params = Vec::new();
    if !request.types().is_empty() {
        params.push((TYPE_PARAM, request.types().to_vec()));
    }
    if let Some(path) = request.ancestor_path() {
        params.push((ANCESTOR_PATH_PARAM, vec![path.to_string()]));
    }
    for (op, filters) in request.operators() {
        params.push((op.wire_name(), filters.iter().map(filter_to_wire).collect()));
    }
    if request.summarize() {
        params.push((SUMMARIZE_PARAM, vec!["true".to_string()]));
    }
    params
}

/// The single percent-encoded query string form.
pub fn to_query_string(request: &SearchRequest) -> String {
    wire_params(request)
        .into_iter()
        .map(|(name, values)| format!("{name}={}", encode_component(&values.join(","))))
        .collect::<Vec<_>>()
        .join("&")
}

/// The multi-value form: one entry per type or filter, not percent-encoded.
pub fn to_multi_value_map(request: &SearchRequest) -> BTreeMap<String, Vec<String>> {
    wire_params(request)
        .into_iter()
        .map(|(name, values)| (name.to_string(), values))
        .collect()
}

/// Parse one `rel:dir:...:field:value` filter.
pub fn filter_from_wire(op: Operator, text: &str) -> Result<SearchFilter> {
    let parts: Vec<&str> = text.split(':').collect();
    if parts.len() < 2 || parts.len() % 2 != 0 {
        return Err(SearchError::MalformedFilter(text.to_string()));
    }

    let (hops, tail) = parts.split_at(parts.len() - 2);
    let mut traversals = Vec::with_capacity(hops.len() / 2);
    for pair in hops.chunks(2) {
        let direction = match pair[1] {
            "in" => Direction::In,
            "out" => Direction::Out,
            _ => return Err(SearchError::MalformedFilter(text.to_string())),
        };
        traversals.push(TraversalHop::new(pair[0], direction));
    }

    let raw = tail[1].replace(ESCAPED_COLON, ":");
    Ok(SearchFilter {
        field: tail[0].to_string(),
        value: parse_value(op, raw),
        traversals,
    })
}

/// Range comparisons on numeric-looking values compare as numbers.
fn parse_value(op: Operator, raw: String) -> Value {
    if op.is_range() {
        if let Ok(i) = raw.parse::<i64>() {
            return Value::Number(i.into());
        }
        if let Some(n) = raw.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(n);
        }
    }
    Value::String(raw)
}

fn apply_param(builder: SearchRequestBuilder, name: &str, values: &[String]) -> Result<SearchRequestBuilder> {
    let mut builder = builder;
    match name {
        TYPE_PARAM => {
            for t in values.iter().filter(|t| !t.is_empty()) {
                builder = builder.with_type(t.as_str());
            }
        }
        ANCESTOR_PATH_PARAM => {
            if let Some(path) = values.first() {
                builder = builder.ancestor_path(path.as_str());
            }
        }
        SUMMARIZE_PARAM => {
            builder = builder.summarize(values.iter().any(|v| v == "true"));
        }
        other => {
            let op = other.parse::<Operator>()?;
            for text in values {
                builder = builder.filter(op, filter_from_wire(op, text)?);
            }
        }
    }
    Ok(builder)
}

impl SearchRequest {
    /// Parse the query string form. A leading `?` is ignored.
    pub fn from_query_string(query: &str) -> Result<Self> {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut builder = SearchRequest::builder();

        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (name, encoded) = pair.split_once('=').unwrap_or((pair, ""));
            let decoded = decode_component(name, encoded)?;
            let values: Vec<String> = decoded.split(',').map(str::to_string).collect();
            builder = apply_param(builder, name, &values)?;
        }

        builder.build()
    }

    /// Parse the multi-value map form.
    pub fn from_multi_value_map(params: &BTreeMap<String, Vec<String>>) -> Result<Self> {
        let mut builder = SearchRequest::builder();
        for (name, values) in params {
            builder = apply_param(builder, name, values)?;
        }
        builder.build()
    }

    pub fn to_query_string(&self) -> String {
        to_query_string(self)
    }

    pub fn to_multi_value_map(&self) -> BTreeMap<String, Vec<String>> {
        to_multi_value_map(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn installed_in_request() -> SearchRequest {
        SearchRequest::builder()
            .with_type("auto_ecu")
            .eq(SearchFilter::new("name", "5AZVZ34HXGA10004").via("installed_in", Direction::Out))
            .build()
            .unwrap()
    }

    fn region_request() -> SearchRequest {
        SearchRequest::builder()
            .with_type("auto_ecu")
            .eq(SearchFilter::new(
                "name",
                "ap-northeast-1:55f70ca4-faaa-4aa0-8778-99a102174740",
            ))
            .build()
            .unwrap()
    }

    #[test]
    fn test_query_string_with_traversal() {
        let qs = installed_in_request().to_query_string();
        assert_eq!(qs, "type=auto_ecu&eq=installed_in%3Aout%3Aname%3A5AZVZ34HXGA10004");
        assert_eq!(
            percent_decode_str(&qs).decode_utf8().unwrap(),
            "type=auto_ecu&eq=installed_in:out:name:5AZVZ34HXGA10004"
        );
    }

    #[test]
    fn test_multi_value_map_with_traversal() {
        let map = installed_in_request().to_multi_value_map();
        assert_eq!(map["type"], vec!["auto_ecu"]);
        assert_eq!(map["eq"], vec!["installed_in:out:name:5AZVZ34HXGA10004"]);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_in_value_colon_is_escaped_twice() {
        let request = region_request();

        let qs = request.to_query_string();
        assert_eq!(
            qs,
            "type=auto_ecu&eq=name%3Aap-northeast-1%253A55f70ca4-faaa-4aa0-8778-99a102174740"
        );
        assert_eq!(
            percent_decode_str(&qs).decode_utf8().unwrap(),
            "type=auto_ecu&eq=name:ap-northeast-1%3A55f70ca4-faaa-4aa0-8778-99a102174740"
        );

        let map = request.to_multi_value_map();
        assert_eq!(
            map["eq"],
            vec!["name:ap-northeast-1%3A55f70ca4-faaa-4aa0-8778-99a102174740"]
        );
    }

    #[test]
    fn test_parameter_order_and_summarize() {
        let request = SearchRequest::builder()
            .with_type("vehicle")
            .with_type("ecu")
            .ancestor_path("/fleet/east")
            .filter(Operator::Contains, SearchFilter::new("model", "T"))
            .filter(Operator::Lt, SearchFilter::new("mileage", 5000))
            .eq(SearchFilter::new("state", "active"))
            .eq(SearchFilter::new("name", "x").via("installed_in", Direction::Out).via("parent", Direction::In))
            .summarize(true)
            .build()
            .unwrap();

        assert_eq!(
            request.to_query_string(),
            "type=vehicle%2Cecu&ancestorPath=%2Ffleet%2Feast\
             &eq=state%3Aactive%2Cinstalled_in%3Aout%3Aparent%3Ain%3Aname%3Ax\
             &lt=mileage%3A5000&contains=model%3AT&summarize=true"
        );

        let map = request.to_multi_value_map();
        assert_eq!(map["type"], vec!["vehicle", "ecu"]);
        assert_eq!(map["summarize"], vec!["true"]);
        assert_eq!(map["eq"][1], "installed_in:out:parent:in:name:x");
    }

    #[test]
    fn test_summarize_omitted_when_unset() {
        assert!(!installed_in_request().to_query_string().contains("summarize"));
        assert!(!installed_in_request().to_multi_value_map().contains_key("summarize"));
    }

    #[test]
    fn test_parse_query_string_restores_colon() {
        let qs = region_request().to_query_string();
        let parsed = SearchRequest::from_query_string(&format!("?{qs}")).unwrap();
        assert_eq!(parsed, region_request());
        assert_eq!(
            parsed.filters(Operator::Eq)[0].value,
            json!("ap-northeast-1:55f70ca4-faaa-4aa0-8778-99a102174740")
        );
    }

    #[test]
    fn test_literal_escape_text_reads_back_as_colon() {
        let request = SearchRequest::builder()
            .eq(SearchFilter::new("name", "50%3Aoff"))
            .build()
            .unwrap();
        let parsed = SearchRequest::from_query_string(&request.to_query_string()).unwrap();
        assert_eq!(parsed.filters(Operator::Eq)[0].value, json!("50:off"));
    }

    #[test]
    fn test_parse_multi_value_map() {
        let map = installed_in_request().to_multi_value_map();
        let parsed = SearchRequest::from_multi_value_map(&map).unwrap();
        assert_eq!(parsed, installed_in_request());
        assert_eq!(
            parsed.filters(Operator::Eq)[0].traversals,
            vec![TraversalHop::new("installed_in", Direction::Out)]
        );
    }

    #[test]
    fn test_parse_numeric_range_values() {
        let parsed = SearchRequest::from_query_string("type=vehicle&gte=mileage%3A1500&lt=weight%3A2.5&eq=code%3A42").unwrap();
        assert_eq!(parsed.filters(Operator::Gte)[0].value, json!(1500));
        assert_eq!(parsed.filters(Operator::Lt)[0].value, json!(2.5));
        assert_eq!(parsed.filters(Operator::Eq)[0].value, json!("42"));
    }

    #[test]
    fn test_parse_rejects_malformed_input() {
        assert!(matches!(
            SearchRequest::from_query_string("type=x&eq=nameonly").unwrap_err(),
            SearchError::MalformedFilter(_)
        ));
        assert!(matches!(
            SearchRequest::from_query_string("type=x&eq=rel%3Asideways%3Aname%3Av").unwrap_err(),
            SearchError::MalformedFilter(_)
        ));
        assert!(matches!(
            SearchRequest::from_query_string("type=x&like=name%3Av").unwrap_err(),
            SearchError::UnknownParameter(_)
        ));
        assert!(matches!(
            SearchRequest::from_query_string("type=%FF").unwrap_err(),
            SearchError::Decode { .. }
        ));
    }

    fn word() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9_-]{1,12}"
    }

    proptest! {
        #[test]
        fn string_filters_survive_the_query_string(
            t in word(),
            field in word(),
            value in "[a-zA-Z0-9 :/_.-]{1,24}",
            hop in proptest::option::of(word()),
        ) {
            let mut filter = SearchFilter::new(field, value);
            if let Some(rel) = hop {
                filter = filter.via(rel, Direction::In);
            }
            let request = SearchRequest::builder().with_type(t).eq(filter).build().unwrap();
            let parsed = SearchRequest::from_query_string(&request.to_query_string()).unwrap();
            prop_assert_eq!(parsed, request);
        }
    }
}
