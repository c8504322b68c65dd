//! The declarative search request.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use assetgraph_core::types::Direction;

use crate::error::{Result, SearchError};

// ── Operator ──────────────────────────────────────────────────────

/// Comparison applied by a filter. Declaration order is wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    StartsWith,
    EndsWith,
    Contains,
}

impl Operator {
    pub const ALL: [Operator; 9] = [
        Self::Eq,
        Self::Neq,
        Self::Lt,
        Self::Lte,
        Self::Gt,
        Self::Gte,
        Self::StartsWith,
        Self::EndsWith,
        Self::Contains,
    ];

    /// Parameter name in both wire forms.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::StartsWith => "startsWith",
            Self::EndsWith => "endsWith",
            Self::Contains => "contains",
        }
    }

    pub fn from_wire_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.wire_name() == name)
    }

    /// Whether values compared by this operator are ordered.
    pub fn is_range(&self) -> bool {
        matches!(self, Self::Lt | Self::Lte | Self::Gt | Self::Gte)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for Operator {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_wire_name(s).ok_or_else(|| SearchError::UnknownParameter(s.to_string()))
    }
}

// ── Filters ───────────────────────────────────────────────────────

/// One relationship hop taken before the field is compared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraversalHop {
    pub relation: String,
    pub direction: Direction,
}

impl TraversalHop {
    pub fn new(relation: impl Into<String>, direction: Direction) -> Self {
        Self {
            relation: relation.into(),
            direction,
        }
    }
}

/// Compare `field` to `value` on the matched entity, or on the entity reached
/// by following `traversals` from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchFilter {
    pub field: String,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub traversals: Vec<TraversalHop>,
}

impl SearchFilter {
    pub fn new(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            traversals: Vec::new(),
        }
    }

    /// Follow `relation` in `direction` before comparing.
    pub fn via(mut self, relation: impl Into<String>, direction: Direction) -> Self {
        self.traversals.push(TraversalHop::new(relation, direction));
        self
    }

    /// The value as it appears on the wire, before escaping.
    pub fn value_text(&self) -> String {
        match &self.value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.field.is_empty() {
            return Err(SearchError::EmptyField);
        }
        check_wire_name(&self.field)?;
        match &self.value {
            Value::String(s) if s.is_empty() => {
                return Err(SearchError::EmptyValue {
                    field: self.field.clone(),
                })
            }
            Value::String(_) | Value::Number(_) | Value::Bool(_) => {}
            _ => {
                return Err(SearchError::UnsupportedValue {
                    field: self.field.clone(),
                })
            }
        }
        for hop in &self.traversals {
            if hop.relation.is_empty() {
                return Err(SearchError::EmptyRelation);
            }
            check_wire_name(&hop.relation)?;
            if hop.direction == Direction::Both {
                return Err(SearchError::InvalidHopDirection {
                    relation: hop.relation.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Field and relation names are written unescaped between `:` and `,`.
fn check_wire_name(name: &str) -> Result<()> {
    if name.contains([':', ',']) {
        return Err(SearchError::ReservedCharacter(name.to_string()));
    }
    Ok(())
}

// ── Request ───────────────────────────────────────────────────────

/// A validated search request. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    types: Vec<String>,
    ancestor_path: Option<String>,
    summarize: bool,
    filters: BTreeMap<Operator, Vec<SearchFilter>>,
}

impl SearchRequest {
    pub fn builder() -> SearchRequestBuilder {
        SearchRequestBuilder::default()
    }

    pub fn types(&self) -> &[String] {
        &self.types
    }

    pub fn ancestor_path(&self) -> Option<&str> {
        self.ancestor_path.as_deref()
    }

    pub fn summarize(&self) -> bool {
        self.summarize
    }

    /// Filters of one operator, in insertion order.
    pub fn filters(&self, op: Operator) -> &[SearchFilter] {
        self.filters.get(&op).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every non-empty operator with its filters, in wire order.
    pub fn operators(&self) -> impl Iterator<Item = (Operator, &[SearchFilter])> {
        self.filters
            .iter()
            .filter(|(_, filters)| !filters.is_empty())
            .map(|(op, filters)| (*op, filters.as_slice()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchRequestBuilder {
    types: Vec<String>,
    ancestor_path: Option<String>,
    summarize: bool,
    filters: BTreeMap<Operator, Vec<SearchFilter>>,
}

impl SearchRequestBuilder {
    pub fn with_type(mut self, t: impl Into<String>) -> Self {
        self.types.push(t.into());
        self
    }

    pub fn ancestor_path(mut self, path: impl Into<String>) -> Self {
        self.ancestor_path = Some(path.into());
        self
    }

    pub fn summarize(mut self, summarize: bool) -> Self {
        self.summarize = summarize;
        self
    }

    pub fn filter(mut self, op: Operator, filter: SearchFilter) -> Self {
        self.filters.entry(op).or_default().push(filter);
        self
    }

    pub fn eq(self, filter: SearchFilter) -> Self {
        self.filter(Operator::Eq, filter)
    }

    pub fn build(self) -> Result<SearchRequest> {
        let has_filters = self.filters.values().any(|f| !f.is_empty());
        if self.types.is_empty() && !has_filters {
            return Err(SearchError::EmptyRequest);
        }
        if self.types.iter().any(String::is_empty) {
            return Err(SearchError::MalformedFilter("empty type".to_string()));
        }
        for filter in self.filters.values().flatten() {
            filter.validate()?;
        }

        let mut types = Vec::with_capacity(self.types.len());
        for t in self.types {
            if !types.contains(&t) {
                types.push(t);
            }
        }

        Ok(SearchRequest {
            types,
            ancestor_path: self.ancestor_path.filter(|p| !p.is_empty()),
            summarize: self.summarize,
            filters: self.filters,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operator_wire_names() {
        assert_eq!(Operator::StartsWith.wire_name(), "startsWith");
        assert_eq!("endsWith".parse::<Operator>().unwrap(), Operator::EndsWith);
        assert!("like".parse::<Operator>().is_err());
        assert!(Operator::Gte.is_range());
        assert!(!Operator::Contains.is_range());
        assert_eq!(serde_json::to_value(Operator::StartsWith).unwrap(), json!("startsWith"));
    }

    #[test]
    fn test_builder_validates_filters() {
        let err = SearchRequest::builder()
            .eq(SearchFilter::new("", "x"))
            .build()
            .unwrap_err();
        assert!(matches!(err, SearchError::EmptyField));

        let err = SearchRequest::builder()
            .eq(SearchFilter::new("name", ""))
            .build()
            .unwrap_err();
        assert!(matches!(err, SearchError::EmptyValue { .. }));

        let err = SearchRequest::builder()
            .eq(SearchFilter::new("name", json!(["a"])))
            .build()
            .unwrap_err();
        assert!(matches!(err, SearchError::UnsupportedValue { .. }));

        let err = SearchRequest::builder()
            .eq(SearchFilter::new("name", "x").via("installed_in", Direction::Both))
            .build()
            .unwrap_err();
        assert!(matches!(err, SearchError::InvalidHopDirection { .. }));

        let err = SearchRequest::builder()
            .eq(SearchFilter::new("a:b", "x"))
            .build()
            .unwrap_err();
        assert!(matches!(err, SearchError::ReservedCharacter(_)));

        let err = SearchRequest::builder()
            .eq(SearchFilter::new("name", "x").via("installed,in", Direction::Out))
            .build()
            .unwrap_err();
        assert!(matches!(err, SearchError::ReservedCharacter(_)));

        assert!(matches!(
            SearchRequest::builder().build().unwrap_err(),
            SearchError::EmptyRequest
        ));
    }

    #[test]
    fn test_request_accessors() {
        let request = SearchRequest::builder()
            .with_type("auto_ecu")
            .with_type("auto_ecu")
            .ancestor_path("/fleet")
            .filter(Operator::Gt, SearchFilter::new("mileage", 1000))
            .eq(SearchFilter::new("state", "active"))
            .build()
            .unwrap();

        assert_eq!(request.types(), ["auto_ecu".to_string()]);
        assert_eq!(request.ancestor_path(), Some("/fleet"));
        assert!(!request.summarize());
        let ops: Vec<Operator> = request.operators().map(|(op, _)| op).collect();
        assert_eq!(ops, vec![Operator::Eq, Operator::Gt]);
        assert_eq!(request.filters(Operator::Gt)[0].value_text(), "1000");
        assert!(request.filters(Operator::Lt).is_empty());
    }
}
