//! Compiles a `SearchRequest` into one read traversal and runs it.

use serde::Serialize;
use serde_json::Value;

use assetgraph_core::types::{Category, Direction, Node};
use assetgraph_graph::assembler;
use assetgraph_graph::engine::quote_identifier;
use assetgraph_graph::{ConnectionScope, GraphEngine, GraphError, Page, Traversal};

use crate::error::Result;
use crate::model::{Operator, SearchFilter, SearchRequest};

/// Outcome of a search: a count when summarizing, the matches otherwise.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SearchResults {
    Summary { total: u64 },
    Nodes { results: Vec<Node> },
}

fn comparison(op: Operator) -> &'static str {
    match op {
        Operator::Eq => "=",
        Operator::Neq => "<>",
        Operator::Lt => "<",
        Operator::Lte => "<=",
        Operator::Gt => ">",
        Operator::Gte => ">=",
        Operator::StartsWith => "STARTS WITH",
        Operator::EndsWith => "ENDS WITH",
        Operator::Contains => "CONTAINS",
    }
}

fn filter_predicate(t: &mut Traversal, op: Operator, filter: &SearchFilter) -> std::result::Result<String, GraphError> {
    let field = quote_identifier(&filter.field)?;
    let param = t.bind_next("s", filter.value.clone());

    if filter.traversals.is_empty() {
        return Ok(format!("n.{field} {} ${param}", comparison(op)));
    }

    let mut pattern = "(n)".to_string();
    let mut last = String::from("n");
    for (i, hop) in filter.traversals.iter().enumerate() {
        let rel = quote_identifier(&hop.relation)?;
        last = format!("h{}_{i}", t.params().len());
        let step = match hop.direction {
            Direction::In => format!("<-[:{rel}]-({last})"),
            _ => format!("-[:{rel}]->({last})"),
        };
        pattern.push_str(&step);
    }
    Ok(format!(
        "EXISTS {{ MATCH {pattern} WHERE {last}.{field} {} ${param} }}",
        comparison(op)
    ))
}

/// Build the traversal for `request`, paged unless summarizing.
pub fn compile(request: &SearchRequest, page: Option<Page>) -> std::result::Result<Traversal, GraphError> {
    let mut t = Traversal::read("");
    let mut predicates = Vec::new();

    if !request.types().is_empty() {
        let labels = request
            .types()
            .iter()
            .map(|ty| quote_identifier(ty).map(|q| format!("n:{q}")))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        predicates.push(format!("({})", labels.join(" OR ")));
    }

    if let Some(path) = request.ancestor_path() {
        let ancestor = assetgraph_core::identity::group_id(path)?;
        t.bind("ancestor", ancestor);
        let group = quote_identifier(Category::Group.label())?;
        predicates.push(format!(
            "EXISTS {{ MATCH (n)-[*1..]->(a:{group}) WHERE a.id = $ancestor }}"
        ));
    }

    for (op, filters) in request.operators() {
        for filter in filters {
            predicates.push(filter_predicate(&mut t, op, filter)?);
        }
    }

    t.push("MATCH (n)");
    if !predicates.is_empty() {
        t.push(format!("WHERE {}", predicates.join("\n  AND ")));
    }

    if request.summarize() {
        t.push("RETURN count(DISTINCT n) AS result");
        return Ok(t);
    }

    t.push("WITH DISTINCT n");
    t.push("ORDER BY n.id");
    if let Some(page) = page {
        t.bind("offset", page.offset);
        t.bind("count", page.count);
        t.push("SKIP $offset LIMIT $count");
    }
    t.push("RETURN properties(n) AS result");
    Ok(t)
}

/// Runs searches against the graph.
pub struct SearchDao<E: GraphEngine> {
    engine: E,
}

impl<E: GraphEngine> SearchDao<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    pub async fn search(&self, request: &SearchRequest, page: Option<Page>) -> Result<SearchResults> {
        tracing::debug!(?request, ?page, "search: in");

        let t = compile(request, page)?;
        let rows = ConnectionScope::run(&self.engine, "search.search", t).await?;

        let results = if request.summarize() {
            let total = rows.first().and_then(Value::as_u64).unwrap_or(0);
            SearchResults::Summary { total }
        } else {
            let nodes = rows
                .into_iter()
                .map(|row| assembler::assemble_node(&assembler::decode(row)?))
                .collect::<std::result::Result<Vec<_>, GraphError>>()?;
            SearchResults::Nodes { results: nodes }
        };

        tracing::debug!(?results, "search: exit");
        Ok(results)
    }
}
