//! Search over resource models.

use std::collections::BTreeMap;

use assetgraph_graph::{GraphEngine, Page};
use assetgraph_search::{SearchDao, SearchRequest, SearchResults};

use crate::error::Result;

pub struct SearchService<E: GraphEngine> {
    dao: SearchDao<E>,
}

impl<E: GraphEngine> SearchService<E> {
    pub fn new(dao: SearchDao<E>) -> Self {
        Self { dao }
    }

    pub async fn search(&self, request: &SearchRequest, page: Option<Page>) -> Result<SearchResults> {
        Ok(self.dao.search(request, page).await?)
    }

    /// Search from the query string form of a request.
    pub async fn search_query_string(&self, query: &str, page: Option<Page>) -> Result<SearchResults> {
        let request = SearchRequest::from_query_string(query)?;
        self.search(&request, page).await
    }

    /// Search from the multi-value form of a request.
    pub async fn search_multi_value(&self, params: &BTreeMap<String, Vec<String>>, page: Option<Page>) -> Result<SearchResults> {
        let request = SearchRequest::from_multi_value_map(params)?;
        self.search(&request, page).await
    }
}
