use async_trait::async_trait;
use vigil_types::ValidatorResult;

/// Supplier of the trending queries used to drive volume sampling.
#[async_trait]
pub trait QuerySource: Send + Sync {
    /// Queries ordered by relevance, most relevant first.
    async fn fetch(&self) -> ValidatorResult<Vec<String>>;
}

/// Fixed query list, for nodes without an external trend feed.
#[derive(Debug, Clone, Default)]
pub struct StaticQuerySource {
    queries: Vec<String>,
}

impl StaticQuerySource {
    pub fn new<I, S>(queries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            queries: queries.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl QuerySource for StaticQuerySource {
    async fn fetch(&self) -> ValidatorResult<Vec<String>> {
        Ok(self.queries.clone())
    }
}
