/*!
 * Lookup Traits
 * Seams between the precheck pipeline and the external data sources
 */

use super::types::*;
use async_trait::async_trait;

/// Compound vocabulary and interaction data
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompoundLookup: Send + Sync {
    /// Synonyms for each queried name; names missing from the vocabulary are
    /// absent from the result or carry no matches
    async fn synonyms(&self, names: &[String]) -> LookupResult<Vec<SynonymMatch>>;

    /// Pairwise interactions among the given compounds
    async fn interactions(&self, names: &[String]) -> LookupResult<Vec<Interaction>>;
}

/// Precomputed virtual-individual profiles
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IndividualLookup: Send + Sync {
    /// The matching profile, or `None` when the catalogue has no document
    async fn find(&self, query: &IndividualQuery) -> LookupResult<Option<serde_json::Value>>;
}
