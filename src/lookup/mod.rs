/*!
 * External Lookups
 * Compound service and virtual-individual catalogue clients
 */

pub mod compounds;
pub mod http;
pub mod individuals;
pub mod token;
pub mod traits;
pub mod types;

// Re-export public API
pub use compounds::CompoundClient;
pub use individuals::IndividualClient;
pub use token::{BearerToken, TokenCache};
pub use traits::{CompoundLookup, IndividualLookup};
pub use types::{
    is_empty_document, IndividualQuery, Interaction, LookupError, LookupResult, SynonymMatch,
    TokenGrant,
};

#[cfg(test)]
pub use traits::{MockCompoundLookup, MockIndividualLookup};
