/*!
 * Model Catalog
 * Victim/perpetrator combinations mapped to PBPK model files
 */

use crate::config::ModelSpec;
use std::path::Path;

/// Ordered catalog; the first matching entry wins
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    entries: Vec<(ModelSpec, Vec<String>)>,
}

impl ModelCatalog {
    pub fn new(models: impl IntoIterator<Item = ModelSpec>) -> Self {
        Self {
            entries: models
                .into_iter()
                .map(|spec| {
                    let key = spec.perpetrator_key();
                    (spec, key)
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Model for `victim` whose perpetrator set equals `perpetrators`
    ///
    /// `perpetrators` must already be lowercased, de-duplicated and sorted.
    pub fn resolve(&self, victim: &str, perpetrators: &[String]) -> Option<&ModelSpec> {
        self.entries
            .iter()
            .find(|(spec, key)| spec.victim.eq_ignore_ascii_case(victim) && key == perpetrators)
            .map(|(spec, _)| spec)
    }

    pub fn get(&self, id: &str) -> Option<&ModelSpec> {
        self.entries
            .iter()
            .map(|(spec, _)| spec)
            .find(|spec| spec.id == id)
    }

    /// File of model `id`
    pub fn path_of(&self, id: &str) -> Option<&Path> {
        self.get(id).map(|spec| spec.path.as_path())
    }
}
