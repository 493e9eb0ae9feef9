/*!
 * Precheck Pipeline
 * Ordered safety stages run before a simulation is launched
 *
 * Stages:
 * 1. Compound extraction and dose schedule
 * 2. Synonym resolution
 * 3. Organ impairment
 * 4. Interaction check
 * 5. Virtual-individual match
 * 6. Model resolution
 *
 * The first failing stage short-circuits; its error is returned together with
 * everything the earlier stages produced.
 */

use super::models::ModelCatalog;
use super::schedule::{expand_schedule, midnight_of};
use super::types::*;
use crate::config::PrecheckConfig;
use crate::lookup::{CompoundLookup, IndividualLookup, IndividualQuery, LookupError};
use crate::monitoring::{generate_trace_id, StageSpan};
use crate::orders::PatientData;
use chrono::{DateTime, Local, TimeZone};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

type StageResult = Result<(), PrecheckError>;

/// Map a lookup failure: not-found is the submission's fault, the rest is
/// infrastructure
fn classify_lookup(stage: &str, err: LookupError) -> PrecheckError {
    if err.is_not_found() {
        PrecheckError::unrecoverable(format!("{}: {}", stage, err))
    } else {
        PrecheckError::recoverable(format!("{} unavailable: {}", stage, err))
    }
}

/// Multi-stage precheck over the lookup services and the model catalog
pub struct PrecheckPipeline {
    compounds: Arc<dyn CompoundLookup>,
    individuals: Arc<dyn IndividualLookup>,
    catalog: ModelCatalog,
    max_doses: usize,
    default_population: String,
}

impl PrecheckPipeline {
    pub fn new(
        compounds: Arc<dyn CompoundLookup>,
        individuals: Arc<dyn IndividualLookup>,
        config: &PrecheckConfig,
    ) -> Self {
        Self {
            compounds,
            individuals,
            catalog: ModelCatalog::new(config.models.clone()),
            max_doses: config.max_doses,
            default_population: config.default_population.clone(),
        }
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Run every stage, expanding the schedule from today's local midnight
    pub async fn check(
        &self,
        patient: &PatientData,
        cancel: &CancellationToken,
    ) -> Result<PrecheckResult, PrecheckFailure> {
        self.check_at(patient, cancel, Local::now()).await
    }

    /// Run every stage with an explicit clock
    ///
    /// Intake times are wall-clock times in `now`'s zone, so a daily 08:00
    /// intake stays at 08:00 across daylight-saving changes.
    pub async fn check_at<Tz>(
        &self,
        patient: &PatientData,
        cancel: &CancellationToken,
        now: DateTime<Tz>,
    ) -> Result<PrecheckResult, PrecheckFailure>
    where
        Tz: TimeZone + Send + Sync,
        Tz::Offset: Send + Sync,
    {
        let trace_id = generate_trace_id();
        let mut result = PrecheckResult::default();

        macro_rules! stage {
            ($name:literal, $call:expr) => {{
                if cancel.is_cancelled() {
                    return Err(PrecheckFailure {
                        error: PrecheckError::cancelled(),
                        partial: result,
                    });
                }
                let span = StageSpan::new($name, &trace_id);
                let outcome: StageResult = $call;
                span.record_result(outcome.is_ok());
                if let Err(error) = outcome {
                    debug!(trace_id = %trace_id, stage = $name, error = %error, "precheck stage failed");
                    return Err(PrecheckFailure {
                        error,
                        partial: result,
                    });
                }
            }};
        }

        stage!("compounds", self.extract_compounds(patient, &now, &mut result));
        stage!("synonyms", self.resolve_synonyms(&mut result).await);
        stage!("organs", Self::check_organs(patient, &mut result));
        stage!("interactions", self.check_interactions(&mut result).await);
        stage!("individual", self.match_individual(patient, &mut result).await);
        stage!("model", self.resolve_model(&mut result));

        info!(
            trace_id = %trace_id,
            compounds = result.compounds.len(),
            interactions = result.interactions.len(),
            model_id = result.model_id.as_deref().unwrap_or_default(),
            "precheck passed"
        );
        Ok(result)
    }

    // -------------------------------------------------------------------------
    // Stages
    // -------------------------------------------------------------------------

    fn extract_compounds<Tz: TimeZone>(
        &self,
        patient: &PatientData,
        now: &DateTime<Tz>,
        result: &mut PrecheckResult,
    ) -> StageResult {
        let adjusted = patient.adjusted_drugs().count();
        if adjusted != 1 {
            return Err(PrecheckError::unrecoverable(format!(
                "exactly one drug must be marked for adjustment, found {}",
                adjusted
            )));
        }

        let start = midnight_of(now);
        let mut compounds: Vec<Compound> = Vec::with_capacity(patient.drugs.len());

        for drug in &patient.drugs {
            let name = match drug.active_substances.as_slice() {
                [single] => single.trim().to_lowercase(),
                other => {
                    return Err(PrecheckError::unrecoverable(format!(
                        "each drug must have exactly one active substance, found {}",
                        other.len()
                    )))
                }
            };

            let schedule = if drug.adjust {
                let schedule = expand_schedule(
                    &drug.intake_cycle,
                    drug.dose,
                    drug.unit.as_deref(),
                    &start,
                    self.max_doses,
                )?;
                if schedule.is_empty() {
                    return Err(PrecheckError::unrecoverable(format!(
                        "the adjusted drug '{}' has no scheduled intake",
                        name
                    )));
                }
                schedule
            } else {
                Vec::new()
            };

            let compound = Compound {
                name,
                synonyms: Vec::new(),
                adjust: drug.adjust,
                dose: drug.dose,
                unit: drug.unit.clone(),
                schedule,
            };

            match compounds.iter_mut().find(|c| c.name == compound.name) {
                // The adjusted drug's entry replaces a duplicate co-medication
                Some(existing) if compound.adjust => *existing = compound,
                Some(_) => {}
                None => compounds.push(compound),
            }
        }

        result.compounds = compounds;
        Ok(())
    }

    async fn resolve_synonyms(&self, result: &mut PrecheckResult) -> StageResult {
        let names = result.names();
        let matches = self
            .compounds
            .synonyms(&names)
            .await
            .map_err(|e| classify_lookup("synonym lookup", e))?;

        for compound in &mut result.compounds {
            let found = matches
                .iter()
                .find(|m| m.name.eq_ignore_ascii_case(&compound.name))
                .filter(|m| !m.matches.is_empty());
            match found {
                Some(entry) => compound.synonyms = entry.matches.clone(),
                None => {
                    return Err(PrecheckError::unrecoverable(format!(
                        "unknown compound '{}'",
                        compound.name
                    )))
                }
            }
        }
        Ok(())
    }

    fn check_organs(patient: &PatientData, result: &mut PrecheckResult) -> StageResult {
        if patient.liver_disease {
            result
                .messages
                .push("Liver disease reported: hepatic clearance may be reduced.".to_string());
        }
        if patient.kidney_disease {
            result
                .messages
                .push("Kidney disease reported: renal clearance may be reduced.".to_string());
        }
        result.organ_impairment = patient.liver_disease || patient.kidney_disease;
        Ok(())
    }

    async fn check_interactions(&self, result: &mut PrecheckResult) -> StageResult {
        if result.compounds.len() < 2 {
            result
                .messages
                .push("Fewer than two compounds: interaction check skipped.".to_string());
            return Ok(());
        }

        let interactions = self
            .compounds
            .interactions(&result.names())
            .await
            .map_err(|e| classify_lookup("interaction lookup", e))?;

        if interactions.is_empty() {
            result
                .messages
                .push("No interactions found between the compounds.".to_string());
        } else {
            result
                .messages
                .push(format!("{} interaction(s) found.", interactions.len()));
        }
        result.interactions = interactions;
        Ok(())
    }

    async fn match_individual(
        &self,
        patient: &PatientData,
        result: &mut PrecheckResult,
    ) -> StageResult {
        let query = IndividualQuery {
            population: patient
                .ethnicity
                .clone()
                .filter(|p| !p.trim().is_empty())
                .unwrap_or_else(|| self.default_population.clone()),
            sex: patient.sex,
            age: patient.age,
            height: patient.height.round() as i64,
            weight: patient.weight.round() as i64,
        };

        let document = self
            .individuals
            .find(&query)
            .await
            .map_err(|e| classify_lookup("virtual individual lookup", e))?;

        match document {
            Some(document) => {
                result.individual = Some(document);
                Ok(())
            }
            None => Err(PrecheckError::unrecoverable(format!(
                "no virtual individual for population '{}', {}, age {}, {} cm, {} kg",
                query.population,
                query.sex.as_str(),
                query.age,
                query.height,
                query.weight
            ))),
        }
    }

    fn resolve_model(&self, result: &mut PrecheckResult) -> StageResult {
        let victim = result
            .victim()
            .map(|c| c.name.clone())
            .ok_or_else(|| PrecheckError::unrecoverable("no compound marked for adjustment"))?;

        let mut perpetrators: Vec<String> = result
            .interactions
            .iter()
            .filter_map(|i| i.opponent_of(&victim))
            .map(|p| p.trim().to_lowercase())
            .collect();
        perpetrators.sort();
        perpetrators.dedup();

        let model = self
            .catalog
            .resolve(&victim, &perpetrators)
            .ok_or_else(|| PrecheckError::unrecoverable("no model found"))?;

        result.messages.push(format!("Model '{}' selected.", model.id));
        result.model_id = Some(model.id.clone());
        Ok(())
    }
}
