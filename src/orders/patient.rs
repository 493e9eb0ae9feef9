/*!
 * Patient Submission
 * Input payload of an order, decoded from the verbatim `input` column
 */

use serde::{Deserialize, Serialize};

/// Biological sex as used by the virtual-individual catalogue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    pub fn as_str(self) -> &'static str {
        match self {
            Sex::Male => "male",
            Sex::Female => "female",
        }
    }
}

/// One recurring intake: a 5-field cron expression and the number of product
/// doses taken each time it fires
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intake {
    pub cron: String,
    pub dosage: f64,
}

/// A drug line of the submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drug {
    pub active_substances: Vec<String>,
    #[serde(default)]
    pub dose: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub intake_cycle: Vec<Intake>,
    /// Marks the drug whose dose is being adjusted
    #[serde(default)]
    pub adjust: bool,
}

/// Patient characteristics plus medication list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientData {
    /// Years
    pub age: u32,
    /// Kilograms
    pub weight: f64,
    /// Centimetres
    pub height: f64,
    pub sex: Sex,
    #[serde(default)]
    pub liver_disease: bool,
    #[serde(default)]
    pub kidney_disease: bool,
    /// Population tag of the virtual-individual catalogue
    #[serde(default)]
    pub ethnicity: Option<String>,
    pub drugs: Vec<Drug>,
}

impl PatientData {
    /// Decode the verbatim order input
    pub fn from_input(input: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(input)
    }

    /// Drugs flagged for adjustment
    pub fn adjusted_drugs(&self) -> impl Iterator<Item = &Drug> {
        self.drugs.iter().filter(|d| d.adjust)
    }
}
