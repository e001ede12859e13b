//! Built-in model registry.
//!
//! The registry maps model names to constructors so callers can refer to
//! models by name at the API boundary. The symbolic model-definition
//! language that generates full compartment models lives outside this
//! crate; the models here are the baseline and validation models the
//! pipeline itself needs.

mod adc;
mod s0;

pub use adc::AdcModel;
pub use s0::S0Model;

use crate::error::{Error, Result};
use crate::model::{CascadeSpec, Model};

/// Look up a model by name.
///
/// Composite models: `"S0"`, `"Adc"`. Cascades: `"Adc (Cascade)"`.
pub fn get_model(name: &str) -> Result<Model> {
    match name {
        "S0" => Ok(Model::Composite(Box::new(S0Model::new()))),
        "Adc" => Ok(Model::Composite(Box::new(AdcModel::new()))),
        "Adc (Cascade)" => Ok(Model::Cascade(CascadeSpec {
            name: "Adc (Cascade)".to_string(),
            steps: vec!["S0".to_string(), "Adc".to_string()],
        })),
        _ => Err(Error::Validation(format!("unknown model '{name}'"))),
    }
}

/// Names of all registered models.
pub fn list_models() -> Vec<&'static str> {
    vec!["S0", "Adc", "Adc (Cascade)"]
}
