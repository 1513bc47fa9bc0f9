use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CompartmentError;

/// Named physiological parameters (`F`, `v`, `MTT`, `PS`, ...)
///
/// Flows are in ml/min/100ml, volumes in ml/100ml and transit times in minutes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhysiologicalParameters(BTreeMap<String, f64>);

impl PhysiologicalParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.0.insert(name.into(), value);
    }

    /// Builder-style [`insert`](Self::insert)
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Value of `name`, or an error naming the missing parameter
    pub(crate) fn require(&self, name: &str) -> Result<f64, CompartmentError> {
        self.get(name)
            .ok_or_else(|| CompartmentError::MissingParameter(name.to_string()))
    }

    /// Values for `names`, in that order
    pub(crate) fn values_of(&self, names: &[&str]) -> Result<Vec<f64>, CompartmentError> {
        names.iter().map(|name| self.require(name)).collect()
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for PhysiologicalParameters {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl From<HashMap<String, f64>> for PhysiologicalParameters {
    fn from(map: HashMap<String, f64>) -> Self {
        Self(map.into_iter().collect())
    }
}

impl fmt::Display for PhysiologicalParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, value) in &self.0 {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{} = {:.4}", name, value)?;
            first = false;
        }
        Ok(())
    }
}

/// Point fit plus, once bootstrapped, the interval estimates
///
/// Serializes to a single mapping: the point-fit parameters at the top level and
/// three nested mappings keyed identically.
///
/// ```json
/// { "F": 51.0, "MTT": 0.22, "v": 11.2,
///   "low estimate": { ... }, "mean estimate": { ... }, "high estimate": { ... } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterReport {
    #[serde(flatten)]
    pub parameters: PhysiologicalParameters,
    #[serde(rename = "low estimate", default, skip_serializing_if = "Option::is_none")]
    pub low: Option<PhysiologicalParameters>,
    #[serde(rename = "mean estimate", default, skip_serializing_if = "Option::is_none")]
    pub mean: Option<PhysiologicalParameters>,
    #[serde(rename = "high estimate", default, skip_serializing_if = "Option::is_none")]
    pub high: Option<PhysiologicalParameters>,
}

impl ParameterReport {
    pub fn to_json(&self) -> Result<String, CompartmentError> {
        serde_json::to_string_pretty(self).map_err(|e| CompartmentError::Serialization(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, CompartmentError> {
        serde_json::from_str(json).map_err(|e| CompartmentError::Serialization(e.to_string()))
    }
}

/// Resolve a user start dictionary against a variant's parameter names and defaults
///
/// Unknown names and non-positive or non-finite values are rejected; missing
/// names take the default.
pub(crate) fn resolve_start(
    model: &'static str,
    names: &[&'static str],
    defaults: &[f64],
    start: Option<&PhysiologicalParameters>,
) -> Result<PhysiologicalParameters, CompartmentError> {
    if let Some(start) = start {
        if let Some((name, _)) = start.iter().find(|(name, _)| !names.contains(name)) {
            return Err(CompartmentError::UnknownParameter {
                model,
                name: name.to_string(),
            });
        }
    }

    let mut resolved = PhysiologicalParameters::new();
    for (&name, &default) in names.iter().zip(defaults) {
        let value = start.and_then(|s| s.get(name)).unwrap_or(default);
        if !value.is_finite() || value <= 0.0 {
            return Err(CompartmentError::InvalidParameter {
                name: name.to_string(),
                value,
            });
        }
        resolved.insert(name, value);
    }
    Ok(resolved)
}
