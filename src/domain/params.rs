//! Named fit parameters.
//!
//! A [`Parameters`] set is produced by model guessing, overridden by caller
//! entries, and returned by the optimizer with a standard error per parameter.
//! Names are ordered so that the optimizer's parameter vector is deterministic.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ResonatorError;

/// A single fit parameter: value, optional bounds, vary flag and (after a fit)
/// its standard error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default = "default_vary")]
    pub vary: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<f64>,
}

fn default_vary() -> bool {
    true
}

impl Parameter {
    /// An unbounded, varying parameter.
    pub fn new(value: f64) -> Self {
        Self {
            value,
            min: None,
            max: None,
            vary: true,
            stderr: None,
        }
    }

    /// A parameter held constant during the fit.
    pub fn fixed(value: f64) -> Self {
        Self {
            vary: false,
            ..Self::new(value)
        }
    }

    pub fn with_min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn with_max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn with_bounds(self, min: f64, max: f64) -> Self {
        self.with_min(min).with_max(max)
    }

    /// Clamp `value` into this parameter's bounds.
    pub fn clamp(&self, value: f64) -> f64 {
        let mut v = value;
        if let Some(min) = self.min {
            v = v.max(min);
        }
        if let Some(max) = self.max {
            v = v.min(max);
        }
        v
    }
}

/// Ordered mapping from parameter name to [`Parameter`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters(BTreeMap<String, Parameter>);

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, param: Parameter) {
        self.0.insert(name.into(), param);
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, param: Parameter) -> Self {
        self.insert(name, param);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.0.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.0.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Value of `name`, or [`ResonatorError::UnknownParameter`].
    pub fn value(&self, name: &str) -> Result<f64, ResonatorError> {
        self.0
            .get(name)
            .map(|p| p.value)
            .ok_or_else(|| ResonatorError::UnknownParameter(name.to_string()))
    }

    /// Standard error of `name`.
    ///
    /// Fails with `UnknownParameter` if the name is absent and `MissingStderr`
    /// if the optimizer did not produce an error for it.
    pub fn stderr(&self, name: &str) -> Result<f64, ResonatorError> {
        let param = self
            .0
            .get(name)
            .ok_or_else(|| ResonatorError::UnknownParameter(name.to_string()))?;
        param
            .stderr
            .ok_or_else(|| ResonatorError::MissingStderr(name.to_string()))
    }

    /// Overwrite entries with those in `other`; entries in `other` win,
    /// including their bounds and vary flags.
    pub fn update(&mut self, other: &Parameters) {
        for (name, param) in &other.0 {
            self.0.insert(name.clone(), param.clone());
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Parameter)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Parameter)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (String, Parameter)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
