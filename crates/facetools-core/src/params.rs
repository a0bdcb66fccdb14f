//! User parameters and their declared defaults.
//!
//! The host owns the parameter set; steps read it through
//! [`ParameterStore`] and may remove entries that merely repeat a default so
//! the parameters saved alongside an image stay minimal.

use crate::config::AssemblerConfig;
use crate::error::{FaceToolsError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// A single user-supplied value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numbers also accept numeric text, as sent by form posts.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ParamValue::Number(n) => Some(*n),
            ParamValue::Text(s) => s.trim().parse().ok(),
            ParamValue::Bool(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            ParamValue::Text(s) if s.eq_ignore_ascii_case("true") => Some(true),
            ParamValue::Text(s) if s.eq_ignore_ascii_case("false") => Some(false),
            _ => None,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Number(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

/// Declared default of a parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamDefault {
    None,
    Text(&'static str),
    Number(f64),
    Bool(bool),
}

/// A registered parameter: display name, default, and comparison tolerance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamDef {
    pub name: &'static str,
    pub default: ParamDefault,
    /// Slider step shown by the host.
    pub step: f64,
    /// A text value equal to this is treated as not provided.
    pub ignore_if: Option<&'static str>,
}

impl ParamDef {
    pub const fn text(name: &'static str, default: &'static str) -> Self {
        Self {
            name,
            default: ParamDefault::Text(default),
            step: 0.0,
            ignore_if: None,
        }
    }

    pub const fn number(name: &'static str, default: f64, step: f64) -> Self {
        Self {
            name,
            default: ParamDefault::Number(default),
            step,
            ignore_if: None,
        }
    }

    pub const fn boolean(name: &'static str, default: bool) -> Self {
        Self {
            name,
            default: ParamDefault::Bool(default),
            step: 0.0,
            ignore_if: None,
        }
    }

    /// A parameter with no default, such as an uploaded image.
    pub const fn required(name: &'static str) -> Self {
        Self {
            name,
            default: ParamDefault::None,
            step: 0.0,
            ignore_if: None,
        }
    }

    pub const fn ignore_if(mut self, value: &'static str) -> Self {
        self.ignore_if = Some(value);
        self
    }

    /// Storage id: the name lowercased with everything but ascii alphanumerics removed.
    pub fn id(&self) -> String {
        clean_id(self.name)
    }

    fn type_error(&self, expected: &str, value: &ParamValue) -> FaceToolsError {
        FaceToolsError::Validation {
            field: self.name.to_string(),
            message: format!("expected {}, got {:?}", expected, value),
        }
    }
}

/// `"[ReActor] Face Image"` → `"reactorfaceimage"`.
pub fn clean_id(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Backing store for the user's parameters.
pub trait ParameterStore: Send {
    fn try_get(&self, id: &str) -> Option<ParamValue>;

    /// Remove a parameter. Returns whether it was present.
    fn remove(&mut self, id: &str) -> bool;
}

/// Toggle that turns default pruning off when explicitly set to false.
pub const REMOVE_PARAMS_IF_DEFAULT: ParamDef =
    ParamDef::boolean(AssemblerConfig::REMOVE_PARAMS_IF_DEFAULT, true);

/// Typed access on top of [`ParameterStore`].
pub trait ParamsExt {
    fn get_text(&self, def: &ParamDef) -> Result<Option<String>>;
    fn get_number(&self, def: &ParamDef) -> Result<Option<f64>>;
    fn get_bool(&self, def: &ParamDef) -> Result<Option<bool>>;

    /// Value if present, otherwise the declared default.
    fn text_or_default(&self, def: &ParamDef) -> Result<String>;
    fn number_or_default(&self, def: &ParamDef) -> Result<f64>;

    fn pruning_enabled(&self) -> bool;
}

/// Pruning reads; these remove the parameter when it equals its default.
pub trait ParamsPruneExt {
    fn take_text(&mut self, def: &ParamDef) -> Result<String>;
    fn take_number(&mut self, def: &ParamDef) -> Result<f64>;
}

impl<S: ParameterStore + ?Sized> ParamsExt for S {
    fn get_text(&self, def: &ParamDef) -> Result<Option<String>> {
        match self.try_get(&def.id()) {
            None => Ok(None),
            Some(value) => {
                let text = match &value {
                    ParamValue::Text(s) => s.clone(),
                    ParamValue::Number(n) => n.to_string(),
                    ParamValue::Bool(_) => return Err(def.type_error("text", &value)),
                };
                if def.ignore_if.is_some_and(|ignored| ignored == text) {
                    Ok(None)
                } else {
                    Ok(Some(text))
                }
            }
        }
    }

    fn get_number(&self, def: &ParamDef) -> Result<Option<f64>> {
        match self.try_get(&def.id()) {
            None => Ok(None),
            Some(value) => value
                .as_number()
                .map(Some)
                .ok_or_else(|| def.type_error("number", &value)),
        }
    }

    fn get_bool(&self, def: &ParamDef) -> Result<Option<bool>> {
        match self.try_get(&def.id()) {
            None => Ok(None),
            Some(value) => value
                .as_bool()
                .map(Some)
                .ok_or_else(|| def.type_error("boolean", &value)),
        }
    }

    fn text_or_default(&self, def: &ParamDef) -> Result<String> {
        if let Some(value) = self.get_text(def)? {
            return Ok(value);
        }
        match def.default {
            ParamDefault::Text(s) => Ok(s.to_string()),
            ParamDefault::Number(n) => Ok(n.to_string()),
            ParamDefault::Bool(b) => Ok(b.to_string()),
            ParamDefault::None => Err(FaceToolsError::Validation {
                field: def.name.to_string(),
                message: "value is required".to_string(),
            }),
        }
    }

    fn number_or_default(&self, def: &ParamDef) -> Result<f64> {
        if let Some(value) = self.get_number(def)? {
            return Ok(value);
        }
        match def.default {
            ParamDefault::Number(n) => Ok(n),
            _ => Err(FaceToolsError::Validation {
                field: def.name.to_string(),
                message: "value is required".to_string(),
            }),
        }
    }

    fn pruning_enabled(&self) -> bool {
        !matches!(self.get_bool(&REMOVE_PARAMS_IF_DEFAULT), Ok(Some(false)))
    }
}

impl<S: ParameterStore + ?Sized> ParamsPruneExt for S {
    fn take_text(&mut self, def: &ParamDef) -> Result<String> {
        let value = self.text_or_default(def)?;
        let is_default = matches!(def.default, ParamDefault::Text(d) if d == value);
        if is_default && self.pruning_enabled() && self.remove(&def.id()) {
            debug!("Removed redundant param '{}' as it was set to the default", def.id());
        }
        Ok(value)
    }

    fn take_number(&mut self, def: &ParamDef) -> Result<f64> {
        let value = self.number_or_default(def)?;
        let is_default = matches!(def.default, ParamDefault::Number(d) if value == d);
        if is_default && self.pruning_enabled() && self.remove(&def.id()) {
            debug!("Removed redundant param '{}' as it was set to the default", def.id());
        }
        Ok(value)
    }
}

/// In-memory parameter set keyed by parameter id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet {
    values: BTreeMap<String, ParamValue>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, value: impl Into<ParamValue>) {
        self.values.insert(id.into(), value.into());
    }

    /// Set a registered parameter by its definition.
    pub fn set(&mut self, def: &ParamDef, value: impl Into<ParamValue>) {
        self.insert(def.id(), value);
    }

    pub fn with(mut self, def: &ParamDef, value: impl Into<ParamValue>) -> Self {
        self.set(def, value);
        self
    }

    pub fn contains(&self, id: &str) -> bool {
        self.values.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.values.iter()
    }
}

impl ParameterStore for ParameterSet {
    fn try_get(&self, id: &str) -> Option<ParamValue> {
        self.values.get(id).cloned()
    }

    fn remove(&mut self, id: &str) -> bool {
        self.values.remove(id).is_some()
    }
}
