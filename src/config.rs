use crate::error::ConfigError;
use derive_more::Display;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_yaml::Value as Yaml;
use std::{fmt, path::Path};
use tracing::debug;

/// The declared type of a configuration variable.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Display, Serialize, Deserialize)]
pub enum ConfigValueKind {
    #[display("bool")]
    Bool,
    #[display("int")]
    Int,
    #[display("float")]
    Float,
    #[display("string")]
    Str,
}

/// A configuration value.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ConfigValue {
    pub fn kind(&self) -> ConfigValueKind {
        match self {
            ConfigValue::Bool(_) => ConfigValueKind::Bool,
            ConfigValue::Int(_) => ConfigValueKind::Int,
            ConfigValue::Float(_) => ConfigValueKind::Float,
            ConfigValue::Str(_) => ConfigValueKind::Str,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ConfigValue::Float(v) => Some(*v),
            ConfigValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::Str(v) => Some(v),
            _ => None,
        }
    }

    fn from_yaml(yaml: &Yaml) -> Option<Self> {
        match yaml {
            Yaml::Bool(v) => Some(ConfigValue::Bool(*v)),
            Yaml::Number(n) => {
                if let Some(v) = n.as_i64() {
                    Some(ConfigValue::Int(v))
                } else {
                    n.as_f64().map(ConfigValue::Float)
                }
            }
            Yaml::String(s) => Some(ConfigValue::Str(s.clone())),
            _ => None,
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(v: bool) -> Self {
        ConfigValue::Bool(v)
    }
}

impl From<i64> for ConfigValue {
    fn from(v: i64) -> Self {
        ConfigValue::Int(v)
    }
}

impl From<i32> for ConfigValue {
    fn from(v: i32) -> Self {
        ConfigValue::Int(v.into())
    }
}

impl From<f64> for ConfigValue {
    fn from(v: f64) -> Self {
        ConfigValue::Float(v)
    }
}

impl From<&str> for ConfigValue {
    fn from(v: &str) -> Self {
        ConfigValue::Str(v.to_owned())
    }
}

impl From<String> for ConfigValue {
    fn from(v: String) -> Self {
        ConfigValue::Str(v)
    }
}

/// A single-argument predicate a variable's values must satisfy.
pub type Constraint = Box<dyn Fn(&ConfigValue) -> bool + Send + Sync>;

/// One typed variable in the configuration tree.
pub struct ConfigVar {
    name: String,
    description: Option<String>,
    kind: Option<ConfigValueKind>,
    default: Option<ConfigValue>,
    constraint: Option<Constraint>,
    value: Option<ConfigValue>,
}

impl ConfigVar {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            description: None,
            kind: None,
            default: None,
            constraint: None,
            value: None,
        }
    }

    pub fn described(mut self, description: &str) -> Self {
        self.description = Some(description.to_owned());
        self
    }

    pub fn typed(mut self, kind: ConfigValueKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_default(mut self, default: impl Into<ConfigValue>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_constraint(
        mut self,
        constraint: impl Fn(&ConfigValue) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.constraint = Some(Box::new(constraint));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn default(&self) -> Option<&ConfigValue> {
        self.default.as_ref()
    }

    /// The current value, falling back to the default when none was loaded.
    pub fn value(&self) -> Option<&ConfigValue> {
        self.value.as_ref().or(self.default.as_ref())
    }

    /// Sets the current value after checking the declared type and
    /// constraint.
    pub fn set(&mut self, value: impl Into<ConfigValue>) -> Result<(), ConfigError> {
        let value = value.into();
        self.validate(&value, &self.name)?;
        self.value = Some(value);
        Ok(())
    }

    fn validate(&self, value: &ConfigValue, path: &str) -> Result<(), ConfigError> {
        if let Some(kind) = self.kind {
            if value.kind() != kind {
                return Err(ConfigError::InvalidData {
                    path: path.to_owned(),
                    reason: format!("expected {kind}, got {}", value.kind()),
                });
            }
        }
        if let Some(constraint) = self.constraint.as_ref() {
            if !constraint(value) {
                return Err(ConfigError::InvalidData {
                    path: path.to_owned(),
                    reason: "constraint not met".to_owned(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ConfigVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigVar")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("default", &self.default)
            .field("value", &self.value)
            .finish()
    }
}

/// A category node in the configuration tree: named variables plus child
/// categories, addressed by slash- or dot-separated paths.
#[derive(Debug, Default)]
pub struct ConfigCategory {
    name: Option<String>,
    description: Option<String>,
    categories: Vec<ConfigCategory>,
    vars: Vec<ConfigVar>,
}

/// The root of a configuration tree.
pub type Config = ConfigCategory;

impl ConfigCategory {
    /// Creates an unnamed root category.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn described(mut self, description: &str) -> Self {
        self.description = Some(description.to_owned());
        self
    }

    /// Defines a new child category and returns it for population.
    pub fn define_category(&mut self, name: &str) -> &mut ConfigCategory {
        self.categories.push(ConfigCategory {
            name: Some(name.to_owned()),
            description: None,
            categories: Vec::new(),
            vars: Vec::new(),
        });
        self.categories.last_mut().unwrap() // SAFETY: just pushed
    }

    /// Adds a variable, validating its default against the declared type and
    /// constraint.
    pub fn add_var(&mut self, var: ConfigVar) -> Result<&mut ConfigVar, ConfigError> {
        if var.name.is_empty() {
            return Err(ConfigError::InvalidDefinition);
        }
        if let (Some(default), Some(kind)) = (var.default.as_ref(), var.kind) {
            if default.kind() != kind {
                return Err(ConfigError::InvalidDataType {
                    path: var.name.clone(),
                    expected: match kind {
                        ConfigValueKind::Bool => "bool",
                        ConfigValueKind::Int => "int",
                        ConfigValueKind::Float => "float",
                        ConfigValueKind::Str => "string",
                    },
                });
            }
        }
        if let (Some(default), Some(constraint)) = (var.default.as_ref(), var.constraint.as_ref())
        {
            if !constraint(default) {
                return Err(ConfigError::InvalidData {
                    path: var.name.clone(),
                    reason: "default does not meet the constraint".to_owned(),
                });
            }
        }
        self.vars.push(var);
        Ok(self.vars.last_mut().unwrap()) // SAFETY: just pushed
    }

    pub fn category(&self, name: &str) -> Option<&ConfigCategory> {
        self.categories
            .iter()
            .find(|c| c.name.as_deref() == Some(name))
    }

    pub fn var(&self, name: &str) -> Option<&ConfigVar> {
        self.vars.iter().find(|v| v.name == name)
    }

    /// Finds the value of a variable by a path relative to this category.
    ///
    /// Example: `group-a/group-b/var-4` (dots work as separators too).
    pub fn get(&self, path: &str) -> Result<&ConfigValue, ConfigError> {
        let mut segments: Vec<&str> = split_path(path);
        let var_name = segments.pop().ok_or_else(|| invalid_path(path))?;

        let mut category = self;
        for segment in segments {
            category = category
                .category(segment)
                .ok_or_else(|| invalid_path(path))?;
        }
        let var = category.var(var_name).ok_or_else(|| invalid_path(path))?;
        var.value()
            .ok_or_else(|| ConfigError::MissingData(vec![path.to_owned()]))
    }

    /// Sets the value of a variable by a path relative to this category.
    pub fn set(&mut self, path: &str, value: impl Into<ConfigValue>) -> Result<(), ConfigError> {
        let mut segments: Vec<&str> = split_path(path);
        let var_name = segments.pop().ok_or_else(|| invalid_path(path))?;

        let mut category = self;
        for segment in segments {
            category = category
                .categories
                .iter_mut()
                .find(|c| c.name.as_deref() == Some(segment))
                .ok_or_else(|| invalid_path(path))?;
        }
        let var = category
            .vars
            .iter_mut()
            .find(|v| v.name == var_name)
            .ok_or_else(|| invalid_path(path))?;
        let full_path = path.to_owned();
        let value = value.into();
        var.validate(&value, &full_path)?;
        var.value = Some(value);
        Ok(())
    }

    /// Loads variable values from a YAML document. Variables absent from the
    /// document and carrying no default are reported as missing.
    pub fn load_yaml_str(&mut self, data: &str) -> Result<(), ConfigError> {
        let yaml: Yaml = serde_yaml::from_str(data)?;
        let mapping = match &yaml {
            Yaml::Mapping(mapping) => mapping,
            _ => {
                return Err(ConfigError::InvalidData {
                    path: "<root>".to_owned(),
                    reason: "config data must be a mapping".to_owned(),
                })
            }
        };

        let mut missing = Vec::new();
        self.load_mapping(mapping, "", &mut missing)?;
        if !missing.is_empty() {
            return Err(ConfigError::MissingData(
                missing.into_iter().sorted().collect(),
            ));
        }
        debug!("Loaded config data");
        Ok(())
    }

    /// Loads variable values from a YAML file.
    pub fn load_yaml_file(&mut self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let data = std::fs::read_to_string(path)?;
        self.load_yaml_str(&data)
    }

    fn load_mapping(
        &mut self,
        mapping: &serde_yaml::Mapping,
        prefix: &str,
        missing: &mut Vec<String>,
    ) -> Result<(), ConfigError> {
        for var in self.vars.iter_mut() {
            let path = join_path(prefix, &var.name);
            match mapping.get(&Yaml::String(var.name.clone())) {
                Some(entry) => {
                    let value = ConfigValue::from_yaml(entry).ok_or_else(|| {
                        ConfigError::InvalidData {
                            path: path.clone(),
                            reason: "unsupported value type".to_owned(),
                        }
                    })?;
                    var.validate(&value, &path)?;
                    var.value = Some(value);
                }
                None => {
                    if var.default.is_none() {
                        missing.push(path);
                    }
                }
            }
        }

        for category in self.categories.iter_mut() {
            let name = category.name.clone().ok_or(ConfigError::InvalidDefinition)?;
            let path = join_path(prefix, &name);
            match mapping.get(&Yaml::String(name)) {
                Some(Yaml::Mapping(child)) => {
                    category.load_mapping(child, &path, missing)?;
                }
                _ => {
                    // The whole category is absent; report every defaultless
                    // variable beneath it.
                    category.collect_missing(&path, missing);
                }
            }
        }
        Ok(())
    }

    fn collect_missing(&self, prefix: &str, missing: &mut Vec<String>) {
        for var in &self.vars {
            if var.default.is_none() && var.value.is_none() {
                missing.push(join_path(prefix, &var.name));
            }
        }
        for category in &self.categories {
            if let Some(name) = category.name.as_deref() {
                category.collect_missing(&join_path(prefix, name), missing);
            }
        }
    }
}

fn split_path(path: &str) -> Vec<&str> {
    path.split(['/', '.'])
        .filter(|s| !s.is_empty())
        .collect()
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_owned()
    } else {
        format!("{prefix}/{name}")
    }
}

fn invalid_path(path: &str) -> ConfigError {
    ConfigError::InvalidPath(path.to_owned())
}
