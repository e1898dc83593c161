use crate::Result;
use serde::{Deserialize, Serialize};

/// What to do with keys of a retrieved document that the schema does not declare.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtraFields {
    #[default]
    Error,
    Ignore,
}

/// Defaults consulted by sessions and materialization.
///
/// A field descriptor may override `required` and `allow_none`; everything
/// else is read from here.
///
/// | option             | default    |
/// |--------------------|------------|
/// | `namespace`        | `"global"` |
/// | `extra_fields`     | `error`    |
/// | `eager_validation` | `false`    |
/// | `strict`           | `true`     |
/// | `allow_none`       | `false`    |
/// | `required`         | `true`     |
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Database name used when a session connects without an explicit one.
    pub namespace: String,
    pub extra_fields: ExtraFields,
    /// Deserialize the whole entity when an unprojected document is materialized
    /// instead of waiting for field access.
    pub eager_validation: bool,
    /// When `false`, numeric BSON values are coerced between `int32`, `int64`
    /// and `double` if the stored type does not match the field type.
    pub strict: bool,
    pub allow_none: bool,
    pub required: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: "global".into(),
            extra_fields: ExtraFields::Error,
            eager_validation: false,
            strict: true,
            allow_none: false,
            required: true,
        }
    }
}

impl Config {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }
}
