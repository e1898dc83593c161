use mongodb::bson;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no field `{field}` on `{document}`")]
    NoSuchField {
        document: &'static str,
        field: String,
    },

    #[error("no document type named `{0}` is registered")]
    NoSuchDocument(String),

    #[error("already sorting by `{0}`")]
    DuplicateSort(String),

    #[error("already gave hint for `{0}`")]
    DuplicateHint(String),

    #[error("multiple assignments to `{0}` must all be mappings")]
    MixedAssignment(String),

    #[error("conflicting modifiers on `{field}`: `{existing}` is already applied, cannot apply `{requested}`")]
    ConflictingModifier {
        field: String,
        existing: &'static str,
        requested: &'static str,
    },

    #[error("find and modify with `remove` cannot also apply modifiers")]
    RemoveWithModifiers,

    #[error("too few results for .one()")]
    NoResultFound,

    #[error("too many results for .one()")]
    MultipleResultsFound,

    #[error("field `{0}` was not retrieved")]
    FieldNotRetrieved(String),

    #[error("missing value for `{0}`")]
    MissingValue(String),

    #[error("unexpected field `{field}` on `{document}`")]
    ExtraValue {
        document: &'static str,
        field: String,
    },

    #[error("bad value for `{field}`: {reason}")]
    BadValue { field: String, reason: String },

    #[error("cannot convert value of `{field}` to BSON")]
    Wrap {
        field: String,
        #[source]
        source: bson::ser::Error,
    },

    #[error("cannot convert BSON of `{field}`")]
    Unwrap {
        field: String,
        #[source]
        source: bson::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error(transparent)]
    Driver(#[from] mongodb::error::Error),

    #[error(transparent)]
    Session(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Errors raised by a builder call, before anything reaches the session.
    pub fn is_construction(&self) -> bool {
        matches!(
            self,
            Self::NoSuchField { .. }
                | Self::NoSuchDocument(_)
                | Self::DuplicateSort(_)
                | Self::DuplicateHint(_)
                | Self::MixedAssignment(_)
                | Self::ConflictingModifier { .. }
                | Self::RemoveWithModifiers
                | Self::Wrap { .. }
        )
    }

    pub fn is_cardinality(&self) -> bool {
        matches!(self, Self::NoResultFound | Self::MultipleResultsFound)
    }
}
