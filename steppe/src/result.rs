use crate::{
    Config, Entity, Error, ExtraFields, Result,
    query::Query,
    schema::{Field, Nested, Schematic},
    session::{Cursor, Session},
};
use log::trace;
use mongodb::bson::{self, Bson, Document};
use serde::de::DeserializeOwned;
use std::{collections::BTreeSet, fmt, marker::PhantomData, sync::Arc};

/// How result documents are handed to the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Output {
    Objects,
    Values,
    Raw,
}

/// Turns raw documents into [`Record`]s. One materializer is shared by
/// iteration, indexed access and find-and-modify.
pub struct Materializer<E> {
    output: Output,
    fields: Option<Arc<BTreeSet<String>>>,
    field_order: Arc<[String]>,
    config: Config,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Schematic> Materializer<E> {
    pub fn new(
        output: Output,
        fields: Option<BTreeSet<String>>,
        field_order: Vec<String>,
        config: Config,
    ) -> Self {
        Self {
            output,
            fields: fields.map(Arc::new),
            field_order: field_order.into(),
            config,
            _entity: PhantomData,
        }
    }

    pub(crate) fn for_query<S: Session>(query: &Query<'_, E, S>) -> Self
    where
        E: Entity,
    {
        let output = if query.is_raw_output() {
            Output::Raw
        } else if query.is_values_only() {
            Output::Values
        } else {
            Output::Objects
        };

        Self::new(
            output,
            query.projection().cloned(),
            query.field_order().to_vec(),
            query.session().config().clone(),
        )
    }

    pub fn output(&self) -> Output {
        self.output
    }

    pub fn materialize(&self, raw: Document) -> Result<Record<E>> {
        match self.output {
            Output::Raw => Ok(Record::Raw(raw)),
            Output::Values => self.values(&raw).map(Record::Values),
            Output::Objects => {
                Loaded::unwrap(raw, self.fields.clone(), &self.config).map(Record::Object)
            }
        }
    }

    fn values(&self, raw: &Document) -> Result<Values> {
        let entries = self
            .field_order
            .iter()
            .map(|path| {
                lookup(raw, path)
                    .map(|value| (path.clone(), value.clone()))
                    .ok_or_else(|| Error::MissingValue(path.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Values {
            entries,
            strict: self.config.strict,
        })
    }
}

impl<E> Clone for Materializer<E> {
    fn clone(&self) -> Self {
        Self {
            output: self.output,
            fields: self.fields.clone(),
            field_order: self.field_order.clone(),
            config: self.config.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E> fmt::Debug for Materializer<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Materializer")
            .field("output", &self.output)
            .field("fields", &self.fields)
            .field("field_order", &self.field_order)
            .finish_non_exhaustive()
    }
}

/// One materialized result.
pub enum Record<E> {
    Object(Loaded<E>),
    Values(Values),
    Raw(Document),
}

impl<E: Schematic> Record<E> {
    /// Reads a field regardless of output mode.
    pub fn get<V: DeserializeOwned>(&self, field: &Field<E, V>) -> Result<V> {
        match self {
            Self::Object(loaded) => loaded.get(field),
            Self::Values(values) => values.get(field),
            Self::Raw(document) => unwrap_at(document, field.path(), true),
        }
    }

    pub fn into_object(self) -> Option<Loaded<E>> {
        match self {
            Self::Object(loaded) => Some(loaded),
            _ => None,
        }
    }

    pub fn into_values(self) -> Option<Values> {
        match self {
            Self::Values(values) => Some(values),
            _ => None,
        }
    }

    pub fn into_raw(self) -> Option<Document> {
        match self {
            Self::Raw(document) => Some(document),
            _ => None,
        }
    }

    /// Underlying document, for objects and raw records.
    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Self::Object(loaded) => Some(loaded.raw()),
            Self::Raw(document) => Some(document),
            Self::Values(_) => None,
        }
    }
}

impl<E> fmt::Debug for Record<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object(loaded) => f.debug_tuple("Object").field(loaded).finish(),
            Self::Values(values) => f.debug_tuple("Values").field(values).finish(),
            Self::Raw(document) => f.debug_tuple("Raw").field(document).finish(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Retrieval {
    Full,
    Partial,
    Excluded,
}

fn is_within(parent: &str, path: &str) -> bool {
    path.len() > parent.len()
        && path.starts_with(parent)
        && path.as_bytes()[parent.len()] == b'.'
}

/// A document of type `E` read from the database, possibly partially.
///
/// Fields are deserialized on access. When the query restricted fields,
/// only retrieved fields can be read.
pub struct Loaded<E> {
    raw: Document,
    retrieved: Option<Arc<BTreeSet<String>>>,
    strict: bool,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Schematic> Loaded<E> {
    /// Validates `raw` against the schema of `E`.
    ///
    /// `retrieved` is the projection the document was fetched with, `None`
    /// for whole documents.
    pub fn unwrap(
        mut raw: Document,
        retrieved: Option<Arc<BTreeSet<String>>>,
        config: &Config,
    ) -> Result<Self> {
        let schema = E::schema();

        let extra = raw
            .keys()
            .filter(|key| *key != "_id" && schema.field_by_db_name(key).is_none())
            .cloned()
            .collect::<Vec<_>>();

        for key in extra {
            match config.extra_fields {
                ExtraFields::Error => {
                    return Err(Error::ExtraValue {
                        document: schema.name(),
                        field: key,
                    });
                }
                ExtraFields::Ignore => {
                    trace!(target: "steppe::result", "ignoring extra field `{key}` on `{}`", schema.name());
                    raw.remove(&key);
                }
            }
        }

        for descriptor in schema.fields() {
            match raw.get(descriptor.db_field) {
                None if retrieved.is_none() && descriptor.is_required(config) => {
                    return Err(Error::MissingValue(descriptor.db_field.to_owned()));
                }
                Some(Bson::Null) if !descriptor.allows_none(config) => {
                    return Err(Error::BadValue {
                        field: descriptor.db_field.to_owned(),
                        reason: "null is not allowed".into(),
                    });
                }
                _ => {}
            }
        }

        if config.eager_validation && retrieved.is_none() {
            bson::from_document::<E>(raw.clone()).map_err(|source| Error::Unwrap {
                field: schema.name().to_owned(),
                source,
            })?;
        }

        Ok(Self {
            raw,
            retrieved,
            strict: config.strict,
            _entity: PhantomData,
        })
    }

    fn retrieval(&self, path: &str) -> Retrieval {
        let Some(retrieved) = &self.retrieved else {
            return Retrieval::Full;
        };

        if retrieved
            .iter()
            .any(|field| field == path || is_within(field, path))
        {
            Retrieval::Full
        } else if retrieved.iter().any(|field| is_within(path, field)) {
            Retrieval::Partial
        } else {
            Retrieval::Excluded
        }
    }

    /// Whether `path` was retrieved in full.
    pub fn is_retrieved(&self, path: &str) -> bool {
        self.retrieval(path) == Retrieval::Full
    }

    pub fn get<V: DeserializeOwned>(&self, field: &Field<E, V>) -> Result<V> {
        self.get_path(field.path())
    }

    /// Reads a value by wire path. Absent values read as `null`, so
    /// `Option` fields come back as `None`.
    pub fn get_path<V: DeserializeOwned>(&self, path: &str) -> Result<V> {
        if !self.is_retrieved(path) {
            return Err(Error::FieldNotRetrieved(path.to_owned()));
        }

        unwrap_at(&self.raw, path, self.strict)
    }

    pub fn id<V: DeserializeOwned>(&self) -> Result<V> {
        unwrap_at(&self.raw, "_id", self.strict)
    }

    pub fn raw(&self) -> &Document {
        &self.raw
    }

    pub fn into_raw(self) -> Document {
        self.raw
    }

    /// Loaded view of an embedded document. The projection is re-rooted so
    /// partial retrieval carries through.
    pub fn embedded<V: Nested>(&self, field: &Field<E, V>) -> Result<Loaded<V::Inner>> {
        let path = field.path();

        let retrieved = match self.retrieval(path) {
            Retrieval::Excluded => return Err(Error::FieldNotRetrieved(path.to_owned())),
            Retrieval::Full => None,
            Retrieval::Partial => self.retrieved.as_ref().map(|fields| {
                let prefix = format!("{path}.");
                Arc::new(
                    fields
                        .iter()
                        .filter_map(|field| field.strip_prefix(&prefix))
                        .map(str::to_owned)
                        .collect(),
                )
            }),
        };

        match lookup(&self.raw, path) {
            Some(Bson::Document(document)) => Ok(Loaded {
                raw: document.clone(),
                retrieved,
                strict: self.strict,
                _entity: PhantomData,
            }),
            None | Some(Bson::Null) => Err(Error::MissingValue(path.to_owned())),
            Some(other) => Err(Error::BadValue {
                field: path.to_owned(),
                reason: format!("expected an embedded document, found {:?}", other.element_type()),
            }),
        }
    }

    /// Deserializes the whole document. Fails if any field was left out by
    /// the projection.
    pub fn into_entity(self) -> Result<E> {
        let schema = E::schema();

        if let Some(missing) = schema
            .fields()
            .iter()
            .find(|descriptor| !self.is_retrieved(descriptor.db_field))
        {
            return Err(Error::FieldNotRetrieved(missing.db_field.to_owned()));
        }

        bson::from_document(self.raw).map_err(|source| Error::Unwrap {
            field: schema.name().to_owned(),
            source,
        })
    }
}

impl<E> Clone for Loaded<E> {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone(),
            retrieved: self.retrieved.clone(),
            strict: self.strict,
            _entity: PhantomData,
        }
    }
}

impl<E> fmt::Debug for Loaded<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loaded")
            .field("raw", &self.raw)
            .field("retrieved", &self.retrieved)
            .finish_non_exhaustive()
    }
}

/// Selected field values in the order they were requested.
#[derive(Clone, Debug, PartialEq)]
pub struct Values {
    entries: Vec<(String, Bson)>,
    strict: bool,
}

impl Values {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn raw(&self, index: usize) -> Option<&Bson> {
        self.entries.get(index).map(|(_, value)| value)
    }

    pub fn at<V: DeserializeOwned>(&self, index: usize) -> Result<V> {
        let (name, value) = self
            .entries
            .get(index)
            .ok_or_else(|| Error::MissingValue(format!("#{index}")))?;

        unwrap_value(name, value.clone(), self.strict)
    }

    pub fn get<D, V: DeserializeOwned>(&self, field: &Field<D, V>) -> Result<V> {
        let (name, value) = self
            .entries
            .iter()
            .find(|(name, _)| name == field.path())
            .ok_or_else(|| Error::FieldNotRetrieved(field.path().to_owned()))?;

        unwrap_value(name, value.clone(), self.strict)
    }

    pub fn into_tuple<T: FromValues>(self) -> Result<T> {
        T::from_values(&self)
    }

    pub fn into_bson(self) -> Vec<Bson> {
        self.entries.into_iter().map(|(_, value)| value).collect()
    }
}

/// Tuples that [`Values`] convert into, element by element.
pub trait FromValues: Sized {
    fn from_values(values: &Values) -> Result<Self>;
}

macro_rules! tuple_from_values {
    ($len:literal => $($name:ident $index:tt),+) => {
        impl<$($name: DeserializeOwned),+> FromValues for ($($name,)+) {
            fn from_values(values: &Values) -> Result<Self> {
                if values.len() != $len {
                    return Err(Error::BadValue {
                        field: "values".into(),
                        reason: format!("expected {} values, found {}", $len, values.len()),
                    });
                }

                Ok(($(values.at::<$name>($index)?,)+))
            }
        }
    };
}

tuple_from_values!(1 => A 0);
tuple_from_values!(2 => A 0, B 1);
tuple_from_values!(3 => A 0, B 1, C 2);
tuple_from_values!(4 => A 0, B 1, C 2, D 3);
tuple_from_values!(5 => A 0, B 1, C 2, D 3, F 4);
tuple_from_values!(6 => A 0, B 1, C 2, D 3, F 4, G 5);
tuple_from_values!(7 => A 0, B 1, C 2, D 3, F 4, G 5, H 6);
tuple_from_values!(8 => A 0, B 1, C 2, D 3, F 4, G 5, H 6, I 7);

/// Value at a dotted path, descending through embedded documents.
pub(crate) fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        match current {
            Bson::Document(inner) => current = inner.get(segment)?,
            _ => return None,
        }
    }

    Some(current)
}

fn unwrap_at<V: DeserializeOwned>(document: &Document, path: &str, strict: bool) -> Result<V> {
    match lookup(document, path) {
        Some(value) => unwrap_value(path, value.clone(), strict),
        None => bson::from_bson(Bson::Null).map_err(|_| Error::MissingValue(path.to_owned())),
    }
}

pub(crate) fn unwrap_value<V: DeserializeOwned>(field: &str, value: Bson, strict: bool) -> Result<V> {
    match bson::from_bson::<V>(value.clone()) {
        Ok(value) => Ok(value),
        Err(source) => {
            if !strict {
                for candidate in coercions(&value) {
                    if let Ok(value) = bson::from_bson(candidate) {
                        return Ok(value);
                    }
                }
            }

            Err(Error::Unwrap {
                field: field.to_owned(),
                source,
            })
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn coercions(value: &Bson) -> Vec<Bson> {
    match value {
        Bson::Double(number)
            if number.fract() == 0.0 && (i64::MIN as f64..i64::MAX as f64).contains(number) =>
        {
            vec![Bson::Int64(*number as i64)]
        }
        Bson::Int32(number) => vec![Bson::Double(f64::from(*number))],
        Bson::Int64(number) => vec![Bson::Double(*number as f64)],
        Bson::String(text) => {
            let mut candidates = Vec::new();
            if let Ok(number) = text.trim().parse::<i64>() {
                candidates.push(Bson::Int64(number));
            }
            if let Ok(number) = text.trim().parse::<f64>() {
                candidates.push(Bson::Double(number));
            }
            candidates
        }
        _ => Vec::new(),
    }
}

/// Materializing iterator over a query's results.
pub struct QueryResult<E, C> {
    cursor: C,
    materializer: Materializer<E>,
}

impl<E: Schematic, C: Cursor> QueryResult<E, C> {
    pub fn new(cursor: C, materializer: Materializer<E>) -> Self {
        Self {
            cursor,
            materializer,
        }
    }

    /// Result at `index`, materialized with the same policy as iteration.
    pub fn get(&self, index: usize) -> Result<Option<Record<E>>> {
        self.cursor
            .get(index)?
            .map(|raw| self.materializer.materialize(raw))
            .transpose()
    }

    pub fn rewind(&mut self) -> &mut Self {
        self.cursor.rewind();
        self
    }

    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            cursor: self.cursor.try_clone()?,
            materializer: self.materializer.clone(),
        })
    }

    pub fn count_documents(&self, with_limit_and_skip: bool) -> Result<u64> {
        self.cursor.count_documents(with_limit_and_skip)
    }

    pub fn distinct(&self, key: &str) -> Result<Vec<Bson>> {
        self.cursor.distinct(key)
    }

    pub fn explain(&self) -> Result<Document> {
        self.cursor.explain()
    }

    pub fn cursor(&self) -> &C {
        &self.cursor
    }
}

impl<E: Schematic, C: Cursor> Iterator for QueryResult<E, C> {
    type Item = Result<Record<E>>;

    fn next(&mut self) -> Option<Self::Item> {
        let raw = self.cursor.next()?;
        Some(raw.and_then(|raw| self.materializer.materialize(raw)))
    }
}
