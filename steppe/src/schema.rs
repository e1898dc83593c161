use crate::{
    Error, Result,
    config::Config,
    expression::{Expression, FilterOperator},
};
use mongodb::bson::{self, Bson};
use serde::{Serialize, de::DeserializeOwned};
use std::{
    borrow::Cow,
    collections::{BTreeSet, HashSet, VecDeque},
    fmt::{self, Display},
    marker::PhantomData,
};

/// A Rust type with a static document schema. Implemented by `#[derive(Entity)]`
/// and `#[derive(Embedded)]`.
pub trait Schematic: Serialize + DeserializeOwned {
    fn schema() -> &'static Schema;
}

/// A top-level document stored in its own collection.
pub trait Entity: Schematic {
    const COLLECTION_NAME: &'static str;

    /// Identity field, always included in projections.
    const ID_FIELD: &'static str = "_id";
}

/// Types whose values are (or contain) embedded documents, so that dotted
/// paths can continue into them.
pub trait Nested {
    type Inner: Schematic;

    fn nested_schema() -> &'static Schema {
        <Self::Inner as Schematic>::schema()
    }
}

impl<T: Nested> Nested for Vec<T> {
    type Inner = T::Inner;
}

impl<T: Nested> Nested for Option<T> {
    type Inner = T::Inner;
}

impl<T: Nested> Nested for Box<T> {
    type Inner = T::Inner;
}

#[derive(Debug)]
pub struct Schema {
    name: &'static str,
    fields: &'static [FieldDescriptor],
}

impl Schema {
    pub const fn new(name: &'static str, fields: &'static [FieldDescriptor]) -> Self {
        Self { name, fields }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Field descriptors in declaration order.
    pub fn fields(&self) -> &'static [FieldDescriptor] {
        self.fields
    }

    /// Looks a field up by its Rust name or its wire name.
    pub fn field(&self, name: &str) -> Option<&'static FieldDescriptor> {
        self.fields
            .iter()
            .find(|field| field.name == name || field.db_field == name)
    }

    pub fn field_by_db_name(&self, db_field: &str) -> Option<&'static FieldDescriptor> {
        self.fields.iter().find(|field| field.db_field == db_field)
    }

    /// Resolves a dotted name (`"t.i"`) to its wire path, walking into
    /// nested schemas segment by segment.
    pub fn resolve(&'static self, name: &str) -> Result<FieldPath> {
        let no_such_field = |document: &'static str| Error::NoSuchField {
            document,
            field: name.to_owned(),
        };

        let mut schema = self;
        let mut segments = Vec::new();
        let mut parts = name.split('.').peekable();

        while let Some(part) = parts.next() {
            let descriptor = schema
                .field(part)
                .ok_or_else(|| no_such_field(schema.name))?;

            segments.push(descriptor.db_field);

            if parts.peek().is_some() {
                schema = descriptor
                    .nested_schema()
                    .ok_or_else(|| no_such_field(schema.name))?;
            }
        }

        Ok(FieldPath::new(segments.join("."), self.name))
    }
}

#[derive(Debug)]
pub struct FieldDescriptor {
    /// Rust field name.
    pub name: &'static str,
    /// Name of the field in stored documents.
    pub db_field: &'static str,
    /// Overrides [`Config::required`].
    pub required: Option<bool>,
    /// Overrides [`Config::allow_none`].
    pub allow_none: Option<bool>,
    pub nested: Option<fn() -> &'static Schema>,
}

impl FieldDescriptor {
    pub fn is_required(&self, config: &Config) -> bool {
        self.required.unwrap_or(config.required)
    }

    pub fn allows_none(&self, config: &Config) -> bool {
        self.allow_none.unwrap_or(config.allow_none)
    }

    pub fn nested_schema(&self) -> Option<&'static Schema> {
        self.nested.map(|schema| schema())
    }
}

/// Typed handle to a field of `D` holding values of type `V`.
///
/// Generated by the derive macros as `pub fn <field>()` inside the helper
/// module of each document type.
pub struct Field<D, V> {
    path: Cow<'static, str>,
    _marker: PhantomData<fn() -> (D, V)>,
}

impl<D, V> Field<D, V> {
    pub const fn new(path: &'static str) -> Self {
        Self {
            path: Cow::Borrowed(path),
            _marker: PhantomData,
        }
    }

    /// Wire path, dotted for nested fields.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn parent_path(&self) -> Option<&str> {
        self.path.rsplit_once('.').map(|(parent, _)| parent)
    }

    pub fn exists(&self, exists: bool) -> Expression {
        Expression::compare(self.path(), FilterOperator::Exists(exists))
    }
}

impl<D: Schematic, V> Field<D, V> {
    pub fn to_path(&self) -> FieldPath {
        FieldPath::new(self.path.clone().into_owned(), D::schema().name())
    }
}

impl<D: Schematic, V: Nested> Field<D, V> {
    /// Continues the path into an embedded document: `t2::t().then(&t::i())`.
    pub fn then<W>(&self, child: &Field<V::Inner, W>) -> Field<D, W> {
        Field {
            path: Cow::Owned(format!("{}.{}", self.path, child.path)),
            _marker: PhantomData,
        }
    }
}

impl<D: Schematic, V: Serialize> Field<D, V> {
    pub fn wrap(&self, value: &V) -> Result<Bson> {
        bson::to_bson(value).map_err(|source| Error::Wrap {
            field: self.path.to_string(),
            source,
        })
    }

    pub fn eq(&self, value: impl Into<V>) -> Result<Expression> {
        Ok(Expression::equals(self.path(), self.wrap(&value.into())?))
    }

    pub fn ne(&self, value: impl Into<V>) -> Result<Expression> {
        self.compare(value, FilterOperator::Ne)
    }

    pub fn lt(&self, value: impl Into<V>) -> Result<Expression> {
        self.compare(value, FilterOperator::Lt)
    }

    pub fn lte(&self, value: impl Into<V>) -> Result<Expression> {
        self.compare(value, FilterOperator::Lte)
    }

    pub fn gt(&self, value: impl Into<V>) -> Result<Expression> {
        self.compare(value, FilterOperator::Gt)
    }

    pub fn gte(&self, value: impl Into<V>) -> Result<Expression> {
        self.compare(value, FilterOperator::Gte)
    }

    pub fn in_(&self, values: impl IntoIterator<Item = impl Into<V>>) -> Result<Expression> {
        Ok(Expression::compare(
            self.path(),
            FilterOperator::In(self.wrap_all(values)?),
        ))
    }

    pub fn nin(&self, values: impl IntoIterator<Item = impl Into<V>>) -> Result<Expression> {
        Ok(Expression::compare(
            self.path(),
            FilterOperator::Nin(self.wrap_all(values)?),
        ))
    }

    fn compare(
        &self,
        value: impl Into<V>,
        operator: fn(Bson) -> FilterOperator,
    ) -> Result<Expression> {
        let value = self.wrap(&value.into())?;
        Ok(Expression::compare(self.path(), operator(value)))
    }

    fn wrap_all(&self, values: impl IntoIterator<Item = impl Into<V>>) -> Result<Vec<Bson>> {
        values
            .into_iter()
            .map(|value| self.wrap(&value.into()))
            .collect()
    }
}

impl<D, V> Clone for Field<D, V> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            _marker: PhantomData,
        }
    }
}

impl<D, V> fmt::Debug for Field<D, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Field").field(&self.path).finish()
    }
}

impl<D, V> Display for Field<D, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

impl<D: Schematic, V> From<Field<D, V>> for FieldPath {
    fn from(value: Field<D, V>) -> Self {
        value.to_path()
    }
}

/// Untyped, already resolved field: wire path plus the name of the owning
/// document type. Values are passed through as BSON.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldPath {
    path: String,
    owner: &'static str,
}

impl FieldPath {
    pub fn new(path: impl Into<String>, owner: &'static str) -> Self {
        Self {
            path: path.into(),
            owner,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn owner(&self) -> &'static str {
        self.owner
    }

    pub fn parent_path(&self) -> Option<&str> {
        self.path.rsplit_once('.').map(|(parent, _)| parent)
    }

    pub fn into_path(self) -> String {
        self.path
    }

    pub fn eq(&self, value: impl Into<Bson>) -> Expression {
        Expression::equals(self.path(), value.into())
    }

    pub fn ne(&self, value: impl Into<Bson>) -> Expression {
        Expression::compare(self.path(), FilterOperator::Ne(value.into()))
    }

    pub fn lt(&self, value: impl Into<Bson>) -> Expression {
        Expression::compare(self.path(), FilterOperator::Lt(value.into()))
    }

    pub fn lte(&self, value: impl Into<Bson>) -> Expression {
        Expression::compare(self.path(), FilterOperator::Lte(value.into()))
    }

    pub fn gt(&self, value: impl Into<Bson>) -> Expression {
        Expression::compare(self.path(), FilterOperator::Gt(value.into()))
    }

    pub fn gte(&self, value: impl Into<Bson>) -> Expression {
        Expression::compare(self.path(), FilterOperator::Gte(value.into()))
    }

    pub fn in_(&self, values: impl IntoIterator<Item = impl Into<Bson>>) -> Expression {
        let values = values.into_iter().map(Into::into).collect();
        Expression::compare(self.path(), FilterOperator::In(values))
    }

    pub fn nin(&self, values: impl IntoIterator<Item = impl Into<Bson>>) -> Expression {
        let values = values.into_iter().map(Into::into).collect();
        Expression::compare(self.path(), FilterOperator::Nin(values))
    }

    pub fn exists(&self, exists: bool) -> Expression {
        Expression::compare(self.path(), FilterOperator::Exists(exists))
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

/// Resolves a name against `D`. Operator keys (`$or`, ...) pass through.
pub(crate) fn resolve_name<D: Schematic>(name: &str) -> Result<String> {
    if name.starts_with('$') {
        return Ok(name.to_owned());
    }

    D::schema().resolve(name).map(FieldPath::into_path)
}

/// Anything a builder accepts in field position: typed handles, resolved
/// paths and plain (possibly dotted) names.
pub trait QueryField<D: Schematic> {
    type Value;

    fn resolve(&self) -> Result<String>;

    fn wrap_value(&self, value: Self::Value) -> Result<Bson>;
}

/// A [`QueryField`] holding an array, for `$push`, `$pull` and friends.
pub trait ArrayField<D: Schematic>: QueryField<D> {
    type Item;

    fn wrap_item(&self, item: Self::Item) -> Result<Bson>;
}

/// Collection types stored as BSON arrays.
pub trait Sequence {
    type Item: Serialize;
}

impl<T: Serialize> Sequence for Vec<T> {
    type Item = T;
}

impl<T: Serialize> Sequence for VecDeque<T> {
    type Item = T;
}

impl<T: Serialize> Sequence for BTreeSet<T> {
    type Item = T;
}

impl<T: Serialize, S> Sequence for HashSet<T, S> {
    type Item = T;
}

impl<S: Sequence> Sequence for Option<S> {
    type Item = S::Item;
}

fn wrap_item<T: Serialize>(path: &str, item: &T) -> Result<Bson> {
    bson::to_bson(item).map_err(|source| Error::Wrap {
        field: path.to_owned(),
        source,
    })
}

impl<D: Schematic, V: Serialize> QueryField<D> for Field<D, V> {
    type Value = V;

    fn resolve(&self) -> Result<String> {
        Ok(self.path.clone().into_owned())
    }

    fn wrap_value(&self, value: V) -> Result<Bson> {
        self.wrap(&value)
    }
}

impl<D: Schematic, V: Serialize> QueryField<D> for &Field<D, V> {
    type Value = V;

    fn resolve(&self) -> Result<String> {
        Ok(self.path.clone().into_owned())
    }

    fn wrap_value(&self, value: V) -> Result<Bson> {
        self.wrap(&value)
    }
}

impl<D: Schematic, V: Serialize + Sequence> ArrayField<D> for Field<D, V> {
    type Item = V::Item;

    fn wrap_item(&self, item: V::Item) -> Result<Bson> {
        wrap_item(self.path(), &item)
    }
}

impl<D: Schematic, V: Serialize + Sequence> ArrayField<D> for &Field<D, V> {
    type Item = V::Item;

    fn wrap_item(&self, item: V::Item) -> Result<Bson> {
        wrap_item(self.path(), &item)
    }
}

impl<D: Schematic> QueryField<D> for &str {
    type Value = Bson;

    fn resolve(&self) -> Result<String> {
        resolve_name::<D>(self)
    }

    fn wrap_value(&self, value: Bson) -> Result<Bson> {
        Ok(value)
    }
}

impl<D: Schematic> ArrayField<D> for &str {
    type Item = Bson;

    fn wrap_item(&self, item: Bson) -> Result<Bson> {
        Ok(item)
    }
}

impl<D: Schematic> QueryField<D> for String {
    type Value = Bson;

    fn resolve(&self) -> Result<String> {
        resolve_name::<D>(self)
    }

    fn wrap_value(&self, value: Bson) -> Result<Bson> {
        Ok(value)
    }
}

impl<D: Schematic> ArrayField<D> for String {
    type Item = Bson;

    fn wrap_item(&self, item: Bson) -> Result<Bson> {
        Ok(item)
    }
}

fn check_owner<D: Schematic>(path: &FieldPath) -> Result<String> {
    if path.path.starts_with('$') || path.owner == D::schema().name() {
        Ok(path.path.clone())
    } else {
        Err(Error::NoSuchField {
            document: D::schema().name(),
            field: path.path.clone(),
        })
    }
}

impl<D: Schematic> QueryField<D> for FieldPath {
    type Value = Bson;

    fn resolve(&self) -> Result<String> {
        check_owner::<D>(self)
    }

    fn wrap_value(&self, value: Bson) -> Result<Bson> {
        Ok(value)
    }
}

impl<D: Schematic> QueryField<D> for &FieldPath {
    type Value = Bson;

    fn resolve(&self) -> Result<String> {
        check_owner::<D>(self)
    }

    fn wrap_value(&self, value: Bson) -> Result<Bson> {
        Ok(value)
    }
}

impl<D: Schematic> ArrayField<D> for FieldPath {
    type Item = Bson;

    fn wrap_item(&self, item: Bson) -> Result<Bson> {
        Ok(item)
    }
}

impl<D: Schematic> ArrayField<D> for &FieldPath {
    type Item = Bson;

    fn wrap_item(&self, item: Bson) -> Result<Bson> {
        Ok(item)
    }
}
