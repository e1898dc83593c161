use crate::{
    Entity, Error, Result,
    expression::{Expression, FilterOperator, merge_predicates},
    result::{Materializer, QueryResult, Record},
    schema::{ArrayField, FieldPath, QueryField, Schematic, resolve_name},
    session::{FindCommand, Session},
    update::{FindAndModify, Modify, UpdateExpression},
};
use log::debug;
use mongodb::bson::{Bson, Document};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt, marker::PhantomData};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    pub fn to_bson(self) -> Bson {
        match self {
            Self::Asc => Bson::Int32(1),
            Self::Desc => Bson::Int32(-1),
        }
    }
}

/// A find query over the collection of `E`.
///
/// Builder methods mutate in place and return `&mut Self` for chaining;
/// a failing call leaves the query unchanged. Nothing is sent to the
/// session until a terminal method (`all`, `one`, `count`, ...) runs, so a
/// query can be cloned and extended freely.
pub struct Query<'s, E, S> {
    session: &'s S,
    filter: Document,
    sort: Vec<(String, Order)>,
    fields: Option<BTreeSet<String>>,
    field_order: Vec<String>,
    values_only: bool,
    hints: Vec<(String, Order)>,
    limit: Option<i64>,
    skip: Option<u64>,
    raw_output: bool,
    _entity: PhantomData<fn() -> E>,
}

impl<'s, E: Entity, S: Session> Query<'s, E, S> {
    pub fn new(session: &'s S) -> Self {
        Self {
            session,
            filter: Document::new(),
            sort: Vec::new(),
            fields: None,
            field_order: Vec::new(),
            values_only: false,
            hints: Vec::new(),
            limit: None,
            skip: None,
            raw_output: false,
            _entity: PhantomData,
        }
    }

    pub fn session(&self) -> &'s S {
        self.session
    }

    /// Resolves a (possibly dotted) field name against `E`.
    pub fn resolve(&self, name: &str) -> Result<FieldPath> {
        if name.starts_with('$') {
            return Ok(FieldPath::new(name, E::schema().name()));
        }

        E::schema().resolve(name)
    }

    pub fn query_document(&self) -> Document {
        self.filter.clone()
    }

    pub fn sort_keys(&self) -> &[(String, Order)] {
        &self.sort
    }

    pub fn hints(&self) -> &[(String, Order)] {
        &self.hints
    }

    /// Projected wire paths, `None` when whole documents are retrieved.
    pub fn projection(&self) -> Option<&BTreeSet<String>> {
        self.fields.as_ref()
    }

    /// Selected paths in the order they were first requested.
    pub fn field_order(&self) -> &[String] {
        &self.field_order
    }

    pub fn is_values_only(&self) -> bool {
        self.values_only
    }

    pub fn is_raw_output(&self) -> bool {
        self.raw_output
    }

    pub fn command(&self) -> FindCommand {
        FindCommand {
            collection: E::COLLECTION_NAME,
            filter: self.query_document(),
            sort: self.sort.clone(),
            projection: self
                .fields
                .as_ref()
                .map(|fields| fields.iter().cloned().collect()),
            limit: self.limit,
            skip: self.skip,
            hints: self.hints.clone(),
        }
    }

    /// Results are returned as raw documents, overriding every other output
    /// mode.
    pub fn raw_output(&mut self) -> &mut Self {
        self.raw_output = true;
        self
    }

    pub fn limit(&mut self, limit: i64) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(&mut self, skip: u64) -> &mut Self {
        self.skip = Some(skip);
        self
    }

    pub fn ascending<F: QueryField<E>>(&mut self, field: F) -> Result<&mut Self> {
        self.push_sort(field.resolve()?, Order::Asc)
    }

    pub fn descending<F: QueryField<E>>(&mut self, field: F) -> Result<&mut Self> {
        self.push_sort(field.resolve()?, Order::Desc)
    }

    fn push_sort(&mut self, path: String, order: Order) -> Result<&mut Self> {
        if self.sort.iter().any(|(existing, _)| *existing == path) {
            return Err(Error::DuplicateSort(path));
        }

        self.sort.push((path, order));
        Ok(self)
    }

    pub fn hint_asc<F: QueryField<E>>(&mut self, field: F) -> Result<&mut Self> {
        self.push_hint(field.resolve()?, Order::Asc)
    }

    pub fn hint_desc<F: QueryField<E>>(&mut self, field: F) -> Result<&mut Self> {
        self.push_hint(field.resolve()?, Order::Desc)
    }

    fn push_hint(&mut self, path: String, order: Order) -> Result<&mut Self> {
        if self.hints.iter().any(|(existing, _)| *existing == path) {
            return Err(Error::DuplicateHint(path));
        }

        self.hints.push((path, order));
        Ok(self)
    }

    /// Restricts retrieval to the given fields. The identity field is
    /// always retrieved. Repeated calls accumulate.
    pub fn fields<F: QueryField<E>>(
        &mut self,
        fields: impl IntoIterator<Item = F>,
    ) -> Result<&mut Self> {
        let paths = fields
            .into_iter()
            .map(|field| field.resolve())
            .collect::<Result<Vec<_>>>()?;

        let projection = self.fields.get_or_insert_with(BTreeSet::new);

        for path in paths {
            if !self.field_order.contains(&path) {
                self.field_order.push(path.clone());
            }
            projection.insert(path);
        }

        projection.insert(E::ID_FIELD.to_owned());

        Ok(self)
    }

    /// Like [`Query::fields`], but results come back as [`crate::Values`]
    /// in the requested order instead of objects.
    pub fn values_only<F: QueryField<E>>(
        &mut self,
        fields: impl IntoIterator<Item = F>,
    ) -> Result<&mut Self> {
        self.fields(fields)?;
        self.values_only = true;
        Ok(self)
    }

    fn apply(&mut self, document: Document) -> Result<()> {
        let mut merged = self.filter.clone();
        merge_predicates(&mut merged, document)?;
        self.filter = merged;
        Ok(())
    }

    /// Conjoins `expression` with the current filter.
    pub fn filter(&mut self, expression: Expression) -> Result<&mut Self> {
        self.apply(expression.flatten())?;
        Ok(self)
    }

    /// Conjoins a raw filter document. Field names are resolved, so Rust
    /// names and dotted paths work; operator keys pass through.
    pub fn filter_raw(&mut self, document: Document) -> Result<&mut Self> {
        let mut staged = Document::new();

        for (key, value) in document {
            let path = resolve_name::<E>(&key)?;
            merge_predicates(&mut staged, Expression::equals(path, value).flatten())?;
        }

        self.apply(staged)?;
        Ok(self)
    }

    /// Equality on top-level fields, by name.
    pub fn filter_by<K: AsRef<str>, V: Into<Bson>>(
        &mut self,
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Result<&mut Self> {
        let mut staged = Document::new();

        for (name, value) in pairs {
            let name = name.as_ref();

            if name.starts_with('$') || name.contains('.') {
                return Err(Error::NoSuchField {
                    document: E::schema().name(),
                    field: name.to_owned(),
                });
            }

            let path = E::schema().resolve(name)?;
            merge_predicates(&mut staged, path.eq(value).flatten())?;
        }

        self.apply(staged)?;
        Ok(self)
    }

    /// Conjoins the negation of each expression.
    pub fn not_(&mut self, expressions: impl IntoIterator<Item = Expression>) -> Result<&mut Self> {
        let mut staged = Document::new();

        for expression in expressions {
            merge_predicates(&mut staged, expression.not_().flatten())?;
        }

        self.apply(staged)?;
        Ok(self)
    }

    /// Conjoins the disjunction of the expressions. No expressions, no change.
    pub fn or_(&mut self, expressions: impl IntoIterator<Item = Expression>) -> Result<&mut Self> {
        let mut expressions = expressions.into_iter();

        let Some(first) = expressions.next() else {
            return Ok(self);
        };

        self.filter(expressions.fold(first, Expression::or_with))
    }

    pub fn in_<F: QueryField<E>>(
        &mut self,
        field: F,
        values: impl IntoIterator<Item = impl Into<F::Value>>,
    ) -> Result<&mut Self> {
        let path = field.resolve()?;
        let values = wrap_all(&field, values)?;
        self.filter(Expression::compare(path, FilterOperator::In(values)))
    }

    pub fn nin<F: QueryField<E>>(
        &mut self,
        field: F,
        values: impl IntoIterator<Item = impl Into<F::Value>>,
    ) -> Result<&mut Self> {
        let path = field.resolve()?;
        let values = wrap_all(&field, values)?;
        self.filter(Expression::compare(path, FilterOperator::Nin(values)))
    }

    /// Runs the query.
    pub fn iter(&self) -> Result<QueryResult<E, S::Cursor>> {
        let command = self.command();

        debug!(
            target: "steppe::query",
            "find on `{}`: {} (sort: {:?}, limit: {:?}, skip: {:?})",
            command.collection, command.filter, command.sort, command.limit, command.skip
        );

        let cursor = self.session.execute_query(&command)?;
        Ok(QueryResult::new(cursor, Materializer::for_query(self)))
    }

    /// The single matching result.
    pub fn one(&self) -> Result<Record<E>> {
        let mut results = self.iter()?;

        let Some(first) = results.next() else {
            return Err(Error::NoResultFound);
        };

        if results.next().is_some() {
            return Err(Error::MultipleResultsFound);
        }

        first
    }

    pub fn first(&self) -> Result<Option<Record<E>>> {
        self.iter()?.next().transpose()
    }

    pub fn all(&self) -> Result<Vec<Record<E>>> {
        self.iter()?.collect()
    }

    pub fn count(&self, with_limit_and_skip: bool) -> Result<u64> {
        self.iter()?.count_documents(with_limit_and_skip)
    }

    pub fn distinct<F: QueryField<E>>(&self, field: F) -> Result<Vec<Bson>> {
        let path = field.resolve()?;
        self.iter()?.distinct(&path)
    }

    pub fn explain(&self) -> Result<Document> {
        self.iter()?.explain()
    }

    /// Result at `index` after skip, or `None` past the end.
    pub fn get(&self, index: usize) -> Result<Option<Record<E>>> {
        self.iter()?.get(index)
    }

    /// Find-and-modify over a snapshot of this query. With `remove` the
    /// matched document is deleted and no modifiers may be recorded.
    pub fn find_and_modify(&self, new: bool, remove: bool) -> FindAndModify<'s, E, S> {
        FindAndModify::new(self.clone(), new, remove)
    }

    /// Empty update over a snapshot of this query.
    pub fn update(&self) -> UpdateExpression<'s, E, S> {
        UpdateExpression::new(self.clone())
    }

    pub fn set<F: QueryField<E>>(
        &self,
        field: F,
        value: impl Into<F::Value>,
    ) -> Result<UpdateExpression<'s, E, S>> {
        let mut update = self.update();
        update.set(field, value)?;
        Ok(update)
    }

    pub fn unset<F: QueryField<E>>(&self, field: F) -> Result<UpdateExpression<'s, E, S>> {
        let mut update = self.update();
        update.unset(field)?;
        Ok(update)
    }

    pub fn inc<F: QueryField<E>>(
        &self,
        field: F,
        amount: impl Into<F::Value>,
    ) -> Result<UpdateExpression<'s, E, S>> {
        let mut update = self.update();
        update.inc(field, amount)?;
        Ok(update)
    }

    pub fn append<F: ArrayField<E>>(
        &self,
        field: F,
        item: impl Into<F::Item>,
    ) -> Result<UpdateExpression<'s, E, S>> {
        let mut update = self.update();
        update.append(field, item)?;
        Ok(update)
    }

    pub fn extend<F: ArrayField<E>>(
        &self,
        field: F,
        items: impl IntoIterator<Item = impl Into<F::Item>>,
    ) -> Result<UpdateExpression<'s, E, S>> {
        let mut update = self.update();
        update.extend(field, items)?;
        Ok(update)
    }

    pub fn remove<F: ArrayField<E>>(
        &self,
        field: F,
        item: impl Into<F::Item>,
    ) -> Result<UpdateExpression<'s, E, S>> {
        let mut update = self.update();
        update.remove(field, item)?;
        Ok(update)
    }

    pub fn remove_all<F: ArrayField<E>>(
        &self,
        field: F,
        items: impl IntoIterator<Item = impl Into<F::Item>>,
    ) -> Result<UpdateExpression<'s, E, S>> {
        let mut update = self.update();
        update.remove_all(field, items)?;
        Ok(update)
    }

    pub fn add_to_set<F: ArrayField<E>>(
        &self,
        field: F,
        item: impl Into<F::Item>,
    ) -> Result<UpdateExpression<'s, E, S>> {
        let mut update = self.update();
        update.add_to_set(field, item)?;
        Ok(update)
    }

    pub fn pop_first<F: ArrayField<E>>(&self, field: F) -> Result<UpdateExpression<'s, E, S>> {
        let mut update = self.update();
        update.pop_first(field)?;
        Ok(update)
    }

    pub fn pop_last<F: ArrayField<E>>(&self, field: F) -> Result<UpdateExpression<'s, E, S>> {
        let mut update = self.update();
        update.pop_last(field)?;
        Ok(update)
    }
}

fn wrap_all<D: Schematic, F: QueryField<D>>(
    field: &F,
    values: impl IntoIterator<Item = impl Into<F::Value>>,
) -> Result<Vec<Bson>> {
    values
        .into_iter()
        .map(|value| field.wrap_value(value.into()))
        .collect()
}

impl<E, S> Clone for Query<'_, E, S> {
    fn clone(&self) -> Self {
        Self {
            session: self.session,
            filter: self.filter.clone(),
            sort: self.sort.clone(),
            fields: self.fields.clone(),
            field_order: self.field_order.clone(),
            values_only: self.values_only,
            hints: self.hints.clone(),
            limit: self.limit,
            skip: self.skip,
            raw_output: self.raw_output,
            _entity: PhantomData,
        }
    }
}

impl<E, S> fmt::Debug for Query<'_, E, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("filter", &self.filter)
            .field("sort", &self.sort)
            .field("fields", &self.fields)
            .field("values_only", &self.values_only)
            .field("hints", &self.hints)
            .field("limit", &self.limit)
            .field("skip", &self.skip)
            .field("raw_output", &self.raw_output)
            .finish_non_exhaustive()
    }
}
