use crate::{
    Entity, Error, Result,
    query::Query,
    result::{Materializer, Record},
    schema::{ArrayField, QueryField, Schematic},
    session::{Acknowledgement, FindAndModifyCommand, Safety, Session, UpdateCommand},
};
use log::debug;
use mongodb::{
    bson::{Bson, Document, doc},
    options::WriteConcern,
};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UpdateOperator {
    Set,
    Unset,
    Inc,
    Push,
    PushAll,
    Pull,
    PullAll,
    AddToSet,
    Pop,
}

impl UpdateOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Set => "$set",
            Self::Unset => "$unset",
            Self::Inc => "$inc",
            Self::Push => "$push",
            Self::PushAll => "$pushAll",
            Self::Pull => "$pull",
            Self::PullAll => "$pullAll",
            Self::AddToSet => "$addToSet",
            Self::Pop => "$pop",
        }
    }
}

impl fmt::Display for UpdateOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accumulated update modifiers, keyed by operator then path.
///
/// A path may be bound to one operator only, and no two bound paths may
/// overlap (`a` and `a.b`). Re-applying the same operator to the same path
/// replaces the earlier value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Modifiers {
    document: Document,
    bound: Vec<(String, UpdateOperator)>,
}

impl Modifiers {
    pub fn record(&mut self, operator: UpdateOperator, path: String, value: Bson) -> Result<()> {
        for (existing, bound) in &self.bound {
            if !overlaps(existing, &path) || (*existing == path && *bound == operator) {
                continue;
            }

            return Err(Error::ConflictingModifier {
                field: path,
                existing: bound.as_str(),
                requested: operator.as_str(),
            });
        }

        if !self.bound.iter().any(|(existing, _)| *existing == path) {
            self.bound.push((path.clone(), operator));
        }

        match self.document.get_mut(operator.as_str()) {
            Some(Bson::Document(fields)) => {
                fields.insert(path, value);
            }
            _ => {
                self.document.insert(operator.as_str(), doc! { path: value });
            }
        }

        Ok(())
    }

    pub fn operator_for(&self, path: &str) -> Option<UpdateOperator> {
        self.bound
            .iter()
            .find(|(existing, _)| existing == path)
            .map(|(_, operator)| *operator)
    }

    pub fn is_empty(&self) -> bool {
        self.document.is_empty()
    }

    pub fn to_document(&self) -> Document {
        self.document.clone()
    }
}

fn is_prefix(parent: &str, path: &str) -> bool {
    path.len() > parent.len()
        && path.starts_with(parent)
        && path.as_bytes()[parent.len()] == b'.'
}

fn overlaps(left: &str, right: &str) -> bool {
    left == right || is_prefix(left, right) || is_prefix(right, left)
}

/// Update builder operations, shared by [`UpdateExpression`] and
/// [`FindAndModify`].
pub trait Modify<D: Schematic>: Sized {
    fn modifiers(&self) -> &Modifiers;

    fn modifiers_mut(&mut self) -> &mut Modifiers;

    fn update_data(&self) -> Document {
        self.modifiers().to_document()
    }

    fn set<F: QueryField<D>>(&mut self, field: F, value: impl Into<F::Value>) -> Result<&mut Self> {
        let path = field.resolve()?;
        let value = field.wrap_value(value.into())?;
        self.modifiers_mut().record(UpdateOperator::Set, path, value)?;
        Ok(self)
    }

    fn unset<F: QueryField<D>>(&mut self, field: F) -> Result<&mut Self> {
        let path = field.resolve()?;
        self.modifiers_mut()
            .record(UpdateOperator::Unset, path, Bson::Boolean(true))?;
        Ok(self)
    }

    fn inc<F: QueryField<D>>(&mut self, field: F, amount: impl Into<F::Value>) -> Result<&mut Self> {
        let path = field.resolve()?;
        let amount = field.wrap_value(amount.into())?;
        self.modifiers_mut().record(UpdateOperator::Inc, path, amount)?;
        Ok(self)
    }

    /// `$push`
    fn append<F: ArrayField<D>>(&mut self, field: F, item: impl Into<F::Item>) -> Result<&mut Self> {
        let path = field.resolve()?;
        let item = field.wrap_item(item.into())?;
        self.modifiers_mut().record(UpdateOperator::Push, path, item)?;
        Ok(self)
    }

    /// `$pushAll`
    fn extend<F: ArrayField<D>>(
        &mut self,
        field: F,
        items: impl IntoIterator<Item = impl Into<F::Item>>,
    ) -> Result<&mut Self> {
        let path = field.resolve()?;
        let items = items
            .into_iter()
            .map(|item| field.wrap_item(item.into()))
            .collect::<Result<Vec<_>>>()?;
        self.modifiers_mut()
            .record(UpdateOperator::PushAll, path, Bson::Array(items))?;
        Ok(self)
    }

    /// `$pull`
    fn remove<F: ArrayField<D>>(&mut self, field: F, item: impl Into<F::Item>) -> Result<&mut Self> {
        let path = field.resolve()?;
        let item = field.wrap_item(item.into())?;
        self.modifiers_mut().record(UpdateOperator::Pull, path, item)?;
        Ok(self)
    }

    /// `$pullAll`
    fn remove_all<F: ArrayField<D>>(
        &mut self,
        field: F,
        items: impl IntoIterator<Item = impl Into<F::Item>>,
    ) -> Result<&mut Self> {
        let path = field.resolve()?;
        let items = items
            .into_iter()
            .map(|item| field.wrap_item(item.into()))
            .collect::<Result<Vec<_>>>()?;
        self.modifiers_mut()
            .record(UpdateOperator::PullAll, path, Bson::Array(items))?;
        Ok(self)
    }

    fn add_to_set<F: ArrayField<D>>(
        &mut self,
        field: F,
        item: impl Into<F::Item>,
    ) -> Result<&mut Self> {
        let path = field.resolve()?;
        let item = field.wrap_item(item.into())?;
        self.modifiers_mut()
            .record(UpdateOperator::AddToSet, path, item)?;
        Ok(self)
    }

    fn pop_first<F: ArrayField<D>>(&mut self, field: F) -> Result<&mut Self> {
        let path = field.resolve()?;
        self.modifiers_mut()
            .record(UpdateOperator::Pop, path, Bson::Int32(-1))?;
        Ok(self)
    }

    fn pop_last<F: ArrayField<D>>(&mut self, field: F) -> Result<&mut Self> {
        let path = field.resolve()?;
        self.modifiers_mut()
            .record(UpdateOperator::Pop, path, Bson::Int32(1))?;
        Ok(self)
    }
}

/// An update of every document matched by a query (or the first one, unless
/// [`UpdateExpression::multi`] is set).
pub struct UpdateExpression<'s, E, S> {
    query: Query<'s, E, S>,
    modifiers: Modifiers,
    upsert: bool,
    multi: bool,
    safety: Safety,
}

impl<'s, E: Entity, S: Session> UpdateExpression<'s, E, S> {
    pub fn new(query: Query<'s, E, S>) -> Self {
        Self {
            query,
            modifiers: Modifiers::default(),
            upsert: false,
            multi: false,
            safety: Safety::default(),
        }
    }

    pub fn query(&self) -> &Query<'s, E, S> {
        &self.query
    }

    pub fn upsert(&mut self) -> &mut Self {
        self.upsert = true;
        self
    }

    pub fn multi(&mut self) -> &mut Self {
        self.multi = true;
        self
    }

    /// Requests acknowledgement. Non-default fields of `write_concern`
    /// override the ones set so far.
    pub fn set_safe(&mut self, is_safe: bool, write_concern: WriteConcern) -> &mut Self {
        self.safety.set(is_safe, write_concern);
        self
    }

    pub fn is_safe(&self) -> bool {
        self.safety.is_safe()
    }

    pub fn command(&self) -> UpdateCommand {
        UpdateCommand {
            collection: E::COLLECTION_NAME,
            filter: self.query.query_document(),
            update: self.update_data(),
            upsert: self.upsert,
            multi: self.multi,
            write_concern: self.safety.requested(),
        }
    }

    pub fn execute(&self) -> Result<Option<Acknowledgement>> {
        let command = self.command();

        debug!(
            target: "steppe::update",
            "update on `{}`: {} with {} (upsert: {}, multi: {})",
            command.collection, command.filter, command.update, command.upsert, command.multi
        );

        let acknowledgement = self.query.session().execute_update(&command)?;

        Ok(if self.safety.is_safe() {
            acknowledgement
        } else {
            None
        })
    }
}

impl<E: Entity, S: Session> Modify<E> for UpdateExpression<'_, E, S> {
    fn modifiers(&self) -> &Modifiers {
        &self.modifiers
    }

    fn modifiers_mut(&mut self) -> &mut Modifiers {
        &mut self.modifiers
    }
}

impl<E, S> Clone for UpdateExpression<'_, E, S> {
    fn clone(&self) -> Self {
        Self {
            query: self.query.clone(),
            modifiers: self.modifiers.clone(),
            upsert: self.upsert,
            multi: self.multi,
            safety: self.safety.clone(),
        }
    }
}

impl<E, S> fmt::Debug for UpdateExpression<'_, E, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateExpression")
            .field("query", &self.query)
            .field("modifiers", &self.modifiers)
            .field("upsert", &self.upsert)
            .field("multi", &self.multi)
            .finish_non_exhaustive()
    }
}

/// Atomically updates (or removes) the first matching document and returns
/// it, before or after the change depending on `new`.
pub struct FindAndModify<'s, E, S> {
    query: Query<'s, E, S>,
    modifiers: Modifiers,
    new: bool,
    remove: bool,
    upsert: bool,
}

impl<'s, E: Entity, S: Session> FindAndModify<'s, E, S> {
    pub fn new(query: Query<'s, E, S>, new: bool, remove: bool) -> Self {
        Self {
            query,
            modifiers: Modifiers::default(),
            new,
            remove,
            upsert: false,
        }
    }

    pub fn query(&self) -> &Query<'s, E, S> {
        &self.query
    }

    pub fn upsert(&mut self) -> &mut Self {
        self.upsert = true;
        self
    }

    pub fn command(&self) -> FindAndModifyCommand {
        let find = self.query.command();

        FindAndModifyCommand {
            collection: find.collection,
            filter: find.filter,
            sort: find.sort,
            projection: find.projection,
            update: (!self.remove).then(|| self.update_data()),
            new: self.new,
            remove: self.remove,
            upsert: self.upsert,
        }
    }

    /// The affected document, materialized like any query result.
    ///
    /// Fails with [`Error::RemoveWithModifiers`] when removing and
    /// modifiers were recorded.
    pub fn execute(&self) -> Result<Option<Record<E>>> {
        if self.remove && !self.modifiers.is_empty() {
            return Err(Error::RemoveWithModifiers);
        }

        let command = self.command();

        debug!(
            target: "steppe::update",
            "find and modify on `{}`: {} (new: {}, remove: {})",
            command.collection, command.filter, command.new, command.remove
        );

        let document = self.query.session().execute_find_and_modify(&command)?;
        let materializer = Materializer::for_query(&self.query);

        document.map(|raw| materializer.materialize(raw)).transpose()
    }
}

impl<E: Entity, S: Session> Modify<E> for FindAndModify<'_, E, S> {
    fn modifiers(&self) -> &Modifiers {
        &self.modifiers
    }

    fn modifiers_mut(&mut self) -> &mut Modifiers {
        &mut self.modifiers
    }
}

impl<E, S> Clone for FindAndModify<'_, E, S> {
    fn clone(&self) -> Self {
        Self {
            query: self.query.clone(),
            modifiers: self.modifiers.clone(),
            new: self.new,
            remove: self.remove,
            upsert: self.upsert,
        }
    }
}

impl<E, S> fmt::Debug for FindAndModify<'_, E, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FindAndModify")
            .field("query", &self.query)
            .field("modifiers", &self.modifiers)
            .field("new", &self.new)
            .field("remove", &self.remove)
            .field("upsert", &self.upsert)
            .finish()
    }
}
