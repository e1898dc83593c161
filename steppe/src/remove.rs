use crate::{
    Entity, Result,
    expression::Expression,
    query::Query,
    schema::QueryField,
    session::{Acknowledgement, RemoveCommand, Safety, Session},
};
use log::debug;
use mongodb::{
    bson::{Bson, Document},
    options::WriteConcern,
};
use std::fmt;

/// Deletes every document matching its filter.
pub struct RemoveQuery<'s, E, S> {
    query: Query<'s, E, S>,
    safety: Safety,
}

impl<'s, E: Entity, S: Session> RemoveQuery<'s, E, S> {
    pub fn new(session: &'s S) -> Self {
        Self {
            query: Query::new(session),
            safety: Safety::default(),
        }
    }

    pub fn query_document(&self) -> Document {
        self.query.query_document()
    }

    pub fn is_safe(&self) -> bool {
        self.safety.is_safe()
    }

    pub fn write_concern(&self) -> &WriteConcern {
        self.safety.write_concern()
    }

    /// Requests acknowledgement. Non-default fields of `write_concern`
    /// override the ones set so far.
    pub fn set_safe(&mut self, is_safe: bool, write_concern: WriteConcern) -> &mut Self {
        self.safety.set(is_safe, write_concern);
        self
    }

    pub fn filter(&mut self, expression: Expression) -> Result<&mut Self> {
        self.query.filter(expression)?;
        Ok(self)
    }

    pub fn filter_raw(&mut self, document: Document) -> Result<&mut Self> {
        self.query.filter_raw(document)?;
        Ok(self)
    }

    pub fn filter_by<K: AsRef<str>, V: Into<Bson>>(
        &mut self,
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Result<&mut Self> {
        self.query.filter_by(pairs)?;
        Ok(self)
    }

    pub fn not_(&mut self, expressions: impl IntoIterator<Item = Expression>) -> Result<&mut Self> {
        self.query.not_(expressions)?;
        Ok(self)
    }

    pub fn or_(&mut self, expressions: impl IntoIterator<Item = Expression>) -> Result<&mut Self> {
        self.query.or_(expressions)?;
        Ok(self)
    }

    pub fn in_<F: QueryField<E>>(
        &mut self,
        field: F,
        values: impl IntoIterator<Item = impl Into<F::Value>>,
    ) -> Result<&mut Self> {
        self.query.in_(field, values)?;
        Ok(self)
    }

    pub fn nin<F: QueryField<E>>(
        &mut self,
        field: F,
        values: impl IntoIterator<Item = impl Into<F::Value>>,
    ) -> Result<&mut Self> {
        self.query.nin(field, values)?;
        Ok(self)
    }

    pub fn command(&self) -> RemoveCommand {
        RemoveCommand {
            collection: E::COLLECTION_NAME,
            filter: self.query_document(),
            write_concern: self.safety.requested(),
        }
    }

    /// Acknowledgement is returned only when the remove is safe.
    pub fn execute(&self) -> Result<Option<Acknowledgement>> {
        let command = self.command();

        debug!(
            target: "steppe::remove",
            "remove from `{}`: {} (safe: {})",
            command.collection,
            command.filter,
            self.safety.is_safe()
        );

        let acknowledgement = self.query.session().execute_remove(&command)?;

        Ok(if self.safety.is_safe() {
            acknowledgement
        } else {
            None
        })
    }
}

impl<E, S> Clone for RemoveQuery<'_, E, S> {
    fn clone(&self) -> Self {
        Self {
            query: self.query.clone(),
            safety: self.safety.clone(),
        }
    }
}

impl<E, S> fmt::Debug for RemoveQuery<'_, E, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoveQuery")
            .field("query", &self.query)
            .field("safety", &self.safety)
            .finish()
    }
}
