use crate::{Config, Entity, Result, query::Order, query::Query, remove::RemoveQuery};
use mongodb::{
    bson::{Bson, Document},
    options::WriteConcern,
};

/// A live result set produced by [`Session::execute_query`].
///
/// Iteration yields raw documents; materialization happens in
/// [`crate::QueryResult`].
pub trait Cursor: Iterator<Item = Result<Document>> + Sized {
    /// Document at `index` relative to the command's skip, independent of
    /// the iteration position.
    fn get(&self, index: usize) -> Result<Option<Document>>;

    fn count_documents(&self, with_limit_and_skip: bool) -> Result<u64>;

    fn distinct(&self, key: &str) -> Result<Vec<Bson>>;

    fn explain(&self) -> Result<Document>;

    /// Restarts iteration from the first document.
    fn rewind(&mut self);

    /// Independent cursor over the same command, at the same position.
    fn try_clone(&self) -> Result<Self>;
}

/// Executes compiled commands. Query building never touches the session;
/// only terminal operations do.
pub trait Session {
    type Cursor: Cursor;

    fn config(&self) -> &Config;

    fn execute_query(&self, command: &FindCommand) -> Result<Self::Cursor>;

    fn execute_update(&self, command: &UpdateCommand) -> Result<Option<Acknowledgement>>;

    fn execute_remove(&self, command: &RemoveCommand) -> Result<Option<Acknowledgement>>;

    fn execute_find_and_modify(&self, command: &FindAndModifyCommand) -> Result<Option<Document>>;

    fn query<E: Entity>(&self) -> Query<'_, E, Self>
    where
        Self: Sized,
    {
        Query::new(self)
    }

    fn remove_query<E: Entity>(&self) -> RemoveQuery<'_, E, Self>
    where
        Self: Sized,
    {
        RemoveQuery::new(self)
    }
}

fn keys_document(keys: &[(String, Order)]) -> Option<Document> {
    if keys.is_empty() {
        return None;
    }

    Some(
        keys.iter()
            .map(|(key, order)| (key.clone(), order.to_bson()))
            .collect(),
    )
}

fn projection_document(projection: Option<&Vec<String>>) -> Option<Document> {
    projection.map(|fields| {
        fields
            .iter()
            .map(|field| (field.clone(), Bson::Boolean(true)))
            .collect()
    })
}

#[derive(Clone, Debug, PartialEq)]
pub struct FindCommand {
    pub collection: &'static str,
    pub filter: Document,
    pub sort: Vec<(String, Order)>,
    /// `None` retrieves whole documents.
    pub projection: Option<Vec<String>>,
    pub limit: Option<i64>,
    pub skip: Option<u64>,
    pub hints: Vec<(String, Order)>,
}

impl FindCommand {
    pub fn sort_document(&self) -> Option<Document> {
        keys_document(&self.sort)
    }

    pub fn hint_document(&self) -> Option<Document> {
        keys_document(&self.hints)
    }

    pub fn projection_document(&self) -> Option<Document> {
        projection_document(self.projection.as_ref())
    }

    /// Limit as a document count. Zero and negative limits mean no limit.
    pub fn effective_limit(&self) -> Option<u64> {
        self.limit
            .and_then(|limit| u64::try_from(limit).ok())
            .filter(|limit| *limit > 0)
    }
}

#[derive(Clone, Debug)]
pub struct UpdateCommand {
    pub collection: &'static str,
    pub filter: Document,
    pub update: Document,
    pub upsert: bool,
    pub multi: bool,
    /// Present only when acknowledgement was requested.
    pub write_concern: Option<WriteConcern>,
}

#[derive(Clone, Debug)]
pub struct RemoveCommand {
    pub collection: &'static str,
    pub filter: Document,
    pub write_concern: Option<WriteConcern>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FindAndModifyCommand {
    pub collection: &'static str,
    pub filter: Document,
    pub sort: Vec<(String, Order)>,
    pub projection: Option<Vec<String>>,
    /// `None` when the matched document is removed.
    pub update: Option<Document>,
    pub new: bool,
    pub remove: bool,
    pub upsert: bool,
}

impl FindAndModifyCommand {
    pub fn sort_document(&self) -> Option<Document> {
        keys_document(&self.sort)
    }

    pub fn projection_document(&self) -> Option<Document> {
        projection_document(self.projection.as_ref())
    }
}

/// Server acknowledgement of a write.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Acknowledgement {
    pub n: u64,
    pub updated_existing: bool,
    pub upserted: Option<Bson>,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct Safety {
    safe: bool,
    write_concern: WriteConcern,
}

impl Safety {
    pub(crate) fn set(&mut self, is_safe: bool, overrides: WriteConcern) {
        self.safe = is_safe;

        if overrides.w.is_some() {
            self.write_concern.w = overrides.w;
        }
        if overrides.w_timeout.is_some() {
            self.write_concern.w_timeout = overrides.w_timeout;
        }
        if overrides.journal.is_some() {
            self.write_concern.journal = overrides.journal;
        }
    }

    pub(crate) fn is_safe(&self) -> bool {
        self.safe
    }

    pub(crate) fn write_concern(&self) -> &WriteConcern {
        &self.write_concern
    }

    pub(crate) fn requested(&self) -> Option<WriteConcern> {
        self.safe.then(|| self.write_concern.clone())
    }
}
