use crate::{
    Config, Entity, Error, Result,
    session::{
        Acknowledgement, Cursor, FindAndModifyCommand, FindCommand, RemoveCommand, Session,
        UpdateCommand,
    },
};
use log::{debug, info};
use mongodb::{
    bson::{self, Bson, Document, doc},
    options::{Hint, ReturnDocument},
    sync,
};

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// [`Session`] backed by the synchronous `MongoDB` driver.
#[derive(Clone, Debug)]
pub struct MongoSession {
    database: sync::Database,
    config: Config,
}

impl MongoSession {
    /// Connects to `uri` and uses [`Config::namespace`] as the database.
    pub fn connect(uri: &str, config: Config) -> Result<Self> {
        let client = sync::Client::with_uri_str(uri)?;
        let database = client.database(&config.namespace);

        info!(target: "steppe::mongo", "connected to database `{}`", config.namespace);

        Ok(Self::new(database, config))
    }

    pub fn new(database: sync::Database, config: Config) -> Self {
        Self { database, config }
    }

    pub fn database(&self) -> &sync::Database {
        &self.database
    }

    pub fn collection(&self, name: &str) -> sync::Collection<Document> {
        self.database.collection(name)
    }

    /// Inserts an entity and returns its identity.
    pub fn insert<E: Entity>(&self, entity: &E) -> Result<Bson> {
        let document = bson::to_document(entity).map_err(|source| Error::Wrap {
            field: E::schema().name().to_owned(),
            source,
        })?;

        let result = self
            .collection(E::COLLECTION_NAME)
            .insert_one(document)
            .run()?;

        Ok(result.inserted_id)
    }

    /// Deletes every document of `E`'s collection.
    pub fn clear_collection<E: Entity>(&self) -> Result<u64> {
        let result = self
            .collection(E::COLLECTION_NAME)
            .delete_many(doc! {})
            .run()?;

        Ok(result.deleted_count)
    }
}

impl Session for MongoSession {
    type Cursor = MongoCursor;

    fn config(&self) -> &Config {
        &self.config
    }

    fn execute_query(&self, command: &FindCommand) -> Result<MongoCursor> {
        Ok(MongoCursor {
            database: self.database.clone(),
            collection: self.collection(command.collection),
            command: command.clone(),
            position: 0,
            live: None,
        })
    }

    fn execute_update(&self, command: &UpdateCommand) -> Result<Option<Acknowledgement>> {
        let collection = self.collection(command.collection);
        let filter = command.filter.clone();
        let update = command.update.clone();

        let result = if command.multi {
            let mut action = collection.update_many(filter, update).upsert(command.upsert);
            if let Some(write_concern) = &command.write_concern {
                action = action.write_concern(write_concern.clone());
            }
            action.run()?
        } else {
            let mut action = collection.update_one(filter, update).upsert(command.upsert);
            if let Some(write_concern) = &command.write_concern {
                action = action.write_concern(write_concern.clone());
            }
            action.run()?
        };

        debug!(
            target: "steppe::mongo",
            "update matched {}, modified {}",
            result.matched_count, result.modified_count
        );

        Ok(Some(Acknowledgement {
            n: if result.upserted_id.is_some() {
                1
            } else {
                result.matched_count
            },
            updated_existing: result.matched_count > 0,
            upserted: result.upserted_id,
        }))
    }

    fn execute_remove(&self, command: &RemoveCommand) -> Result<Option<Acknowledgement>> {
        let collection = self.collection(command.collection);
        let mut action = collection.delete_many(command.filter.clone());

        if let Some(write_concern) = &command.write_concern {
            action = action.write_concern(write_concern.clone());
        }

        let result = action.run()?;

        Ok(Some(Acknowledgement {
            n: result.deleted_count,
            ..Acknowledgement::default()
        }))
    }

    fn execute_find_and_modify(&self, command: &FindAndModifyCommand) -> Result<Option<Document>> {
        let collection = self.collection(command.collection);

        if command.remove {
            let mut action = collection.find_one_and_delete(command.filter.clone());
            if let Some(sort) = command.sort_document() {
                action = action.sort(sort);
            }
            if let Some(projection) = command.projection_document() {
                action = action.projection(projection);
            }
            return Ok(action.run()?);
        }

        let return_document = if command.new {
            ReturnDocument::After
        } else {
            ReturnDocument::Before
        };

        let mut action = collection
            .find_one_and_update(
                command.filter.clone(),
                command.update.clone().unwrap_or_default(),
            )
            .upsert(command.upsert)
            .return_document(return_document);

        if let Some(sort) = command.sort_document() {
            action = action.sort(sort);
        }
        if let Some(projection) = command.projection_document() {
            action = action.projection(projection);
        }

        Ok(action.run()?)
    }
}

/// Lazily opened driver cursor that remembers its position, so it can be
/// rewound and cloned.
pub struct MongoCursor {
    database: sync::Database,
    collection: sync::Collection<Document>,
    command: FindCommand,
    position: u64,
    live: Option<sync::Cursor<Document>>,
}

impl MongoCursor {
    pub fn command(&self) -> &FindCommand {
        &self.command
    }

    fn open(&self, offset: u64, limit: Option<u64>) -> Result<sync::Cursor<Document>> {
        let mut action = self.collection.find(self.command.filter.clone());

        if let Some(sort) = self.command.sort_document() {
            action = action.sort(sort);
        }
        if let Some(projection) = self.command.projection_document() {
            action = action.projection(projection);
        }
        if let Some(hint) = self.command.hint_document() {
            action = action.hint(Hint::Keys(hint));
        }

        let skip = self.command.skip.unwrap_or(0) + offset;
        if skip > 0 {
            action = action.skip(skip);
        }
        if let Some(limit) = limit {
            action = action.limit(to_i64(limit));
        }

        Ok(action.run()?)
    }

    fn remaining(&self) -> Option<u64> {
        self.command
            .effective_limit()
            .map(|limit| limit.saturating_sub(self.position))
    }
}

impl Iterator for MongoCursor {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        let remaining = self.remaining();
        if remaining == Some(0) {
            return None;
        }

        if self.live.is_none() {
            match self.open(self.position, remaining) {
                Ok(cursor) => self.live = Some(cursor),
                Err(err) => return Some(Err(err)),
            }
        }

        let item = self.live.as_mut()?.next()?;
        if item.is_ok() {
            self.position += 1;
        }

        Some(item.map_err(Error::from))
    }
}

impl Cursor for MongoCursor {
    fn get(&self, index: usize) -> Result<Option<Document>> {
        let index = u64::try_from(index).unwrap_or(u64::MAX);

        if self
            .command
            .effective_limit()
            .is_some_and(|limit| index >= limit)
        {
            return Ok(None);
        }

        let mut cursor = self.open(index, Some(1))?;
        cursor.next().transpose().map_err(Error::from)
    }

    fn count_documents(&self, with_limit_and_skip: bool) -> Result<u64> {
        let mut action = self
            .collection
            .count_documents(self.command.filter.clone());

        if with_limit_and_skip {
            if let Some(skip) = self.command.skip {
                action = action.skip(skip);
            }
            if let Some(limit) = self.command.effective_limit() {
                action = action.limit(limit);
            }
        }

        Ok(action.run()?)
    }

    fn distinct(&self, key: &str) -> Result<Vec<Bson>> {
        Ok(self
            .collection
            .distinct(key, self.command.filter.clone())
            .run()?)
    }

    fn explain(&self) -> Result<Document> {
        let mut find = doc! {
            "find": self.command.collection,
            "filter": self.command.filter.clone(),
        };

        if let Some(sort) = self.command.sort_document() {
            find.insert("sort", sort);
        }
        if let Some(projection) = self.command.projection_document() {
            find.insert("projection", projection);
        }
        if let Some(hint) = self.command.hint_document() {
            find.insert("hint", hint);
        }
        if let Some(skip) = self.command.skip {
            find.insert("skip", to_i64(skip));
        }
        if let Some(limit) = self.command.effective_limit() {
            find.insert("limit", to_i64(limit));
        }

        Ok(self
            .database
            .run_command(doc! { "explain": find, "verbosity": "queryPlanner" })
            .run()?)
    }

    fn rewind(&mut self) {
        self.position = 0;
        self.live = None;
    }

    fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            database: self.database.clone(),
            collection: self.collection.clone(),
            command: self.command.clone(),
            position: self.position,
            live: None,
        })
    }
}
