#![allow(dead_code)]

use mongodb::bson::{Bson, Document, doc, oid::ObjectId};
use serde::{Deserialize, Serialize};
use std::{cell::RefCell, collections::HashMap};
use steppe::{
    Acknowledgement, Config, Cursor, Embedded, Entity, FindAndModifyCommand, FindCommand,
    RemoveCommand, Result, Session, UpdateCommand,
};

#[derive(Debug, Serialize, Deserialize, Entity)]
pub struct T {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub i: i32,
    pub j: Option<i32>,
    pub l: Option<Vec<i32>>,
    #[serde(rename = "aa")]
    pub a: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize, Entity)]
pub struct T2 {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    #[field(nested)]
    pub t: T,
}

#[derive(Debug, Serialize, Deserialize, Entity)]
#[entity(collection = "people")]
pub struct Person {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    #[serde(rename = "yrs", default)]
    pub age: i32,
    #[field(nested)]
    pub address: Option<Address>,
    #[field(nested)]
    pub previous: Vec<Address>,
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Embedded)]
pub struct Address {
    pub city: String,
    #[serde(default)]
    #[field(required = false)]
    pub zip: String,
}

#[derive(Debug, Serialize, Deserialize, Entity)]
pub struct UserEntity {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub r#type: String,
}

pub fn t_document(i: i32) -> Document {
    doc! { "_id": ObjectId::new(), "i": i, "j": i + 1, "aa": i * 10 }
}

fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
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

/// Plain equality on non-operator keys; everything else matches.
fn matches(document: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, expected)| {
        if key.starts_with('$') {
            return true;
        }

        match expected {
            Bson::Document(operators) if operators.keys().any(|k| k.starts_with('$')) => true,
            expected => lookup(document, key) == Some(expected),
        }
    })
}

fn project(document: &Document, paths: &[String]) -> Document {
    let mut projected = Document::new();

    for path in paths {
        let Some(value) = lookup(document, path) else {
            continue;
        };

        let mut segments = path.split('.').collect::<Vec<_>>();
        let Some(last) = segments.pop() else {
            continue;
        };

        let mut target = &mut projected;
        for segment in segments {
            if !matches!(target.get(segment), Some(Bson::Document(_))) {
                target.insert(segment, Document::new());
            }
            let Some(Bson::Document(inner)) = target.get_mut(segment) else {
                unreachable!();
            };
            target = inner;
        }

        target.insert(last, value.clone());
    }

    projected
}

/// In-memory session recording every command it receives.
pub struct FakeSession {
    config: Config,
    collections: RefCell<HashMap<&'static str, Vec<Document>>>,
    pub finds: RefCell<Vec<FindCommand>>,
    pub updates: RefCell<Vec<UpdateCommand>>,
    pub removes: RefCell<Vec<RemoveCommand>>,
    pub find_and_modifies: RefCell<Vec<FindAndModifyCommand>>,
}

impl FakeSession {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            collections: RefCell::default(),
            finds: RefCell::default(),
            updates: RefCell::default(),
            removes: RefCell::default(),
            find_and_modifies: RefCell::default(),
        }
    }

    pub fn with_documents<E: Entity>(self, documents: impl IntoIterator<Item = Document>) -> Self {
        self.collections
            .borrow_mut()
            .entry(E::COLLECTION_NAME)
            .or_default()
            .extend(documents);
        self
    }

    fn documents(&self, collection: &str, filter: &Document) -> Vec<Document> {
        self.collections
            .borrow()
            .get(collection)
            .map(|documents| {
                documents
                    .iter()
                    .filter(|document| matches(document, filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn last_find(&self) -> FindCommand {
        self.finds.borrow().last().cloned().expect("no find command")
    }
}

impl Session for FakeSession {
    type Cursor = FakeCursor;

    fn config(&self) -> &Config {
        &self.config
    }

    fn execute_query(&self, command: &FindCommand) -> Result<FakeCursor> {
        self.finds.borrow_mut().push(command.clone());

        Ok(FakeCursor {
            matching: self.documents(command.collection, &command.filter),
            command: command.clone(),
            position: 0,
        })
    }

    fn execute_update(&self, command: &UpdateCommand) -> Result<Option<Acknowledgement>> {
        self.updates.borrow_mut().push(command.clone());

        let matched = self.documents(command.collection, &command.filter).len() as u64;
        let n = if command.multi { matched } else { matched.min(1) };

        Ok(Some(Acknowledgement {
            n,
            updated_existing: n > 0,
            upserted: None,
        }))
    }

    fn execute_remove(&self, command: &RemoveCommand) -> Result<Option<Acknowledgement>> {
        self.removes.borrow_mut().push(command.clone());

        let mut collections = self.collections.borrow_mut();
        let documents = collections.entry(command.collection).or_default();
        let before = documents.len();
        documents.retain(|document| !matches(document, &command.filter));

        Ok(Some(Acknowledgement {
            n: (before - documents.len()) as u64,
            ..Acknowledgement::default()
        }))
    }

    fn execute_find_and_modify(&self, command: &FindAndModifyCommand) -> Result<Option<Document>> {
        self.find_and_modifies.borrow_mut().push(command.clone());

        let document = self
            .documents(command.collection, &command.filter)
            .into_iter()
            .next();

        Ok(match &command.projection {
            Some(paths) => document.map(|document| project(&document, paths)),
            None => document,
        })
    }
}

pub struct FakeCursor {
    matching: Vec<Document>,
    command: FindCommand,
    position: usize,
}

impl FakeCursor {
    fn window(&self) -> Vec<Document> {
        let skip = self.command.skip.unwrap_or(0) as usize;
        let limit = self
            .command
            .effective_limit()
            .map_or(usize::MAX, |limit| limit as usize);

        self.matching
            .iter()
            .skip(skip)
            .take(limit)
            .map(|document| match &self.command.projection {
                Some(paths) => project(document, paths),
                None => document.clone(),
            })
            .collect()
    }
}

impl Iterator for FakeCursor {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        let document = self.window().into_iter().nth(self.position)?;
        self.position += 1;
        Some(Ok(document))
    }
}

impl Cursor for FakeCursor {
    fn get(&self, index: usize) -> Result<Option<Document>> {
        Ok(self.window().into_iter().nth(index))
    }

    fn count_documents(&self, with_limit_and_skip: bool) -> Result<u64> {
        Ok(if with_limit_and_skip {
            self.window().len() as u64
        } else {
            self.matching.len() as u64
        })
    }

    fn distinct(&self, key: &str) -> Result<Vec<Bson>> {
        let mut values = Vec::new();

        for document in &self.matching {
            if let Some(value) = lookup(document, key) {
                if !values.contains(value) {
                    values.push(value.clone());
                }
            }
        }

        Ok(values)
    }

    fn explain(&self) -> Result<Document> {
        Ok(doc! {
            "collection": self.command.collection,
            "filter": self.command.filter.clone(),
        })
    }

    fn rewind(&mut self) {
        self.position = 0;
    }

    fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            matching: self.matching.clone(),
            command: self.command.clone(),
            position: self.position,
        })
    }
}
