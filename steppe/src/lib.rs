//! Steppe is a typed query and update expression builder for `MongoDB`.
//!
//! ## Example
//!
//! ```ignore
//! // Define an entity
//! #[derive(Serialize, Deserialize, Entity)]
//! struct User {
//!   #[serde(rename = "_id")]
//!   id: ObjectId,
//!   email: String,
//!   age: i32,
//!   #[field(nested)]
//!   address: Address,
//! }
//!
//! #[derive(Serialize, Deserialize, Embedded)]
//! struct Address {
//!   city: String,
//! }
//!
//! let session = MongoSession::connect("mongodb://localhost", Config::default())?;
//!
//! // Select entities by typed fields
//! let adults = session
//!   .query::<User>()
//!   .filter(user::age().gte(18)?)?
//!   .descending(user::age())?
//!   .all()?;
//!
//! // Select by dotted name
//! let locals = session
//!   .query::<User>()
//!   .filter_raw(doc! { "address.city": "Berlin" })?
//!   .count(false)?;
//!
//! // Select only some fields, as a tuple
//! let (email, age): (String, i32) = session
//!   .query::<User>()
//!   .values_only(["email", "age"])?
//!   .one()?
//!   .into_values()
//!   .unwrap()
//!   .into_tuple()?;
//!
//! // Update matching documents
//! session
//!   .query::<User>()
//!   .filter(user::filter! { email: "mail@example.com" }?)?
//!   .set(user::age(), 30)?
//!   .multi()
//!   .execute()?;
//!
//! // Delete matching documents
//! session
//!   .remove_query::<User>()
//!   .filter(user::age().lt(18)?)?
//!   .execute()?;
//! ```
//!
//! See [`guides`] module to learn more!

#![warn(clippy::pedantic)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions
)]

mod config;
mod error;
mod expression;
pub mod guides;
#[cfg(feature = "meta")]
pub mod meta;
mod mongo;
mod query;
mod remove;
mod result;
mod schema;
mod session;
mod update;

#[cfg(test)]
mod fixtures;

pub use config::{Config, ExtraFields};
pub use error::{Error, Result};
pub use expression::{Expression, FilterOperator};
pub use mongo::{MongoCursor, MongoSession};
pub use query::{Order, Query};
pub use remove::RemoveQuery;
pub use result::{FromValues, Loaded, Materializer, Output, QueryResult, Record, Values};
pub use schema::{
    ArrayField, Entity, Field, FieldDescriptor, FieldPath, Nested, QueryField, Schema, Schematic,
    Sequence,
};
pub use session::{
    Acknowledgement, Cursor, FindAndModifyCommand, FindCommand, RemoveCommand, Session,
    UpdateCommand,
};
pub use update::{FindAndModify, Modifiers, Modify, UpdateExpression, UpdateOperator};

pub use mongodb;
pub use steppe_macros::{Embedded, Entity, construct_filter};

#[doc(hidden)]
pub mod __private {
    #[cfg(feature = "meta")]
    pub use inventory;
}
