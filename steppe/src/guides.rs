/// ## Getting started
///
/// The [`Entity`](crate::Entity) derive maps a Rust type to a `MongoDB` collection and
/// gives it a static [`Schema`](crate::Schema) that queries are checked against.
///
/// A type that derives [`Entity`](crate::Entity) must:
/// - be a struct with named fields
/// - implement [`Serialize`](serde::Serialize) and [`Deserialize`](serde::Deserialize)
/// - have a field named `id`, annotated with `#[serde(rename = "_id")]`
///
/// ### Example
///
/// ```ignore
/// use serde::{Serialize, Deserialize};
/// use steppe::{Embedded, Entity};
/// use mongodb::bson::oid::ObjectId;
///
/// #[derive(Serialize, Deserialize, Entity)]
/// struct User {
///   #[serde(rename = "_id")]
///   id: ObjectId,
///   name: String,
///   #[serde(rename = "pw")]
///   password: String,
///   #[field(nested)]
///   address: Option<Address>,
/// }
///
/// #[derive(Serialize, Deserialize, Embedded)]
/// struct Address {
///   city: String,
///   zip: Option<String>,
/// }
/// ```
///
/// By default, the collection name is the `snake_case` form of the struct name
/// (e.g., `User` → `user`, `UserEntity` → `user`). You can override this using the
/// `#[entity(collection = "custom_name")]` attribute.
///
/// `#[serde(rename = "...")]` sets the name a field is stored under. Queries may use
/// either name: `"password"` and `"pw"` both resolve to `pw`.
///
/// ### Field options
///
/// | attribute                      | meaning                                                                                  |
/// |--------------------------------|------------------------------------------------------------------------------------------|
/// | `#[field(nested)]`             | the field holds a type deriving `Embedded` (or a `Vec`/`Option`/`Box` of one)            |
/// | `#[field(required = false)]`   | a loaded document may omit the field; defaults to [`Config::required`](crate::Config)    |
/// | `#[field(allow_none = true)]`  | the field may be stored as `null`; defaults to [`Config::allow_none`](crate::Config)     |
///
/// `Option` fields are optional and nullable unless overridden.
///
/// ### Sessions
///
/// Queries are built without touching the database. Only terminal operations
/// (`all`, `one`, `count`, `execute`, ...) go through a [`Session`](crate::Session).
/// [`MongoSession`](crate::MongoSession) runs them against a server:
///
/// ```ignore
/// let config = Config::from_toml_str(r#"
///   namespace = "app"
///   extra_fields = "ignore"
/// "#)?;
///
/// let session = MongoSession::connect("mongodb://localhost:27017", config)?;
/// session.insert(&user)?;
/// ```
///
/// ### Method overview
///
/// | Method name                  | Description                                              | Corresponding MongoDB Query                                   |
/// |------------------------------|----------------------------------------------------------|---------------------------------------------------------------|
/// | `Query::all`                 | All matching documents.                                  | `db.user.find({...})`                                         |
/// | `Query::one`                 | Exactly one matching document, or an error.              | `db.user.find({...})`                                         |
/// | `Query::first`               | First matching document, if any.                         | `db.user.find({...}).limit(1)`                                |
/// | `Query::get`                 | Document at an index after skip.                         | `db.user.find({...}).skip(n).limit(1)`                        |
/// | `Query::count`               | Number of matching documents.                            | `db.user.countDocuments({...})`                               |
/// | `Query::distinct`            | Distinct values of a field.                              | `db.user.distinct("name", {...})`                             |
/// | `Query::explain`             | Query plan.                                              | `db.user.find({...}).explain()`                               |
/// | `Query::set` and friends     | Update builder over the query.                           | `db.user.updateOne({...}, { $set: {...} })`                   |
/// | `Query::find_and_modify`     | Atomic update or remove returning the document.          | `db.user.findOneAndUpdate({...}, {...})`                      |
/// | `RemoveQuery::execute`       | Deletes matching documents.                              | `db.user.deleteMany({...})`                                   |
mod getting_started {}

/// ### Helper module
///
/// Every type deriving `Entity` or `Embedded` gets a helper module named after the type
/// (in `snake_case`). For a type named `User`, the module is `user`.
///
/// Inside that module, you'll find:
/// - one function per field returning a typed [`Field`](crate::Field) handle
/// - a `Fields` enum naming every stored field, implementing `Display`
/// - a `filter!` macro
///
/// ```ignore
/// mod user {
///     pub fn id() -> Field<User, ObjectId> { ... }
///     pub fn name() -> Field<User, String> { ... }
///     pub fn password() -> Field<User, String> { ... } // path "pw"
///     pub fn address() -> Field<User, Option<Address>> { ... }
///
///     pub enum Fields { Id, Name, Password, Address }
/// }
/// ```
///
/// ### Expressions
///
/// Field handles build [`Expression`](crate::Expression)s. Values are converted to BSON
/// through the field's Rust type, so `user::name().eq(3)` does not compile.
///
/// ```ignore
/// let adults = user::age().gte(18)?;                        // { age: { $gte: 18 } }
/// let named = user::name().in_(["Kit", "Ann"])?;            // { name: { $in: ["Kit", "Ann"] } }
/// let city = user::address().then(&address::city()).eq("Oslo")?; // { "address.city": "Oslo" }
///
/// let either = adults.or_with(named);                       // { $or: [...] }
/// let neither = either.clone().not_();                      // { $nor: [...] }
/// ```
///
/// Equality is stored as the bare value. Comparisons on the same field merge into one
/// operator document: `gt(1)` and `lt(5)` on `i` become `{ i: { $gt: 1, $lt: 5 } }`.
/// Combining equality with anything else on the same field is an error
/// ([`Error::MixedAssignment`](crate::Error::MixedAssignment)).
///
/// Negation is pushed down to the field level: no top-level `$not` is ever
/// produced. `{ i: 3 }` becomes `{ i: { $ne: 3 } }` and `{ i: { $gt: 3 } }`
/// becomes `{ i: { $not: { $gt: 3 } } }`. A conjunction over several fields
/// and a disjunction both become a `$nor` branch, and every negated branch
/// of a query lands in the same `$nor` list.
///
/// ### The `filter!` macro
///
/// ```ignore
/// let filter = user::filter! {
///     name: "Kit",
///     age: Gte(18),
/// }?;
/// ```
///
/// Expands to:
/// ```ignore
/// let filter = steppe::Expression::all([
///     user::name().eq("Kit"),
///     user::age().gte(18),
/// ])?;
/// ```
///
/// By default, the `filter!` macro uses equality. `Ne`, `Gt`, `Gte`, `Lt`, `Lte`, `In`
/// and `Nin` can be specified explicitly.
///
/// ### Untyped names
///
/// Every builder that takes a field also takes a string. Strings are resolved against
/// the schema, walking dotted paths through nested types, and fail with
/// [`Error::NoSuchField`](crate::Error::NoSuchField) for unknown names:
///
/// ```ignore
/// session.query::<User>()
///     .ascending("address.city")?
///     .filter_raw(doc! { "password": { "$regex": "^a" } })?;
/// ```
///
/// Values given with string names are raw [`Bson`](mongodb::bson::Bson).
mod filters_and_updates {}

/// ### Updates
///
/// The update methods on [`Query`](crate::Query) (`set`, `unset`, `inc`, `append`,
/// `extend`, `remove`, `remove_all`, `add_to_set`, `pop_first`, `pop_last`) return an
/// [`UpdateExpression`](crate::UpdateExpression) over a snapshot of the query. More
/// modifiers can be chained through the [`Modify`](crate::Modify) trait.
///
/// ```ignore
/// let mut update = session.query::<User>().filter(user::name().eq("Kit")?)?.set(user::age(), 30)?;
/// update.inc("logins", 1)?.append("tags", "admin")?;
/// update.multi().upsert();
/// update.set_safe(true, WriteConcern::majority());
/// let acknowledgement = update.execute()?;
/// ```
///
/// Equivalent `MongoDB` update:
///
/// ```mongodb
/// db.user.updateMany(
///   { name: "Kit" },
///   { $set: { age: 30 }, $inc: { logins: 1 }, $push: { tags: "admin" } },
///   { upsert: true, writeConcern: { w: "majority" } }
/// );
/// ```
///
/// Each path takes one operator. Applying a different operator to the same path, or to
/// a path inside or around it (`address` and `address.city`), fails with
/// [`Error::ConflictingModifier`](crate::Error::ConflictingModifier).
///
/// Without `set_safe(true, ...)`, `execute` returns `Ok(None)`.
mod updates {}

/// ### Restricting fields
///
/// [`Query::fields`](crate::Query::fields) limits retrieval to some fields (plus `_id`).
/// Loaded objects then refuse to read anything else, and cannot be turned into the
/// full entity:
///
/// ```ignore
/// let user = session.query::<User>().fields([user::name()])?.one()?.into_object().unwrap();
/// user.get(&user::name())?;      // ok
/// user.get(&user::age());        // Err(FieldNotRetrieved)
/// ```
///
/// [`Query::values_only`](crate::Query::values_only) returns the values themselves,
/// in the order they were requested:
///
/// ```ignore
/// let (name, age): (String, i32) = session
///     .query::<User>()
///     .values_only(["name", "age"])?
///     .one()?
///     .into_values()
///     .unwrap()
///     .into_tuple()?;
/// ```
///
/// [`Query::raw_output`](crate::Query::raw_output) skips materialization entirely.
mod projections {}

/// This library is named "Steppe" because that is where the herds roam.
mod naming {}
