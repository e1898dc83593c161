use crate::{
    Error, Result,
    schema::{FieldPath, Schema},
};
use dashmap::DashMap;
use std::sync::LazyLock;

#[doc(hidden)]
pub struct EntityMetadataWrapper(pub EntityMetadata);

inventory::collect!(EntityMetadataWrapper);

/// Registration of one `#[derive(Entity)]` type.
pub struct EntityMetadata {
    collection_name: &'static str,
    schema_ptr: fn() -> &'static Schema,
}

impl EntityMetadata {
    #[doc(hidden)]
    pub const fn new(collection_name: &'static str, schema_ptr: fn() -> &'static Schema) -> Self {
        Self {
            collection_name,
            schema_ptr,
        }
    }

    pub fn collection_name(&self) -> &'static str {
        self.collection_name
    }

    pub fn schema(&self) -> &'static Schema {
        (self.schema_ptr)()
    }
}

pub fn entity_metadata() -> impl Iterator<Item = &'static EntityMetadata> {
    inventory::iter::<EntityMetadataWrapper>
        .into_iter()
        .map(|wrapper| &wrapper.0)
}

/// Schema of a registered entity, looked up by type name or collection name.
pub fn find_schema(name: &str) -> Option<&'static Schema> {
    static SCHEMAS: LazyLock<DashMap<&'static str, &'static Schema>> = LazyLock::new(|| {
        let schemas = DashMap::new();

        for metadata in entity_metadata() {
            let schema = metadata.schema();
            schemas.insert(schema.name(), schema);
            schemas.insert(metadata.collection_name(), schema);
        }

        schemas
    });

    SCHEMAS.get(name).map(|entry| *entry.value())
}

/// Resolves a dotted field name of a document type known only by name.
pub fn resolve(document: &str, name: &str) -> Result<FieldPath> {
    find_schema(document)
        .ok_or_else(|| Error::NoSuchDocument(document.to_owned()))?
        .resolve(name)
}
