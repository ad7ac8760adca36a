//! Store schemas and the resolved catalog built from them at open time.
//!
//! A `StoreSchema` is declared by the caller and is fixed once the database
//! is open. `StoreLayout` is the resolved form: it precomputes the set of
//! indexed field names so that encode/decode and predicate validation never
//! re-derive it.
//!
//! # Invariants
//!
//! - `primary_key` is non-empty and has no duplicate fields
//! - index fields are distinct and never primary-key fields
//! - no declared field uses the reserved payload field name
//! - auto-increment only applies to single-field primary keys

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Field holding the codec-encoded payload of a stored record.
pub const PAYLOAD_FIELD: &str = "$payload";

/// Declared schema for one store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::disallowed_methods)] // Clone needed to hand schemas to the substrate
pub struct StoreSchema {
    /// Store name.
    pub name: String,
    /// Ordered primary-key fields.
    pub primary_key: Vec<String>,
    /// Secondary indexes (one field each).
    #[serde(default)]
    pub indexes: Vec<IndexSchema>,
    /// Whether non-indexed fields are packed through the payload codec.
    #[serde(default)]
    pub encoding: bool,
    /// Whether the substrate generates keys for records without one.
    #[serde(default)]
    pub auto_increment: bool,
}

/// A single-field secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::disallowed_methods)] // Clone needed alongside StoreSchema
pub struct IndexSchema {
    pub field: String,
    #[serde(default)]
    pub unique: bool,
}

impl StoreSchema {
    /// Create a schema with the given primary-key fields and no indexes.
    #[must_use]
    pub fn new<I, S>(name: impl Into<String>, primary_key: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            primary_key: primary_key.into_iter().map(Into::into).collect(),
            indexes: Vec::new(),
            encoding: false,
            auto_increment: false,
        }
    }

    /// Add a non-unique index.
    #[must_use]
    pub fn index(mut self, field: impl Into<String>) -> Self {
        self.indexes.push(IndexSchema {
            field: field.into(),
            unique: false,
        });
        self
    }

    /// Add a unique index.
    #[must_use]
    pub fn unique_index(mut self, field: impl Into<String>) -> Self {
        self.indexes.push(IndexSchema {
            field: field.into(),
            unique: true,
        });
        self
    }

    /// Enable payload encoding.
    #[must_use]
    pub const fn with_encoding(mut self) -> Self {
        self.encoding = true;
        self
    }

    /// Enable auto-increment keys.
    #[must_use]
    pub const fn with_auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Whether the primary key has more than one field.
    #[must_use]
    pub fn is_composite(&self) -> bool {
        self.primary_key.len() > 1
    }

    /// Look up a declared index by field name.
    #[must_use]
    pub fn find_index(&self, field: &str) -> Option<&IndexSchema> {
        self.indexes.iter().find(|index| index.field == field)
    }

    /// Check the schema's structural invariants.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.name.is_empty() {
            return Err(SchemaError::EmptyStoreName);
        }
        if self.primary_key.is_empty() {
            return Err(SchemaError::EmptyPrimaryKey(self.name.as_str().to_owned()));
        }

        let mut seen = HashSet::new();
        for field in &self.primary_key {
            self.check_field_name(field)?;
            if !seen.insert(field.as_str()) {
                return Err(self.invalid(format!("primary key field '{field}' is repeated")));
            }
        }

        let mut indexed = HashSet::new();
        for index in &self.indexes {
            self.check_field_name(&index.field)?;
            if seen.contains(index.field.as_str()) {
                return Err(self.invalid(format!(
                    "index '{}' duplicates a primary key field",
                    index.field
                )));
            }
            if !indexed.insert(index.field.as_str()) {
                return Err(self.invalid(format!("index '{}' is declared twice", index.field)));
            }
        }

        if self.auto_increment && self.is_composite() {
            return Err(self.invalid("auto-increment requires a single-field primary key".into()));
        }
        Ok(())
    }

    fn check_field_name(&self, field: &str) -> Result<(), SchemaError> {
        if field.is_empty() {
            return Err(self.invalid("field names must not be empty".into()));
        }
        if field == PAYLOAD_FIELD {
            return Err(self.invalid(format!("'{PAYLOAD_FIELD}' is reserved")));
        }
        Ok(())
    }

    fn invalid(&self, message: String) -> SchemaError {
        SchemaError::Invalid {
            store: self.name.as_str().to_owned(),
            message,
        }
    }
}

/// The role a field plays in a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    /// Component of the primary key at `position`.
    PrimaryKey { position: usize },
    /// Secondary index.
    Index { unique: bool },
}

/// A schema resolved for fast lookups.
#[derive(Debug)]
pub struct StoreLayout {
    schema: StoreSchema,
    roles: HashMap<String, FieldRole>,
}

impl StoreLayout {
    /// Resolve a validated schema.
    pub fn resolve(schema: StoreSchema) -> Result<Self, SchemaError> {
        schema.validate()?;
        let mut roles = HashMap::with_capacity(schema.primary_key.len() + schema.indexes.len());
        for (position, field) in schema.primary_key.iter().enumerate() {
            roles.insert(field.as_str().to_owned(), FieldRole::PrimaryKey { position });
        }
        for index in &schema.indexes {
            roles.insert(
                index.field.as_str().to_owned(),
                FieldRole::Index {
                    unique: index.unique,
                },
            );
        }
        Ok(Self { schema, roles })
    }

    #[must_use]
    pub const fn schema(&self) -> &StoreSchema {
        &self.schema
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    #[must_use]
    pub fn primary_key(&self) -> &[String] {
        &self.schema.primary_key
    }

    #[must_use]
    pub const fn encoding(&self) -> bool {
        self.schema.encoding
    }

    /// Role of `field`, if it is indexed at all.
    #[must_use]
    pub fn role(&self, field: &str) -> Option<FieldRole> {
        self.roles.get(field).copied()
    }

    /// Whether `field` is part of the primary key or a secondary index.
    #[must_use]
    pub fn is_indexed(&self, field: &str) -> bool {
        self.roles.contains_key(field)
    }

    /// Whether `field` is a primary-key component.
    #[must_use]
    pub fn is_primary(&self, field: &str) -> bool {
        matches!(self.role(field), Some(FieldRole::PrimaryKey { .. }))
    }
}

/// Resolved layouts for every store of an open database.
#[derive(Debug, Default)]
pub struct Catalog {
    stores: HashMap<String, Arc<StoreLayout>>,
}

impl Catalog {
    /// Resolve every schema, rejecting duplicates.
    pub fn build(schemas: &[StoreSchema]) -> Result<Self, SchemaError> {
        let mut stores = HashMap::with_capacity(schemas.len());
        for schema in schemas {
            let layout = StoreLayout::resolve(schema.clone())?;
            let name = layout.name().to_owned();
            if stores.insert(name.as_str().to_owned(), Arc::new(layout)).is_some() {
                return Err(SchemaError::DuplicateStore(name));
            }
        }
        Ok(Self { stores })
    }

    /// Look up a store's layout.
    #[must_use]
    #[allow(clippy::disallowed_methods)] // Arc::clone is required for shared ownership
    pub fn get(&self, store: &str) -> Option<Arc<StoreLayout>> {
        self.stores.get(store).map(Arc::clone)
    }

    /// Number of stores.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stores.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}

/// Errors in schema declarations or schema-dependent requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// A store was declared without a name.
    EmptyStoreName,
    /// A store was declared without primary-key fields.
    EmptyPrimaryKey(String),
    /// Two stores share a name.
    DuplicateStore(String),
    /// A structural rule was broken.
    Invalid { store: String, message: String },
    /// An update patch tried to change a primary-key field.
    PrimaryKeyInPatch { store: String, field: String },
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyStoreName => write!(f, "store name must not be empty"),
            Self::EmptyPrimaryKey(store) => {
                write!(f, "store '{store}' must declare at least one primary key field")
            }
            Self::DuplicateStore(store) => write!(f, "store '{store}' is declared twice"),
            Self::Invalid { store, message } => write!(f, "invalid schema for '{store}': {message}"),
            Self::PrimaryKeyInPatch { store, field } => {
                write!(f, "update patch for '{store}' may not change primary key field '{field}'")
            }
        }
    }
}

impl std::error::Error for SchemaError {}
