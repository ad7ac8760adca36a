pub mod key;
pub mod schema;
pub mod value;

pub use key::{CanonicalKey, Key, KeyPart};
pub use schema::{
    Catalog, FieldRole, IndexSchema, PAYLOAD_FIELD, SchemaError, StoreLayout, StoreSchema,
};
pub use value::{Record, Value, record};
