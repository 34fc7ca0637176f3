//! The statement-facing API: capability traits, the facade implementing
//! them, and the schema-state cache.

mod facade;
mod schema_state;
mod traits;

pub use schema_state::SchemaStateCache;
pub use traits::{EntityRead, EntityWrite, SchemaRead, SchemaWrite, TokenRead, TokenWrite};
