// Entity-side data model: records, mix-in field bundles, compiled schemas,
// and optional lifecycle methods.

pub mod events;
pub mod mixins;
pub mod record;
pub mod schema;

pub use events::*;
pub use mixins::*;
pub use record::*;
pub use schema::*;
