//! Index subsystem
//!
//! A collection owns exactly one primary index plus any number of
//! secondary indexes created through the type registry.

pub mod definition;
pub mod edge;
pub mod fulltext;
pub mod geo;
pub mod hash;
pub mod primary;
pub mod registry;
pub mod secondary;
pub mod skiplist;

pub use definition::IndexDefinition;
pub use edge::EdgeIndex;
pub use fulltext::FulltextIndex;
pub use geo::{GeoIndex, GeoVariant};
pub use hash::HashIndex;
pub use primary::{BucketPosition, PrimaryIndex};
pub use registry::{IndexRegistry, ServerRole, FULLTEXT_MIN_WORD_LENGTH_DEFAULT};
pub use secondary::{CollectionIndex, DocumentLocation, IndexKey, OperationMode};
pub use skiplist::SkiplistIndex;
