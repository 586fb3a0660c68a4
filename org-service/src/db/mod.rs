pub mod error;
pub mod executor;
pub mod handle;
pub mod memory;
pub mod update;

pub use error::StoreError;
pub use executor::{
    object_ids, parse_object_id, Page, PageResult, QueryExecutor, SortDirection, SortSpec,
    Timeouts,
};
pub use handle::{
    CollectionHandle, DocumentStore, FindSpec, MongoCollection, MongoStore, ORGANIZATIONS, POSTS,
    USERS,
};
pub use memory::MemoryStore;
pub use update::{set_fields, UpdateDoc, UpdateDocBuilder};
