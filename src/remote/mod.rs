pub mod inspect;
pub mod memory;
pub mod s3;
pub mod store;

pub use inspect::{RemoteInspector, RemoteLookup, RemoteSelection};
pub use memory::{MemoryBucket, MemoryStore, MemoryStoreFactory};
pub use s3::{S3Provider, S3Store, S3StoreFactory};
pub use store::{select_latest, RemoteObjectRecord, RemoteStore, StoreError, StoreFactory, VersionId};
