// Adapters layer: concrete implementations for external systems (filesystem, HTTP, CDS, archives).

pub mod archive;
pub mod cds;
pub mod http;
pub mod storage;

pub use cds::CdsClient;
pub use http::HttpSource;
pub use storage::LocalStorage;
