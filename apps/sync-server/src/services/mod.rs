//! Request-level services.

pub mod sync_service;

pub use sync_service::{
    FetchRequest, FetchResponse, ProtocolVersion, PushRequest, PushResponse, SyncService,
};
