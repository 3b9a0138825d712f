//! Registry of source system types and the source systems reporting incidents

mod service;

pub use service::SourceRegistry;
