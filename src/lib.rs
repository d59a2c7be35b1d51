//! sn2n: a ServiceNow-documentation-to-Notion conversion service.
//!
//! This crate converts HTML documentation pages into Notion block trees and
//! uploads them against the Notion API's structural limits. The conversion
//! core walks the DOM in source order, parses inline formatting into rich
//! text, parks content Notion cannot nest behind in-text marker tokens, and
//! resolves those markers on the live page after creation.

// Main modules
pub mod config;
pub mod h2n;
pub mod limits;
pub mod marker;
pub mod nesting_orchestrator;
pub mod notion_ext;
pub mod page_uploader;
pub mod page_validator;
pub mod richtext;
pub mod server;
pub mod util;

// Re-export key types for convenient usage
pub use config::{ServerConfig, ValidationConfig};
pub use h2n::{Conversion, ConvertStats, DraftBlock, convert_document};
pub use marker::{MarkerMint, marker_token};
pub use nesting_orchestrator::{OrchestrationReport, Orchestrator};
pub use notion_ext::NotionHttp;
pub use page_uploader::{PageUploader, UploadOutcome};
pub use page_validator::{ValidationMethod, ValidationOutcome, ValidationStatus};
pub use server::AppState;

/// Version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod prelude {
    pub use crate::config::{ServerConfig, ValidationConfig};
    pub use crate::h2n::{Conversion, convert_document};
    pub use crate::nesting_orchestrator::Orchestrator;
    pub use crate::page_uploader::PageUploader;
    pub use crate::page_validator::{ValidationMethod, validate_page};
    pub use crate::server::{AppState, router, serve};
}
