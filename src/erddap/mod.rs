//! ERDDAP upstream access.
//!
//! This module provides everything the MCP tools need to talk to ERDDAP
//! servers:
//!
//! - [`servers`]: the registry of known servers
//! - [`client`]: cached, timeout-bounded HTTP handles per server and protocol
//! - [`metadata`]: parsers for the search and dataset info CSV tables
//! - [`query`]: tabledap/griddap constraint query construction
//! - [`preview`]: bounded data samples with summary statistics
//!
//! # Endpoints
//!
//! | Operation | Path |
//! |-----------|------|
//! | search    | `{base}/search/index.csv?page=1&itemsPerPage=N&searchFor=Q` |
//! | info      | `{base}/info/{dataset_id}/index.csv` |
//! | data      | `{base}/{tabledap,griddap}/{dataset_id}.csv?{query}` |

pub mod client;
pub mod error;
pub mod metadata;
pub mod preview;
pub mod query;
pub mod servers;

pub use client::{DataProtocol, ErddapClient, UpstreamHandle, UpstreamSettings};
pub use error::{MetadataParseError, RegistryError, UpstreamError, UpstreamResult};
pub use metadata::{
    parse_dataset_metadata, parse_search_results, DatasetMetadata, DatasetSummary,
    VariableMetadata,
};
pub use preview::{DataPreview, PreviewLimits};
pub use servers::{ServerDescriptor, ServerRegistry};
