//! erddap-mcp: MCP server for discovering and previewing ERDDAP scientific data
//!
//! This library exposes ERDDAP servers (oceanographic and atmospheric data
//! catalogs) to AI assistants through a small, fixed set of MCP tools:
//!
//! - **`list_servers`**: the known ERDDAP servers, public and private
//! - **`search_datasets`**: full-text dataset search on one server
//! - **`get_dataset_info`**: a dataset's coverage, attributes and variables
//! - **`to_pandas`**: a bounded data sample with summary statistics
//!
//! # Modules
//!
//! - [`config`]: Configuration loading and validation
//! - [`erddap`]: Upstream access, CSV parsing and query building
//! - [`error`]: Error types
//! - [`mcp`]: MCP protocol implementation

pub mod config;
pub mod erddap;
pub mod error;
pub mod mcp;
