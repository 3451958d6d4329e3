//! ListingHarvest command-line front end and HTTP control surface.

pub mod output;
#[cfg(feature = "http")]
pub mod server;

pub use output::{progress_line, sources_table, stats_text, status_summary};
