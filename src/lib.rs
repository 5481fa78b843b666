//! nc_subset: variable subsetting for hierarchical NetCDF4/HDF5 files
//!
//! Pulls a chosen set of variables out of large, deeply grouped scientific files
//! (satellite granules are the typical case) and writes them into a new, smaller,
//! compressed file. The output can keep the source group layout or flatten it to
//! the root group. Many files can be processed in parallel with per-file failure
//! isolation.
//!
//! ## Key Features
//!
//! - **Group mapping**: output names are placed into a group plan; hierarchical or flat
//! - **Coordinate deduplication**: shared dimension-coordinates live at the root only
//! - **Encoding planning**: deflate/gzip with shuffle, native chunk layouts preserved
//! - **Parallel batches**: a bounded Rayon pool where one bad file never stops the rest
//!
//! ## Module Organization
//!
//! - [`subset`]: the subsetting engine (groups, coords, encoding, writer, extract)
//! - [`dataset`]: in-memory arrays, variable paths and provenance
//! - [`data_source`]: read and write traits for containers
//! - [`netcdf_io`]: NetCDF4 implementation of those traits
//! - [`memory`]: in-memory implementation of those traits
//! - [`metadata`]: group tree inspection
//! - [`config`]: write options and variable spec files
//! - [`batch`]: parallel batch execution
//! - [`parallel`]: worker pool configuration
//! - [`errors`]: centralized error handling
//!
//! ## Usage
//!
//! ```rust,no_run
//! use nc_subset::prelude::*;
//! use std::path::Path;
//!
//! let specs = VariableSpec::from_mapping([
//!     ("lat", "PRODUCT/latitude"),
//!     ("lon", "PRODUCT/longitude"),
//! ]);
//! let mut subsetter = Subsetter::new("S5P_NO2.nc", specs).unwrap();
//! subsetter.extract().unwrap();
//! let summary = subsetter
//!     .to_netcdf(Path::new("out"), None, &WriteOptions::default())
//!     .unwrap();
//! println!("wrote {}", summary.output_path.display());
//! ```

pub mod batch;
pub mod cli;
pub mod config;
pub mod data_source;
pub mod dataset;
pub mod errors;
pub mod memory;
pub mod metadata;
pub mod netcdf_io;
pub mod parallel;
pub mod subset;

pub use errors::{ErrorKind, Result, SubsetError};

// High-level convenience API
pub mod prelude {
    //! Commonly used imports for convenience
    pub use crate::batch::{BatchExecutor, BatchReport, LogProgress, NoProgress, Outcome, ProgressReporter};
    pub use crate::config::{load_variable_specs, WriteOptions};
    pub use crate::data_source::{ContainerSink, ContainerSource, GroupWrite, WriteMode};
    pub use crate::dataset::{ArrayValues, DataArray, Dataset, VariablePath, VariableSpec};
    pub use crate::errors::{ErrorKind, Result, SubsetError};
    pub use crate::memory::MemoryContainer;
    pub use crate::netcdf_io::{NetcdfSink, NetcdfSource};
    pub use crate::parallel::ParallelConfig;
    pub use crate::subset::{
        extract_and_write, extract_dataset, CompressionKind, HierarchicalWriter, Layout, Subsetter,
        WriteSummary,
    };
}
