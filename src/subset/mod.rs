//! Subsetting engine
//!
//! - [`groups`]: placement of output names into a group plan
//! - [`coords`]: per-group coordinate deduplication
//! - [`encoding`]: compression and chunk planning
//! - [`writer`]: group-by-group writes into one output
//! - [`extract`]: the read, extract and write pipeline

pub mod coords;
pub mod encoding;
pub mod extract;
pub mod groups;
pub mod writer;

pub use encoding::{CompressionKind, EncodingPlan, EncodingPlanner, Filter, VariableEncoding};
pub use extract::{extract_and_write, extract_dataset, subset_output_name, ExtractJob, Subsetter};
pub use groups::{plan_groups, GroupPlan, Layout};
pub use writer::{HierarchicalWriter, WriteSummary, WriterState};
