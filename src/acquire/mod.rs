//! Acquisition stages: platform binaries, the artifact catalog and the
//! external tools its definitions reference.

pub mod binaries;
pub mod catalog;
pub mod tools;

pub use binaries::{acquire_binaries, AcquiredBinary, BinaryOutcome};
pub use catalog::{acquire_catalog, CatalogOutcome};
pub use tools::{acquire_tools, ToolAcquisition, ToolStatus};
