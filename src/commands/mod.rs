pub mod build;
pub mod scan;
pub mod version;
