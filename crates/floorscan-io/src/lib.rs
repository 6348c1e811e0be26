//! floorscan-io: File system edges of floorscan.
//!
//! Loads point clouds from disk and writes the artifacts of a pipeline
//! run. The pipeline and export crates stay free of I/O; everything that
//! opens, creates or writes a file lives here.

pub mod artifacts;
pub mod ply;

pub use artifacts::{ArtifactWriter, OutputError, Summary};
pub use ply::{LoadError, load_point_cloud, read_ply, write_ply};
