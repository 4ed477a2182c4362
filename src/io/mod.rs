pub mod generator;
pub mod instance_file;
pub mod reporting;
