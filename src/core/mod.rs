pub mod burst;
pub mod duplicate;
pub mod hash;
pub mod photo;
pub mod randomizer;
pub mod scoring;
pub mod submission;
pub mod validation;
