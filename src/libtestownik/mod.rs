pub mod archive;
pub mod config;
pub mod distractor;
pub mod document;
pub mod duplicates;
pub mod error;
pub mod overlay;
pub mod quiz_json;
