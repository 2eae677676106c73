pub mod common;
pub mod completions;
pub mod diff;
pub mod export;
pub mod sync;
pub mod validate;
