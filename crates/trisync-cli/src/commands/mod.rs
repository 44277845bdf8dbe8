pub mod common;
pub mod completions;
pub mod conflicts;
pub mod resolve;
pub mod run;
pub mod status;
pub mod sync;
pub mod view;
