pub mod bug;
pub mod filter;
pub mod project;
pub mod status;
pub mod task;
pub mod token;
