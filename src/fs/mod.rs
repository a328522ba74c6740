pub mod local;
pub mod types;

pub use local::{pick_newest, LocalInspector};
pub use types::*;
