pub mod error;
pub mod filter;
pub mod task;

pub use error::*;
pub use filter::*;
pub use task::*;
