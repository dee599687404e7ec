pub mod cache;
pub mod error;
pub mod error_state;
pub mod mutations;
pub mod pending;
pub mod state_manager;
pub mod view;

pub use error::*;
pub use state_manager::*;
pub use view::{TaskStats, TaskView};
