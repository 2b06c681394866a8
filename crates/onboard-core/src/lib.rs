pub mod aggregate;
pub mod catalog;
pub mod config;
pub mod db;
pub mod deadline;
pub mod error;
pub mod instantiate;
pub mod io;
pub mod link;
pub mod log;
pub mod output;
pub mod paths;
pub mod portal;
pub mod project;
pub mod task;
pub mod types;

pub use error::{PortalError, Result};
pub use portal::Portal;
