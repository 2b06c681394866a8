pub mod actions;
pub mod catalog;
pub mod outputs;
pub mod phases;
pub mod projects;
pub mod tasks;
