pub mod action;
pub mod task;
