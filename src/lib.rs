pub mod channel;
pub mod compile;
pub mod config;
pub mod db;
pub mod dialogue;
pub mod error;
pub mod item;
pub mod poller;
pub mod selection;
pub mod taxonomy;
pub mod telegram;

pub use error::{Result, VahtiError};
