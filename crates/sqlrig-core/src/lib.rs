pub mod action;
pub mod builtin;
pub mod config;
pub mod context;
pub mod credentials;
pub mod error;
pub mod executor;
pub mod io;
pub mod login;
pub mod operation;
pub mod paths;
pub mod registry;
pub mod retry;
pub mod sql;
pub mod sqlfiles;

pub use error::{Result, SqlrigError};
