pub mod aggregate;
pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod fs_util;
pub mod iso;
pub mod notify;
pub mod output;
pub mod parse;
pub mod store;
