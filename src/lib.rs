#![forbid(unsafe_code)]

pub mod book;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod content;
pub mod crawl;
pub mod depth;
pub mod fetch;
pub mod formats;
pub mod image;
pub mod logging;
pub mod processor;
pub mod registry;
