pub mod app;
pub mod classify;
pub mod commands;
pub mod config;
pub mod context;
pub mod demo;
pub mod dispatch;
pub mod env;
pub mod info;
pub mod output;
pub mod runtime;

pub use app::run;
pub use env::CliArgs;
