pub mod api;
pub mod completion;
pub mod config;
pub mod error;
pub mod observability;
pub mod routing;
pub mod state;
pub mod stream;
pub mod trace_context;
