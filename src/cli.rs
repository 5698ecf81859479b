//! CLI domain: parse, route and presentation only.

mod parse;
mod presentation;
mod route;

pub use parse::{Cli, Commands};
pub use presentation::{format_discovery_json, format_discovery_text, format_steps, map_error};
pub use route::RunContext;
