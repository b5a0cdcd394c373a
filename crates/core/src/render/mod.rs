//! Output rendering for reports

pub mod json;
pub mod sanitize;
pub mod text;

pub use json::{render_json, render_json_string};
pub use sanitize::sanitize_terminal;
pub use text::{render_ambiguity, render_connections, render_human, render_short, render_tree};
