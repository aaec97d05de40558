pub mod formatter;

pub use formatter::{format_board, should_use_colors};
