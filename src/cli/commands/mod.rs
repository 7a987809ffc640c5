//! CLI command implementations.

mod setup;
mod summarize;

pub use setup::{init_config_in, run_init_config, run_symlink_cli, symlink_cli_into};
pub use summarize::{apply_overrides, run_summarize, TRUNCATED_EXIT_CODE};
