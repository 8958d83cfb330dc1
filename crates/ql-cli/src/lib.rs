use std::ffi::OsString;

use clap::Parser;
use ql_core::QuillError;

mod cli_args;
mod commands;
mod error_map;
mod files;
mod logging;

pub(crate) use cli_args::{
    CheckArgs, Cli, Command, EvalArgs, MigrateArgs, RenderArgs, SessionArgs,
};
pub(crate) use error_map::{
    emit_error, json_string, map_config_read, map_source_scan, map_state_invalid,
    map_state_read, map_state_write, map_story_read,
};
pub(crate) use files::{load_config, load_save, load_story, write_save};

pub use logging::init_logging;

pub fn run_cli_from_args<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();
            return error.exit_code();
        }
    };
    match run(cli) {
        Ok(code) => code,
        Err(error) => emit_error(error),
    }
}

fn run(cli: Cli) -> Result<i32, QuillError> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Eval(args) => commands::run_eval(args, &config),
        Command::Render(args) => commands::run_render(args, &config),
        Command::Migrate(args) => commands::run_migrate(args),
        Command::Check(args) => commands::run_check(args, &config),
    }
}
