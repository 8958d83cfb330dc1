use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "quill")]
#[command(about = "Quill narrative runtime CLI")]
pub(crate) struct Cli {
    /// JSON file with sandbox, state and module limits.
    #[arg(long = "config", global = true)]
    pub(crate) config: Option<String>,
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Evaluate one expression against a story session.
    Eval(EvalArgs),
    /// Start or continue a play-through and print the current passage.
    Render(RenderArgs),
    /// Upgrade a save file to the current format.
    Migrate(MigrateArgs),
    /// Load every module and story file under a directory.
    Check(CheckArgs),
}

#[derive(Debug, Args)]
pub(crate) struct SessionArgs {
    #[arg(long = "story")]
    pub(crate) story: String,
    #[arg(long = "state-in")]
    pub(crate) state_in: Option<String>,
    #[arg(long = "modules-dir")]
    pub(crate) modules_dir: Option<String>,
    #[arg(long = "include")]
    pub(crate) include: Vec<String>,
    #[arg(long = "seed")]
    pub(crate) seed: Option<u32>,
}

#[derive(Debug, Args)]
pub(crate) struct EvalArgs {
    #[command(flatten)]
    pub(crate) session: SessionArgs,
    #[arg(long = "expr")]
    pub(crate) expr: String,
    /// Run as statements instead of a single expression.
    #[arg(long = "exec")]
    pub(crate) exec: bool,
    #[arg(long = "state-out")]
    pub(crate) state_out: Option<String>,
}

#[derive(Debug, Args)]
pub(crate) struct RenderArgs {
    #[command(flatten)]
    pub(crate) session: SessionArgs,
    /// Choice to take before rendering.
    #[arg(long = "choice")]
    pub(crate) choice: Option<String>,
    #[arg(long = "state-out")]
    pub(crate) state_out: Option<String>,
}

#[derive(Debug, Args)]
pub(crate) struct MigrateArgs {
    #[arg(long = "state-in")]
    pub(crate) state_in: String,
    #[arg(long = "state-out")]
    pub(crate) state_out: String,
}

#[derive(Debug, Args)]
pub(crate) struct CheckArgs {
    #[arg(long = "dir")]
    pub(crate) dir: String,
}
