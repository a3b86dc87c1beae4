use std::path::PathBuf;

use clap::{ArgAction, Parser};

pub const GOTIDY_BEFORE_HELP: &str = concat!(
    "gotidy ",
    env!("CARGO_PKG_VERSION"),
    " – transactional go.mod tidying and import grouping\n\n",
    "  --tidy      Run `go mod tidy` and sort the require blocks of go.mod.\n",
    "  --imports   Strip import comments and regroup imports with goimports.\n\n",
    "Without --write nothing on disk changes: gotidy exits 1 if either stage\n",
    "would modify the module and 0 if it is already tidy.\n",
);

#[derive(Parser, Debug)]
#[command(name = "gotidy", author, version, before_help = GOTIDY_BEFORE_HELP)]
#[allow(clippy::struct_excessive_bools)]
pub struct GotidyCli {
    #[arg(
        long,
        value_name = "DIR",
        default_value = ".",
        help = "Module root containing go.mod"
    )]
    pub dir: PathBuf,
    #[arg(long, help = "Tidy go.mod and go.sum")]
    pub tidy: bool,
    #[arg(long, help = "Group imports with goimports")]
    pub imports: bool,
    #[arg(
        long = "imports-prefix",
        value_name = "PREFIX",
        help = "Group imports starting with PREFIX after third-party ones (implies --imports)"
    )]
    pub imports_prefix: Option<String>,
    #[arg(
        long = "imports-pregroup",
        help = "Run an extra goimports pass before stripping comments"
    )]
    pub imports_pregroup: bool,
    #[arg(short, long, help = "Keep changes instead of reporting and reverting them")]
    pub write: bool,
    #[arg(short, long, help = "Suppress human output (errors still print to stderr)")]
    pub quiet: bool,
    #[arg(short, long, action = ArgAction::Count, help = "Increase logging (-vv reaches trace)")]
    pub verbose: u8,
    #[arg(long, help = "Force trace logging regardless of -v/-q")]
    pub trace: bool,
    #[arg(long, help = "Emit {status,message,details} JSON envelopes")]
    pub json: bool,
}
