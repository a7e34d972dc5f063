use clap::Parser;

use crate::vba::{DEFAULT_MAX_OUTPUT, ExtractOptions, PROJECT_STREAM};

#[derive(Parser, Debug)]
#[command(name = "vbadump")]
#[command(version)]
#[command(about = "Extract VBA macro source from an unpacked Office VBA storage", long_about = None)]
#[command(after_help = "Examples:\n  \
  vbadump -l storage/VBA            list modules in the project\n  \
  vbadump -p storage/VBA | less     print all module source\n  \
  vbadump storage/VBA -d out -x ThisDocument   extract all but ThisDocument into out/")]
pub struct Cli {
    /// Directory holding the unpacked VBA storage
    #[arg(value_name = "DIR")]
    pub dir: String,

    /// Modules to extract (default: all)
    #[arg(value_name = "MODULES")]
    pub modules: Vec<String>,

    /// List modules (short format)
    #[arg(short = 'l')]
    pub list: bool,

    /// List verbosely, with project header and offsets
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Extract source to pipe, no messages
    #[arg(short = 'p')]
    pub pipe: bool,

    /// Never overwrite existing files
    #[arg(short = 'n', conflicts_with = "overwrite")]
    pub never_overwrite: bool,

    /// Overwrite files WITHOUT prompting
    #[arg(short = 'o')]
    pub overwrite: bool,

    /// Extract source into exdir
    #[arg(short = 'd', value_name = "DIR")]
    pub extract_dir: Option<String>,

    /// Exclude modules that follow
    #[arg(short = 'x', value_name = "MODULE", num_args = 1..)]
    pub exclude: Vec<String>,

    /// Largest decompressed size accepted per module
    #[arg(long = "max-size", value_name = "BYTES", default_value_t = DEFAULT_MAX_OUTPUT)]
    pub max_size: usize,

    /// Name of the project metadata stream
    #[arg(long = "project-stream", value_name = "NAME", default_value = PROJECT_STREAM)]
    pub project_stream: String,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,
}

impl Cli {
    pub fn is_quiet(&self) -> bool {
        self.quiet > 0 || self.pipe
    }

    pub fn is_very_quiet(&self) -> bool {
        self.quiet > 1
    }

    /// Default log filter when `RUST_LOG` is not set.
    pub fn log_filter(&self) -> &'static str {
        if self.is_very_quiet() { "error" } else { "warn" }
    }

    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions::default()
            .max_output_size(self.max_size)
            .project_stream(self.project_stream.clone())
    }

    /// Whether a module name passes the positional and `-x` filters.
    pub fn selects(&self, name: &str) -> bool {
        if !self.modules.is_empty() && !self.modules.iter().any(|m| m.eq_ignore_ascii_case(name)) {
            return false;
        }
        !self.exclude.iter().any(|x| x.eq_ignore_ascii_case(name))
    }
}
