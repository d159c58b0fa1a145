use clap::Parser;
use tracing::Level;

use crate::pipeline::{FailurePolicy, PipelineConfig};

#[derive(Parser, Debug)]
#[command(name = "xslview")]
#[command(version)]
#[command(about = "Apply xml-stylesheet references across a batch of XML files and ZIP archives", long_about = None)]
#[command(after_help = "Examples:\n  \
  xslview a.xml style.xsl                 transform a.xml with the stylesheet it references\n  \
  xslview bundle.zip -d out               transform every document in bundle.zip into out/\n  \
  xslview -l https://example.com/b.zip    list entries of a remote archive")]
pub struct Cli {
    /// Input files, ZIP archives or HTTP(S) URLs
    #[arg(value_name = "INPUT", required = true)]
    pub inputs: Vec<String>,

    /// List archive entries instead of transforming
    #[arg(short = 'l')]
    pub list: bool,

    /// Write each result to DIR/<name> instead of stdout
    #[arg(short = 'd', value_name = "DIR")]
    pub output_dir: Option<String>,

    /// Report failures per document and keep going
    #[arg(short = 'k', long = "keep-going")]
    pub keep_going: bool,

    /// Treat malformed archive structure as an error
    #[arg(long = "strict")]
    pub strict: bool,

    /// More log output (-vv for debug)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode, errors only
    #[arg(short = 'q')]
    pub quiet: bool,
}

impl Cli {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            failure_policy: if self.keep_going {
                FailurePolicy::Isolate
            } else {
                FailurePolicy::FailFast
            },
            strict_archive: self.strict,
        }
    }

    /// Log level used when `RUST_LOG` is unset; `RUST_LOG` replaces it entirely.
    pub fn log_level(&self) -> Level {
        match (self.quiet, self.verbose) {
            (true, _) => Level::ERROR,
            (false, 0) => Level::WARN,
            (false, 1) => Level::INFO,
            _ => Level::DEBUG,
        }
    }
}
