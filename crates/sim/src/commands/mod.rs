//! Subcommand implementations

mod report;
mod run;

pub use report::Report;
pub use run::Run;

/// Output format shared by the subcommands
#[derive(Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    Summary,
    /// JSON output
    Json,
}
