use clap::{ArgAction, Parser, Subcommand, ValueHint};

use crate::utils::OutputFormat;

#[derive(Parser)]
#[command(
    author,
    version,
    about,
    help_template = "{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}",
    arg_required_else_help = true
)]
pub struct Args {
    /// Set output verbosity
    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress outputs
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output as json
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Disable colors in output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Provide custom config file
    #[arg(short, long, global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<String>,

    /// Use this cache database instead of the configured one
    #[arg(short = 'f', long, global = true, value_hint = ValueHint::FilePath)]
    pub database_file: Option<String>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve snapshots over HTTP
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value_t = 8998)]
        port: u16,
    },

    /// Resolve one set and print its snapshot
    #[command(arg_required_else_help = true)]
    Snapshot {
        /// Distribution name, e.g. humble
        #[arg(required = true)]
        distribution: String,

        /// Branch, tag or commit of the distro repository
        #[arg(required = true)]
        set_ref: String,

        /// Document format
        #[arg(long, value_enum, default_value_t = OutputFormat::Yaml)]
        format: OutputFormat,
    },

    /// List stored sets
    #[clap(name = "sets", visible_alias = "ls")]
    Sets {
        /// Only list sets of this distribution
        distribution: Option<String>,
    },

    /// Remove a stored set; its repository states stay cached
    #[command(arg_required_else_help = true)]
    #[clap(name = "drop-set")]
    DropSet {
        #[arg(required = true)]
        distribution: String,

        #[arg(required = true)]
        name: String,
    },

    /// Print the effective configuration
    Config,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::parse_from([
            "distrocache",
            "snapshot",
            "humble",
            "refs/heads/humble",
            "--format",
            "json",
            "-vv",
            "-f",
            "/tmp/cache.db",
        ]);
        assert_eq!(args.verbose, 2);
        assert_eq!(args.database_file.as_deref(), Some("/tmp/cache.db"));
        match args.command {
            Commands::Snapshot {
                distribution,
                set_ref,
                format,
            } => {
                assert_eq!(distribution, "humble");
                assert_eq!(set_ref, "refs/heads/humble");
                assert_eq!(format, OutputFormat::Json);
            }
            _ => panic!("expected snapshot command"),
        }
    }

    #[test]
    fn test_serve_defaults() {
        let args = Args::parse_from(["distrocache", "serve"]);
        match args.command {
            Commands::Serve {
                host,
                port,
            } => {
                assert_eq!(host, "0.0.0.0");
                assert_eq!(port, 8998);
            }
            _ => panic!("expected serve command"),
        }
    }
}
