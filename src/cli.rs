use clap::{Args, Parser, Subcommand};
use gharvest_archive::TimeCursor;
use std::path::PathBuf;

/// Continuously harvest repositories from the GH Archive event stream and
/// enrich them with API metadata and page metrics.
#[derive(Debug, Parser)]
#[command(name = "gharvest", version, about, long_about = None)]
pub struct Cli {
    /// TOML configuration file [default: gharvest.toml]
    #[arg(long, short, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Keep the extracted queue filled from the hourly archive
    Archive(StartArgs),
    /// Consolidate extracted batches into repository sets
    Process,
    /// Enrich every repository in the consolidated sets
    Enrich,
    /// Run all three stages in this process
    All(StartArgs),
    /// Show the persisted archive cursor
    Cursor,
}

#[derive(Debug, Clone, Args)]
pub struct StartArgs {
    /// First archive hour to fetch when no cursor has been stored yet
    #[arg(long, value_name = "YYYY-MM-DD-H", value_parser = parse_cursor)]
    pub start: Option<TimeCursor>,
}

fn parse_cursor(value: &str) -> Result<TimeCursor, String> {
    value
        .parse()
        .map_err(|_| format!("expected YYYY-MM-DD-H (month 1-12, day 1-28, hour 0-23), got {value:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use rstest::rstest;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[rstest]
    #[case(&["gharvest", "archive", "--start", "2015-01-01-15"], Some("2015-01-01-15"))]
    #[case(&["gharvest", "all", "--start", "2020-12-28-0"], Some("2020-12-28-0"))]
    #[case(&["gharvest", "archive"], None)]
    fn test_start(#[case] args: &[&str], #[case] expected: Option<&str>) {
        let cli = Cli::try_parse_from(args).unwrap();
        let (Command::Archive(start) | Command::All(start)) = cli.command else {
            panic!("expected a command taking --start");
        };
        assert_eq!(start.start.map(|cursor| cursor.archive_name()).as_deref(), expected);
    }

    #[rstest]
    #[case(&["gharvest", "archive", "--start", "2015-01-29-0"])]
    #[case(&["gharvest", "archive", "--start", "tomorrow"])]
    #[case(&["gharvest", "process", "--start", "2015-01-01-0"])]
    #[case(&["gharvest"])]
    fn test_rejected(#[case] args: &[&str]) {
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn test_global_config() {
        let cli = Cli::try_parse_from(["gharvest", "enrich", "--config", "/etc/gharvest.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/gharvest.toml")));
        assert!(matches!(cli.command, Command::Enrich));
    }
}
