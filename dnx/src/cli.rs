use std::path::PathBuf;

use clap::Parser;

/// dnx - run a managed application on CoreCLR
#[derive(Parser, Debug)]
#[command(name = "dnx")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Application root, passed to the runtime as APPBASE (default: current directory)
    #[arg(long, value_name = "DIR")]
    pub appbase: Option<PathBuf>,

    /// Directory holding dnx.coreclr.managed.dll (default: directory of this binary)
    #[arg(long, value_name = "DIR")]
    pub runtime_dir: Option<PathBuf>,

    /// Report which runtime would be used, as JSON, without starting it
    #[arg(long)]
    pub probe: bool,

    /// Arguments forwarded unchanged to the managed entry point
    #[arg(value_name = "ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forwards_trailing_args_verbatim() {
        let cli = Cli::try_parse_from(["dnx", "--appbase", "/app", "run", "app.dll", "--port", "5000"])
            .unwrap();
        assert_eq!(cli.appbase, Some(PathBuf::from("/app")));
        assert_eq!(cli.args, vec!["run", "app.dll", "--port", "5000"]);
        assert!(!cli.probe);
    }

    #[test]
    fn test_double_dash_separates_host_flags() {
        let cli = Cli::try_parse_from(["dnx", "--", "--probe"]).unwrap();
        assert!(!cli.probe);
        assert_eq!(cli.args, vec!["--probe"]);
    }

    #[test]
    fn test_probe_needs_no_args() {
        let cli = Cli::try_parse_from(["dnx", "--probe", "--runtime-dir", "/opt/dnx"]).unwrap();
        assert!(cli.probe);
        assert_eq!(cli.runtime_dir, Some(PathBuf::from("/opt/dnx")));
        assert!(cli.args.is_empty());
    }
}
