use clap::{ArgGroup, CommandFactory, Parser};
use std::process::ExitCode;

mod cli;

use ursecret::Result;

#[derive(Parser)]
#[command(name = "ursecret")]
#[command(version = "0.1.0")]
#[command(about = "Generate, store, and retrieve secrets via ssh", long_about = None)]
#[command(group(ArgGroup::new("action").args(["install", "get", "put", "serve"])))]
struct Cli {
    /// Name of remote host
    #[arg(long, value_name = "HOST")]
    remote: Option<String>,

    /// Name of local host (for query purposes)
    #[arg(long, value_name = "NAME")]
    local: Option<String>,

    /// Install new ssh key
    #[arg(long)]
    install: bool,

    /// Get named secret
    #[arg(long, value_name = "KEY")]
    get: Option<String>,

    /// Put named secret
    #[arg(long, num_args = 2, value_names = ["KEY", "VALUE"])]
    put: Option<Vec<String>>,

    /// Verbose debugging output
    #[arg(long)]
    debug: bool,

    /// Remote user to try (repeatable, replaces the defaults)
    #[arg(long = "user", value_name = "USER")]
    users: Vec<String>,

    /// Remote port to try (repeatable, replaces the defaults)
    #[arg(long = "port", value_name = "PORT")]
    ports: Vec<u16>,

    /// Connect and idle timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Act as the remote handler for SSH_ORIGINAL_COMMAND
    #[arg(long, hide = true)]
    serve: bool,
}

/// The one action selected on the command line
#[derive(Debug, PartialEq, Eq)]
enum Action {
    Install,
    Get(String),
    Put(String, String),
}

impl Cli {
    /// clap keeps the actions mutually exclusive and `--put` at two values
    fn action(&mut self) -> Option<Action> {
        if self.install {
            return Some(Action::Install);
        }
        if let Some(key) = self.get.take() {
            return Some(Action::Get(key));
        }
        let [key, value]: [String; 2] = self.put.take()?.try_into().ok()?;
        Some(Action::Put(key, value))
    }
}

fn main() -> ExitCode {
    let mut cli = Cli::parse();

    // sshd runs us as the forced command; nothing else applies then
    if cli.serve {
        return cli::serve::run();
    }

    let (Some(remote), Some(local), Some(action)) =
        (cli.remote.take(), cli.local.take(), cli.action())
    else {
        return usage();
    };

    cli::init_logging(cli.debug);

    match run(cli, &remote, &local, action) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            cli::fatal(&e);
            ExitCode::FAILURE
        }
    }
}

fn usage() -> ExitCode {
    Cli::command().print_help().ok();
    ExitCode::FAILURE
}

fn run(cli: Cli, remote: &str, local: &str, action: Action) -> Result<()> {
    let ctx = cli::Context::new(remote, local, cli.users, cli.ports, cli.timeout)?;

    match action {
        Action::Install => cli::install::run(&ctx),
        Action::Get(key) => cli::get::run(&ctx, &key),
        Action::Put(key, value) => cli::put::run(&ctx, &key, &value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(args: &[&str]) -> Option<Action> {
        let mut argv = vec!["ursecret", "--remote", "nas", "--local", "work"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap().action()
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_each_action() {
        assert_eq!(action(&["--install"]), Some(Action::Install));
        assert_eq!(action(&["--get", "db-pass"]), Some(Action::Get("db-pass".into())));
        assert_eq!(
            action(&["--put", "db-pass", "s3cr3t"]),
            Some(Action::Put("db-pass".into(), "s3cr3t".into()))
        );
        assert_eq!(action(&["--debug"]), None);
    }

    #[test]
    fn test_actions_are_exclusive() {
        let argv = ["ursecret", "--remote", "nas", "--local", "work", "--install", "--get", "k"];
        assert!(Cli::try_parse_from(argv).is_err());
        assert!(Cli::try_parse_from(["ursecret", "--put", "only-key"]).is_err());
    }

    #[test]
    fn test_repeatable_candidates() {
        let cli = Cli::try_parse_from([
            "ursecret", "--remote", "nas", "--local", "work", "--get", "k", "--user", "pi",
            "--user", "root", "--port", "2222",
        ])
        .unwrap();

        assert_eq!(cli.users, vec!["pi", "root"]);
        assert_eq!(cli.ports, vec![2222]);
    }
}
