//! `--serve`: the handler, run by sshd as the forced command

use std::io;
use std::process::ExitCode;

use ursecret::protocol::{serve, SecretStore};

const ORIGINAL_COMMAND: &str = "SSH_ORIGINAL_COMMAND";

pub fn run() -> ExitCode {
    let original = std::env::var(ORIGINAL_COMMAND).ok();

    let Some(home) = dirs::home_dir() else {
        eprintln!("F: cannot locate home directory");
        return ExitCode::FAILURE;
    };
    let store = SecretStore::in_home(&home);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match serve(original.as_deref(), &store, &mut out) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("F: {}: {}", e, original.unwrap_or_default());
            ExitCode::FAILURE
        }
    }
}
