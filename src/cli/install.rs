//! `--install`: provision the dedicated key and handler on the remote

use tracing::debug;

use ursecret::config::KeyAlgorithm;
use ursecret::provision::{discover, negotiate, Connected, Progress, Provisioner, SshKeygen};
use ursecret::ssh::{Auth, RemoteSession, SshConnector};
use ursecret::Result;

use super::{info, Context};

pub fn run(ctx: &Context) -> Result<()> {
    super::runtime()?.block_on(install(ctx))
}

async fn install(ctx: &Context) -> Result<()> {
    let remote = ctx.remote();
    let connector = SshConnector::new(&ctx.settings, ctx.paths.ssh_dir());
    let limits = ctx.settings.read_limits();

    // Find an account and port our existing credentials open
    let Connected {
        mut session,
        endpoint,
    } = discover(
        &connector,
        remote,
        &ctx.settings.users,
        &ctx.settings.ports,
        &Auth::Ambient,
    )
    .await?;
    info(format!("Using {}", endpoint.connection_string(remote)));

    // Ask the remote sshd which key types it takes
    let algorithm: KeyAlgorithm = match negotiate(&mut session, remote, limits).await {
        Ok(algorithm) => algorithm,
        Err(e) => {
            session.close().await;
            return Err(e);
        }
    };
    debug!("using {} keys", algorithm);

    // Handler, key pair, restricted entry, local record
    let credential = endpoint.with_algorithm(algorithm);
    let keygen = SshKeygen::default();
    let result = Provisioner::new(
        &mut session,
        &ctx.identity,
        &credential,
        &ctx.paths,
        &keygen,
        limits,
    )
    .install(|step| match step {
        Progress::HandlerInstalled { path } => {
            debug!("handler at ~/{}", path);
            info(format!("helper installed on {}", remote));
        }
        Progress::KeyGenerated { pair } => {
            info(format!("{} key generated in {}", algorithm, pair.private_path.display()));
        }
        Progress::EntryInstalled { fingerprint } => {
            info(format!("key {} installed on {}", fingerprint, remote));
        }
    })
    .await;

    // Close before reporting so a failed step still disconnects
    session.close().await;
    result.map(|_| ())
}
