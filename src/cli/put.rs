//! `--put KEY VALUE`

use ursecret::ssh::SshConnector;
use ursecret::{Result, SecretClient, UrSecretError};

use super::{info, relay, Context};

pub fn run(ctx: &Context, key: &str, value: &str) -> Result<()> {
    super::runtime()?.block_on(async {
        // Only the dedicated key is offered here
        let connector = SshConnector::new(&ctx.settings, ctx.paths.ssh_dir());
        let mut client =
            SecretClient::connect(&connector, &ctx.identity, &ctx.paths, &ctx.settings).await?;
        info(format!("Using {}", client.endpoint().connection_string(ctx.remote())));

        let result = client.put(key, value).await;
        client.close().await;

        // The handler is silent on success; anything it said is relayed
        let outcome = result?;
        for line in &outcome.remote {
            relay(line);
        }
        // Exit status decides, not output
        match outcome.exit_status {
            Some(0) => {
                info(format!("secret installed on {}", ctx.remote()));
                Ok(())
            }
            Some(status) => Err(UrSecretError::RemoteRejected(status)),
            None => Err(UrSecretError::Remote(format!(
                "no exit status from {}",
                ctx.remote()
            ))),
        }
    })
}
