//! `--get KEY`

use ursecret::ssh::SshConnector;
use ursecret::{Result, SecretClient};

use super::{info, secret, Context};

pub fn run(ctx: &Context, key: &str) -> Result<()> {
    super::runtime()?.block_on(async {
        // Only the dedicated key is offered here
        let connector = SshConnector::new(&ctx.settings, ctx.paths.ssh_dir());
        let mut client =
            SecretClient::connect(&connector, &ctx.identity, &ctx.paths, &ctx.settings).await?;
        info(format!("Using {}", client.endpoint().connection_string(ctx.remote())));

        let result = client.get(key).await;
        // Remote diagnostics ride on the error and are relayed by `fatal`
        client.close().await;

        let value = result?;
        secret(&value);
        Ok(())
    })
}
