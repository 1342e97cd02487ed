//! Endpoint discovery: which account and port accept us

use tracing::debug;

use crate::config::Endpoint;
use crate::error::{Result, UrSecretError};
use crate::ssh::{Auth, Connector};

/// An authenticated session and the endpoint it was opened on
pub struct Connected<S> {
    pub session: S,
    pub endpoint: Endpoint,
}

/// Try every (user, port) pair, users outer and ports inner, and keep the
/// first session that authenticates. Individual failures are only logged;
/// the search is a single bounded pass with no retries.
pub async fn discover<C: Connector>(
    connector: &C,
    host: &str,
    users: &[String],
    ports: &[u16],
    auth: &Auth,
) -> Result<Connected<C::Session>> {
    for user in users {
        for &port in ports {
            let endpoint = Endpoint::new(user.as_str(), port);
            match connector.connect(host, &endpoint, auth).await {
                Ok(session) => return Ok(Connected { session, endpoint }),
                Err(e) => debug!("{}", e),
            }
        }
    }
    Err(UrSecretError::NoWorkingEndpoint(host.to_string()))
}
