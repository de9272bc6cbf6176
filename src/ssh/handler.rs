//! russh client handler

use crate::log_sink::LogSink;
use russh::client;
use russh::keys::{HashAlg, PublicKey};
use std::sync::Arc;

/// Client-side callbacks for one SSH session
///
/// Server host keys are accepted without verification; the fingerprint is
/// written to the event log so the user can check it.
pub struct ClientHandler {
    server: String,
    log: Arc<LogSink>,
}

impl ClientHandler {
    /// Create a handler for a session to `server`
    pub fn new(server: impl Into<String>, log: Arc<LogSink>) -> Self {
        ClientHandler {
            server: server.into(),
            log,
        }
    }
}

impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint(HashAlg::Sha256);
        self.log.info(format!(
            "HostKey: {} {} {}",
            self.server,
            server_public_key.algorithm().as_str(),
            fingerprint
        ));
        Ok(true)
    }
}
