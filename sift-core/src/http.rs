use std::time::Duration;

use reqwest::Client;

/// Build an HTTP client with the given overall request timeout.
///
/// Installs the aws-lc-rs rustls provider as the process default on first
/// use; reqwest is built without a bundled provider.
pub(crate) fn client(timeout: Duration) -> Result<Client, reqwest::Error> {
    // Err means a provider is already installed.
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    Client::builder().timeout(timeout).build()
}
