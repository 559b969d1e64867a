use std::{sync::OnceLock, time::Duration};

use reqwest::Client;
use tracing::debug;

use crate::{Error, Result};

const USER_AGENT: &str = concat!("logistics-notify/", env!("CARGO_PKG_VERSION"));

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Safe to ignore: can happen if another crate installed it first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Build the `reqwest::Client` shared by the outbound integrations.
///
/// `purpose` only shows up in the error message.
pub fn build_client(purpose: &str, request_timeout: Duration) -> Result<Client> {
    install_rustls_provider();

    let mut builder = Client::builder().user_agent(USER_AGENT);
    if request_timeout > Duration::ZERO {
        builder = builder.timeout(request_timeout);
    }

    builder
        .build()
        .map_err(|e| Error::config(format!("Failed to build {purpose} HTTP client: {e}")))
}
