//! Approval surface that asks the operator to open the URL themselves.

use async_trait::async_trait;
use pelagic_core::ApprovalSurface;
use pelagic_domain::Result;
use tracing::info;
use url::Url;

/// Logs the authorization URL at `info` level.
///
/// Suitable for headless runs where the operator copies the URL into a
/// browser on any machine that can reach the loopback redirect.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingApprovalSurface;

#[async_trait]
impl ApprovalSurface for LoggingApprovalSurface {
    async fn open(&self, url: &Url) -> Result<()> {
        info!(authorization_url = %url, "open this URL in a browser to sign in");
        Ok(())
    }
}
