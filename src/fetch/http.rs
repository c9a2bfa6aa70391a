use super::Transport;
use crate::error::{BundleError, Result};
use crate::version;
use reqwest::header::{HeaderValue, ACCEPT, USER_AGENT};
use std::io::Write;

/// Blocking HTTP(S) transport built on self_update's downloader.
///
/// Non-2xx responses and timeouts surface as `BundleError::Transport`.
pub struct HttpTransport {
    user_agent: HeaderValue,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let user_agent = HeaderValue::from_str(&version::user_agent())
            .map_err(|e| BundleError::InvalidConfig(format!("Invalid user agent: {}", e)))?;
        Ok(Self { user_agent })
    }
}

impl Transport for HttpTransport {
    fn download(&self, url: &str, sink: &mut dyn Write) -> Result<()> {
        let mut download = self_update::Download::from_url(url);
        // GitHub's asset API serves JSON metadata unless raw bytes are requested.
        download
            .set_header(ACCEPT, HeaderValue::from_static("application/octet-stream"))
            .set_header(USER_AGENT, self.user_agent.clone())
            .show_progress(false);

        download
            .download_to(sink)
            .map_err(|e| BundleError::Transport(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_header_is_valid() {
        let transport = HttpTransport::new().unwrap();
        assert!(transport
            .user_agent
            .to_str()
            .unwrap()
            .starts_with("offline-builder/"));
    }
}
