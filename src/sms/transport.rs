//! HTTP access to the HiLink web interface.

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, COOKIE};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const TOKEN_HEADER: &str = "__RequestVerificationToken";

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("response did not set the {0} cookie")]
    MissingCookie(&'static str),

    #[error("no token found in {0}")]
    MissingToken(&'static str),

    #[error("gateway session is not ready")]
    NotReady,

    #[error("unsupported gateway address '{0}', only plain http is available")]
    UnsupportedScheme(String),

    #[error("failed to decode response: {0}")]
    Decode(#[from] quick_xml::de::DeError),
}

#[async_trait]
pub trait GatewayTransport: Send + Sync {
    /// GETs `path` and returns the value of cookie `name`, if set
    async fn get_cookie(&self, path: &str, name: &str) -> Result<Option<String>, GatewayError>;

    /// GETs `path` inside an existing session and returns the body
    async fn get_page(&self, path: &str, session: &str) -> Result<String, GatewayError>;

    /// POSTs an XML request with session cookie and verification token
    async fn post_xml(
        &self,
        path: &str,
        body: String,
        session: &str,
        token: &str,
    ) -> Result<String, GatewayError>;
}

/// [`GatewayTransport`] over plain HTTP with bounded connect and request time
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    base_url: String,
}

impl ReqwestTransport {
    pub fn new(address: &str) -> Result<Self, GatewayError> {
        let base_url = match address.split_once("://") {
            Some(("http", _)) => address.trim_end_matches('/').to_owned(),
            Some(_) => return Err(GatewayError::UnsupportedScheme(address.to_string())),
            None => format!("http://{}", address.trim_end_matches('/')),
        };
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn session_cookie(session: &str) -> String {
    format!("SessionID={session}")
}

#[async_trait]
impl GatewayTransport for ReqwestTransport {
    async fn get_cookie(&self, path: &str, name: &str) -> Result<Option<String>, GatewayError> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await?
            .error_for_status()?;
        let value = response
            .cookies()
            .find(|c| c.name() == name)
            .map(|c| c.value().to_string());
        debug!("sms: GET {} -> cookie {} present: {}", path, name, value.is_some());
        Ok(value)
    }

    async fn get_page(&self, path: &str, session: &str) -> Result<String, GatewayError> {
        let body = self
            .client
            .get(self.url(path))
            .header(COOKIE, session_cookie(session))
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(body)
    }

    async fn post_xml(
        &self,
        path: &str,
        body: String,
        session: &str,
        token: &str,
    ) -> Result<String, GatewayError> {
        let body = self
            .client
            .post(self.url(path))
            .header(TOKEN_HEADER, token)
            .header(CONTENT_TYPE, "text/xml")
            .header("X-Requested-With", "XMLHttpRequest")
            .header(COOKIE, session_cookie(session))
            .body(body)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gets_scheme() {
        assert_eq!(
            ReqwestTransport::new("192.168.8.1").unwrap().url("/html/index.html"),
            "http://192.168.8.1/html/index.html"
        );
        assert_eq!(
            ReqwestTransport::new("http://modem.lan/").unwrap().url("/api/sms/sms-list"),
            "http://modem.lan/api/sms/sms-list"
        );
    }

    #[test]
    fn tls_address_is_refused() {
        assert!(matches!(
            ReqwestTransport::new("https://192.168.8.1"),
            Err(GatewayError::UnsupportedScheme(_))
        ));
    }
}
