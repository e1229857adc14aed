//! SMS command channel through a Huawei HiLink modem.

pub mod commands;
pub mod messages;
pub mod poller;
pub mod session;
pub mod transport;

pub use commands::{CommandHandler, SmsCommand};
pub use poller::{PollOutcome, SmsPoller};
pub use session::{HiLinkSession, SendOutcome, SessionState};
pub use transport::{GatewayError, GatewayTransport, ReqwestTransport};

#[cfg(test)]
pub(crate) mod tests {
    use super::session::{INBOX_PAGE, INDEX_PAGE, SEND_ENDPOINT};
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    pub(crate) struct PostedXml {
        pub(crate) path: String,
        pub(crate) body: String,
        pub(crate) session: String,
        pub(crate) token: String,
    }

    /// Gateway fake; an empty cookie or token means the page does not carry one
    pub(crate) struct ScriptedGateway {
        cookie: String,
        token: String,
        inbox: Mutex<String>,
        send_response: Mutex<String>,
        requests: Mutex<Vec<String>>,
        posted: Mutex<Vec<PostedXml>>,
    }

    impl ScriptedGateway {
        pub(crate) fn new(cookie: &str, token: &str) -> Self {
            Self {
                cookie: cookie.to_string(),
                token: token.to_string(),
                inbox: Mutex::new(inbox(&[])),
                send_response: Mutex::new(
                    "<?xml version=\"1.0\" encoding=\"UTF-8\"?><response>OK</response>".to_string(),
                ),
                requests: Mutex::new(Vec::new()),
                posted: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn set_inbox(&self, body: String) {
            *self.inbox.lock().unwrap() = body;
        }

        pub(crate) fn set_send_response(&self, body: &str) {
            *self.send_response.lock().unwrap() = body.to_string();
        }

        /// Paths of the GET requests made so far
        pub(crate) fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }

        pub(crate) fn sent(&self) -> Vec<PostedXml> {
            self.posted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GatewayTransport for ScriptedGateway {
        async fn get_cookie(&self, path: &str, name: &str) -> Result<Option<String>, GatewayError> {
            assert_eq!(path, INDEX_PAGE);
            assert_eq!(name, "SessionID");
            self.requests.lock().unwrap().push(path.to_string());
            Ok(Some(self.cookie.clone()).filter(|c| !c.is_empty()))
        }

        async fn get_page(&self, path: &str, session: &str) -> Result<String, GatewayError> {
            assert_eq!(path, INBOX_PAGE);
            assert_eq!(session, self.cookie);
            self.requests.lock().unwrap().push(path.to_string());
            if self.token.is_empty() {
                return Ok("<html><head></head></html>".to_string());
            }
            Ok(format!(
                r#"<html><head><meta name="csrf_token" content="{}"/></head></html>"#,
                self.token
            ))
        }

        async fn post_xml(
            &self,
            path: &str,
            body: String,
            session: &str,
            token: &str,
        ) -> Result<String, GatewayError> {
            self.posted.lock().unwrap().push(PostedXml {
                path: path.to_string(),
                body,
                session: session.to_string(),
                token: token.to_string(),
            });
            if path == SEND_ENDPOINT {
                Ok(self.send_response.lock().unwrap().clone())
            } else {
                Ok(self.inbox.lock().unwrap().clone())
            }
        }
    }

    /// Builds an `sms-list` response from `(index, phone, content, date)`
    pub(crate) fn inbox(messages: &[(u32, &str, &str, &str)]) -> String {
        let mut body = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><response><Count>{}</Count><Messages>",
            messages.len()
        );
        for (index, phone, content, date) in messages {
            body.push_str(&format!(
                "<Message><Smstat>0</Smstat><Index>{index}</Index><Phone>{phone}</Phone><Content>{content}</Content><Date>{date}</Date><Sca></Sca><SaveType>4</SaveType><Priority>0</Priority><SmsType>1</SmsType></Message>"
            ));
        }
        body.push_str("</Messages></response>");
        body
    }
}
