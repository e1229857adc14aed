//! HiLink session and token lifecycle.

use chrono::NaiveDateTime;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::messages::{self, HiLinkMessage, LIST_REQUEST, SEND_SUCCESS_MARKER};
use super::transport::{GatewayError, GatewayTransport};

pub const INDEX_PAGE: &str = "/html/index.html";
pub const INBOX_PAGE: &str = "/html/smsinbox.html";
pub const SEND_ENDPOINT: &str = "/api/sms/send-sms";
pub const LIST_ENDPOINT: &str = "/api/sms/sms-list";
pub const SESSION_COOKIE: &str = "SessionID";

/// Credentials held against the gateway
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Unauthenticated,
    SessionOnly {
        session: String,
    },
    Ready {
        session: String,
        token: String,
    },
}

impl SessionState {
    /// A new session cookie always drops any token bound to the old one
    pub fn acquire_session(self, session: String) -> Self {
        SessionState::SessionOnly { session }
    }

    pub fn acquire_token(self, token: String) -> Self {
        match self {
            SessionState::Unauthenticated => SessionState::Unauthenticated,
            SessionState::SessionOnly { session } | SessionState::Ready { session, .. } => {
                SessionState::Ready { session, token }
            }
        }
    }

    pub fn invalidate(self) -> Self {
        SessionState::Unauthenticated
    }

    pub fn session(&self) -> Option<&str> {
        match self {
            SessionState::Unauthenticated => None,
            SessionState::SessionOnly { session } | SessionState::Ready { session, .. } => {
                Some(session)
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, SessionState::Ready { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Sent,
    Unexpected(String),
}

pub struct HiLinkSession {
    transport: Arc<dyn GatewayTransport>,
    state: SessionState,
    last_index: Option<u32>,
}

impl HiLinkSession {
    pub fn new(transport: Arc<dyn GatewayTransport>) -> Self {
        Self {
            transport,
            state: SessionState::Unauthenticated,
            last_index: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn last_index(&self) -> Option<u32> {
        self.last_index
    }

    /// Records a processed index; the stored index never moves backwards
    pub fn commit_index(&mut self, index: u32) {
        self.last_index = Some(self.last_index.map_or(index, |last| last.max(index)));
    }

    pub fn invalidate(&mut self) {
        if self.state != SessionState::Unauthenticated {
            debug!("sms: dropping gateway credentials");
        }
        self.state = std::mem::take(&mut self.state).invalidate();
    }

    pub async fn fetch_session(&mut self) -> Result<(), GatewayError> {
        let cookie = self
            .transport
            .get_cookie(INDEX_PAGE, SESSION_COOKIE)
            .await?
            .filter(|c| !c.is_empty())
            .ok_or(GatewayError::MissingCookie(SESSION_COOKIE))?;
        info!("sms: acquired gateway session");
        self.state = std::mem::take(&mut self.state).acquire_session(cookie);
        Ok(())
    }

    pub async fn fetch_token(&mut self) -> Result<(), GatewayError> {
        let session = self.state.session().ok_or(GatewayError::NotReady)?.to_owned();
        let page = self.transport.get_page(INBOX_PAGE, &session).await?;
        let token = messages::extract_token(&page).ok_or(GatewayError::MissingToken(INBOX_PAGE))?;
        debug!("sms: acquired verification token");
        self.state = std::mem::take(&mut self.state).acquire_token(token);
        Ok(())
    }

    /// Advances the credentials one step per missing piece
    pub async fn ensure_ready(&mut self) -> Result<(), GatewayError> {
        if self.state == SessionState::Unauthenticated {
            self.fetch_session().await?;
        }
        if !self.state.is_ready() {
            self.fetch_token().await?;
        }
        Ok(())
    }

    /// Starts over with a fresh session and token
    pub async fn refresh(&mut self) -> Result<(), GatewayError> {
        self.invalidate();
        self.ensure_ready().await
    }

    fn credentials(&self) -> Result<(String, String), GatewayError> {
        match &self.state {
            SessionState::Ready { session, token } => Ok((session.clone(), token.clone())),
            _ => Err(GatewayError::NotReady),
        }
    }

    pub async fn send_message(
        &self,
        phone: &str,
        content: &str,
        now: NaiveDateTime,
    ) -> Result<SendOutcome, GatewayError> {
        let (session, token) = self.credentials()?;
        let body = messages::send_request(phone, content, now);
        let response = self
            .transport
            .post_xml(SEND_ENDPOINT, body, &session, &token)
            .await?;
        if response.contains(SEND_SUCCESS_MARKER) {
            info!("sms: sent reply to {}", phone);
            Ok(SendOutcome::Sent)
        } else {
            warn!("sms: unexpected send response: {}", response.trim());
            Ok(SendOutcome::Unexpected(response))
        }
    }

    /// Lists the inbox, newest first as the gateway orders it
    pub async fn fetch_messages(&self) -> Result<Vec<HiLinkMessage>, GatewayError> {
        let (session, token) = self.credentials()?;
        let response = self
            .transport
            .post_xml(LIST_ENDPOINT, LIST_REQUEST.to_string(), &session, &token)
            .await?;
        messages::decode_message_list(&response)
    }
}
