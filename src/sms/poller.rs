//! Inbox polling loop with index-based deduplication.

use chrono::{Local, NaiveDateTime, TimeDelta};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::commands::CommandHandler;
use super::messages::HiLinkMessage;
use super::session::{HiLinkSession, SendOutcome};

pub const FAST_POLL: Duration = Duration::from_secs(15);
pub const SLOW_POLL: Duration = Duration::from_secs(30 * 60);
pub const STALE_AFTER_MINUTES: i64 = 60;

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Credentials or the inbox listing could not be obtained
    FetchFailed,
    /// Nothing newer than the stored index
    NoProgress,
    Stale { index: u32 },
    Rejected { index: u32 },
    Dispatched { index: u32, reply: Option<String> },
}

pub struct SmsPoller {
    session: HiLinkSession,
    handler: CommandHandler,
    allowed_phones: Vec<String>,
    fast_armed: bool,
}

impl SmsPoller {
    pub fn new(session: HiLinkSession, handler: CommandHandler, allowed_phones: Vec<String>) -> Self {
        Self {
            session,
            handler,
            allowed_phones,
            fast_armed: true,
        }
    }

    pub fn session(&self) -> &HiLinkSession {
        &self.session
    }

    /// Delay before the next poll; the fast cadence is used once per arming
    pub fn next_delay(&mut self) -> Duration {
        if std::mem::replace(&mut self.fast_armed, false) {
            FAST_POLL
        } else {
            SLOW_POLL
        }
    }

    pub fn is_fast_armed(&self) -> bool {
        self.fast_armed
    }

    fn is_allowed(&self, phone: &str) -> bool {
        self.allowed_phones.iter().any(|p| p == phone)
    }

    pub async fn poll_once(&mut self, now: NaiveDateTime) -> PollOutcome {
        let listing = match self.session.ensure_ready().await {
            Ok(()) => self.session.fetch_messages().await,
            Err(e) => Err(e),
        };
        let messages = match listing {
            Ok(messages) => messages,
            Err(e) => {
                warn!("sms: poll failed: {}", e);
                self.session.invalidate();
                return PollOutcome::FetchFailed;
            }
        };

        let Some(newest) = messages.into_iter().max_by_key(|m| m.index) else {
            debug!("sms: inbox is empty");
            return self.no_progress();
        };
        if self.session.last_index().is_some_and(|last| newest.index <= last) {
            debug!("sms: no message newer than {}", newest.index);
            return self.no_progress();
        }

        let index = newest.index;
        let outcome = if is_stale(&newest, now) {
            info!("sms: skipping stale message {} from {}", index, newest.date);
            PollOutcome::Stale { index }
        } else if !self.is_allowed(&newest.phone) {
            warn!("sms: dropping message {} from {}", index, newest.phone);
            PollOutcome::Rejected { index }
        } else {
            let reply = self.dispatch(&newest, now).await;
            PollOutcome::Dispatched { index, reply }
        };
        self.session.commit_index(index);
        outcome
    }

    fn no_progress(&mut self) -> PollOutcome {
        self.session.invalidate();
        self.fast_armed = true;
        PollOutcome::NoProgress
    }

    async fn dispatch(&mut self, message: &HiLinkMessage, now: NaiveDateTime) -> Option<String> {
        info!(
            "sms: message {} from {}: {}",
            message.index, message.phone, message.content
        );
        let reply = self.handler.respond(&message.phone, &message.content).await?;

        if let Err(e) = self.session.refresh().await {
            warn!("sms: could not refresh session before reply: {}", e);
            return Some(reply);
        }
        match self.session.send_message(&message.phone, &reply, now).await {
            Ok(SendOutcome::Sent) | Ok(SendOutcome::Unexpected(_)) => {}
            Err(e) => warn!("sms: reply to {} failed: {}", message.phone, e),
        }
        Some(reply)
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        info!("sms: polling gateway inbox");
        loop {
            let delay = self.next_delay();
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("sms: stopping");
                    break;
                }
                _ = tokio::time::sleep(delay) => {
                    let outcome = self.poll_once(Local::now().naive_local()).await;
                    debug!("sms: poll outcome {:?}", outcome);
                }
            }
        }
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}

/// Unparsable timestamps count as stale
pub fn is_stale(message: &HiLinkMessage, now: NaiveDateTime) -> bool {
    match message.received_at() {
        Some(received) => now - received > TimeDelta::minutes(STALE_AFTER_MINUTES),
        None => true,
    }
}
