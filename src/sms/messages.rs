//! Fixed HiLink message shapes: request envelopes, the inbox listing and
//! the token embedded in the inbox page.

use chrono::NaiveDateTime;
use quick_xml::escape::escape;
use serde::Deserialize;

use super::transport::GatewayError;

pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const SEND_SUCCESS_MARKER: &str = "<response>OK</response>";
pub const TOKEN_ATTRIBUTE: &str = "csrf_token";

pub const LIST_REQUEST: &str = "<request><PageIndex>1</PageIndex><ReadCount>10</ReadCount><BoxType>1</BoxType><SortType>0</SortType><Ascending>0</Ascending><UnreadPreferred>0</UnreadPreferred></request>";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HiLinkMessage {
    #[serde(rename = "Index")]
    pub index: u32,
    #[serde(rename = "Phone", default)]
    pub phone: String,
    #[serde(rename = "Content", default)]
    pub content: String,
    #[serde(rename = "Date", default)]
    pub date: String,
    #[serde(rename = "Smstat", default)]
    pub status: i32,
}

impl HiLinkMessage {
    pub fn received_at(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(self.date.trim(), DATE_FORMAT).ok()
    }
}

#[derive(Debug, Deserialize)]
struct MessageListResponse {
    #[serde(rename = "Count")]
    count: u32,
    #[serde(rename = "Messages", default)]
    messages: MessageList,
}

#[derive(Debug, Default, Deserialize)]
struct MessageList {
    #[serde(rename = "Message", default)]
    list: Vec<HiLinkMessage>,
}

/// Decodes an `sms-list` response; error documents fail to decode
pub fn decode_message_list(body: &str) -> Result<Vec<HiLinkMessage>, GatewayError> {
    let response: MessageListResponse = quick_xml::de::from_str(body)?;
    tracing::debug!(
        "sms: inbox reports {} messages, {} listed",
        response.count,
        response.messages.list.len()
    );
    Ok(response.messages.list)
}

pub fn send_request(phone: &str, content: &str, now: NaiveDateTime) -> String {
    format!(
        "<request><Index>-1</Index><Phones><Phone>{}</Phone></Phones><Sca/><Content>{}</Content><Length>{}</Length><Reserved>1</Reserved><Date>{}</Date></request>",
        escape(phone),
        escape(content),
        content.chars().count(),
        now.format(DATE_FORMAT)
    )
}

/// Finds the quoted value that follows the quoted `csrf_token` attribute
pub fn extract_token(page: &str) -> Option<String> {
    let parts: Vec<&str> = page.split('"').collect();
    // quoted strings sit at the odd indices
    parts
        .iter()
        .enumerate()
        .skip(1)
        .step_by(2)
        .find(|(_, part)| **part == TOKEN_ATTRIBUTE)
        .and_then(|(idx, _)| parts.get(idx + 2))
        .filter(|token| !token.is_empty())
        .map(|token| token.to_string())
}
