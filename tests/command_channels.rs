use async_trait::async_trait;
use chrono::NaiveDate;
use fortino::command::{CommandOutcome, CommandRouter};
use fortino::config::OneWireSensorConfig;
use fortino::sensors::{OneWireBus, TemperatureReader};
use fortino::sms::{
    CommandHandler, GatewayError, GatewayTransport, HiLinkSession, PollOutcome, SmsPoller,
};
use fortino::thermostat::SetpointHandle;
use std::io;
use std::sync::{Arc, Mutex};

const OWNER: &str = "+393331234567";

struct OneSensor;

#[async_trait]
impl OneWireBus for OneSensor {
    async fn read_device(&self, device_id: &str) -> io::Result<String> {
        if device_id == "28-0316a2799eff" {
            Ok("aa : crc=1c YES\naa t=17312\n".to_string())
        } else {
            Err(io::Error::new(io::ErrorKind::NotFound, device_id.to_string()))
        }
    }
}

/// Modem with a mutable inbox that records every reply
#[derive(Default)]
struct Modem {
    inbox: Mutex<Vec<(u32, String, String)>>,
    replies: Mutex<Vec<String>>,
}

impl Modem {
    fn deliver(&self, index: u32, phone: &str, content: &str) {
        self.inbox
            .lock()
            .unwrap()
            .insert(0, (index, phone.to_string(), content.to_string()));
    }

    fn replies(&self) -> Vec<String> {
        self.replies.lock().unwrap().clone()
    }
}

#[async_trait]
impl GatewayTransport for Modem {
    async fn get_cookie(&self, _path: &str, _name: &str) -> Result<Option<String>, GatewayError> {
        Ok(Some("session-cookie".to_string()))
    }

    async fn get_page(&self, _path: &str, _session: &str) -> Result<String, GatewayError> {
        Ok(r#"<meta name="csrf_token" content="token-1"/>"#.to_string())
    }

    async fn post_xml(
        &self,
        path: &str,
        body: String,
        _session: &str,
        _token: &str,
    ) -> Result<String, GatewayError> {
        if path.ends_with("send-sms") {
            self.replies.lock().unwrap().push(body);
            return Ok("<response>OK</response>".to_string());
        }
        let inbox = self.inbox.lock().unwrap();
        let mut xml = format!("<response><Count>{}</Count><Messages>", inbox.len());
        for (index, phone, content) in inbox.iter() {
            xml.push_str(&format!(
                "<Message><Smstat>0</Smstat><Index>{index}</Index><Phone>{phone}</Phone><Content>{content}</Content><Date>2024-01-05 18:00:00</Date></Message>"
            ));
        }
        xml.push_str("</Messages></response>");
        Ok(xml)
    }
}

fn reader() -> TemperatureReader {
    TemperatureReader::new(
        Arc::new(OneSensor),
        vec![OneWireSensorConfig {
            name: "living".to_string(),
            id: "28-0316a2799eff".to_string(),
            sensor_type: "DS18B20".to_string(),
        }],
    )
}

#[tokio::test]
async fn sms_conversation_updates_shared_setpoint() {
    let now = NaiveDate::from_ymd_opt(2024, 1, 5)
        .and_then(|d| d.and_hms_opt(18, 5, 0))
        .unwrap();
    let modem = Arc::new(Modem::default());
    let setpoint = SetpointHandle::new(15.0).unwrap();
    let mut poller = SmsPoller::new(
        HiLinkSession::new(modem.clone()),
        CommandHandler::new(setpoint.clone(), reader()),
        vec![OWNER.to_string()],
    );

    modem.deliver(100, OWNER, "temp");
    assert!(matches!(
        poller.poll_once(now).await,
        PollOutcome::Dispatched { index: 100, .. }
    ));

    // nothing new: the same message must not be handled twice
    assert_eq!(poller.poll_once(now).await, PollOutcome::NoProgress);

    modem.deliver(101, OWNER, "TERM 19");
    assert!(matches!(
        poller.poll_once(now).await,
        PollOutcome::Dispatched { index: 101, .. }
    ));
    assert_eq!(setpoint.get().await, 19.0);

    modem.deliver(102, "+10000000", "term 8");
    assert_eq!(
        poller.poll_once(now).await,
        PollOutcome::Rejected { index: 102 }
    );
    assert_eq!(setpoint.get().await, 19.0);

    let replies = modem.replies();
    assert_eq!(replies.len(), 2);
    assert!(replies[0].contains("<Content>28-0316a2799eff: 17.3"));
    assert!(replies[1].contains("<Content>Ok, temp = 19 C</Content>"));
    assert!(replies.iter().all(|r| r.contains(OWNER)));
}

#[tokio::test]
async fn mqtt_and_sms_share_one_setpoint() {
    let setpoint = SetpointHandle::new(18.0).unwrap();
    let router = CommandRouter::new(setpoint.clone());
    let handler = CommandHandler::new(setpoint.clone(), reader());

    assert_eq!(
        router
            .handle("cmnd/fortino/TEMPTARGETSET", b"12.5")
            .await
            .unwrap(),
        CommandOutcome::SetpointChanged(12.5)
    );
    assert_eq!(
        handler.respond(OWNER, "term").await.as_deref(),
        Some("t_setpoint = 12.5")
    );
}
