//! Realtime plane: subscriptions and client messages.
//!
//! Admission is `can_read`. Once subscribed, clients send free-text case
//! messages (fanned out to the other subscribers), advisory element locks
//! (re-broadcast, never enforced), and `ping` keep-alives (ignored). A
//! message that fails to parse is answered with an error on the offending
//! channel only; the connection stays up.

use serde_json::{Value, json};

use crate::api::realtime::{ClientMessage, MSG_CASE, WireMessage};
use crate::core::{CaseId, Role};

use super::ops::OpError;
use super::state::{Principal, Service};
use super::topic::TopicSubscription;

impl Service {
    pub fn subscribe(
        &self,
        principal: &Principal,
        case: CaseId,
        channel_key: &str,
    ) -> Result<TopicSubscription, OpError> {
        self.require(principal, case, Role::View)?;
        Ok(self
            .hub()
            .subscribe(case, principal.id, &principal.username, channel_key)?)
    }

    pub fn unsubscribe(&self, case: CaseId, channel_key: &str) -> Result<(), OpError> {
        Ok(self.hub().unsubscribe(case, channel_key)?)
    }

    /// Dispatch one raw client message from a subscribed channel.
    pub fn handle_client_message(
        &self,
        principal: &Principal,
        case: CaseId,
        channel_key: &str,
        raw: &str,
    ) -> Result<(), OpError> {
        let message: ClientMessage = match serde_json::from_str(raw) {
            Ok(message) => message,
            Err(e) => {
                let reply = WireMessage::parse_error(&e.to_string());
                self.hub().send_to(case, channel_key, &reply)?;
                return Ok(());
            }
        };

        if message.is_ping() {
            return Ok(());
        }

        if message.is_element_lock() {
            let payload = json!({
                "element_lock": true,
                "element_id": message.element_id,
                "action": message.action,
            });
            let wire =
                WireMessage::new(MSG_CASE, payload).from_user(principal.id, &principal.username);
            self.hub().publish_except(case, channel_key, &wire)?;
            return Ok(());
        }

        if let Some(content) = message.content {
            let wire = WireMessage::new(MSG_CASE, Value::String(content))
                .from_user(principal.id, &principal.username);
            self.hub().publish_except(case, channel_key, &wire)?;
            return Ok(());
        }

        let reply = WireMessage::parse_error("message carries neither content nor element_lock");
        self.hub().send_to(case, channel_key, &reply)?;
        Ok(())
    }
}
