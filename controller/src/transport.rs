use std::time::Duration;

use rumqttc::{AsyncClient, QoS};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use heatpump_common::{DeviceAction, TOPIC_DEVICE_ACTION};

const SEND_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("send timed out after {0:?}")]
    Timeout(Duration),
    #[error("mqtt publish failed: {0}")]
    Publish(#[from] rumqttc::ClientError),
}

/// Best-effort outbound channel to the device. There is no delivery feedback.
pub trait ActionSink {
    async fn send(&mut self, action: DeviceAction) -> Result<(), TransportError>;
}

pub struct MqttActionSink {
    client: AsyncClient,
}

impl MqttActionSink {
    pub fn new(client: AsyncClient) -> Self {
        Self { client }
    }
}

impl ActionSink for MqttActionSink {
    async fn send(&mut self, action: DeviceAction) -> Result<(), TransportError> {
        let publish = self.client.publish(
            TOPIC_DEVICE_ACTION,
            QoS::AtLeastOnce,
            false,
            action.as_payload(),
        );

        tokio::time::timeout(SEND_TIMEOUT, publish)
            .await
            .map_err(|_| TransportError::Timeout(SEND_TIMEOUT))??;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TransportDiagnostics {
    #[serde(rename = "sentActions")]
    pub sent_actions: u64,
    #[serde(rename = "failedActions")]
    pub failed_actions: u64,
    #[serde(rename = "lastError")]
    pub last_error: Option<String>,
}

/// Sends every action in order. A failed send is logged and counted; the
/// remaining actions are still attempted.
pub async fn execute_actions<S: ActionSink>(
    sink: &mut S,
    actions: &[DeviceAction],
    diagnostics: &mut TransportDiagnostics,
) {
    for &action in actions {
        match sink.send(action).await {
            Ok(()) => {
                info!("device action: {}", action.as_payload());
                diagnostics.sent_actions += 1;
            }
            Err(err) => {
                warn!("device action {} failed: {err}", action.as_payload());
                diagnostics.failed_actions += 1;
                diagnostics.last_error = Some(err.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        sent: Vec<DeviceAction>,
        fail_on: Option<DeviceAction>,
    }

    impl ActionSink for RecordingSink {
        async fn send(&mut self, action: DeviceAction) -> Result<(), TransportError> {
            if self.fail_on == Some(action) {
                return Err(TransportError::Timeout(SEND_TIMEOUT));
            }
            self.sent.push(action);
            Ok(())
        }
    }

    #[tokio::test]
    async fn failed_action_does_not_stop_the_rest() {
        let mut sink = RecordingSink {
            fail_on: Some(DeviceAction::PowerOn),
            ..RecordingSink::default()
        };
        let mut diagnostics = TransportDiagnostics::default();

        execute_actions(
            &mut sink,
            &[DeviceAction::PowerOn, DeviceAction::TempUp, DeviceAction::TempUp],
            &mut diagnostics,
        )
        .await;

        assert_eq!(sink.sent, vec![DeviceAction::TempUp, DeviceAction::TempUp]);
        assert_eq!(diagnostics.sent_actions, 2);
        assert_eq!(diagnostics.failed_actions, 1);
        assert!(diagnostics
            .last_error
            .as_deref()
            .is_some_and(|err| err.contains("timed out")));
    }
}
