//! MQTT ingress client

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, Publish, QoS};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{Backoff, TransportConfig, TransportError};
use crate::telemetry::RawMessage;

/// Capacity of the rumqttc request channel; only subscribes go through it
const REQUEST_CAPACITY: usize = 10;

/// Subscribes to the configured filters and forwards every publish
///
/// The pipeline queue gets every message and applies backpressure to the
/// event loop when full. Taps are best-effort: a full tap drops the message
/// for that tap only.
pub struct MqttIngress {
    config: TransportConfig,
    pipeline: mpsc::Sender<RawMessage>,
    taps: Vec<mpsc::Sender<RawMessage>>,
}

impl MqttIngress {
    pub fn new(config: TransportConfig, pipeline: mpsc::Sender<RawMessage>) -> Self {
        Self {
            config,
            pipeline,
            taps: Vec::new(),
        }
    }

    /// Add a secondary consumer that must never slow the pipeline down
    pub fn with_tap(mut self, tap: mpsc::Sender<RawMessage>) -> Self {
        self.taps.push(tap);
        self
    }

    /// Spawn the event loop
    pub fn start(self) -> JoinHandle<()> {
        tracing::info!(
            host = %self.config.host,
            port = self.config.port,
            subscriptions = ?self.config.subscriptions,
            "Starting MQTT ingress"
        );
        tokio::spawn(self.run())
    }

    fn options(&self) -> MqttOptions {
        let mut options =
            MqttOptions::new(&self.config.client_id, &self.config.host, self.config.port);
        options.set_keep_alive(self.config.keep_alive);
        options.set_clean_session(true);
        options
    }

    async fn run(self) {
        let (client, mut eventloop) = AsyncClient::new(self.options(), REQUEST_CAPACITY);
        let mut backoff = Backoff::new(self.config.reconnect_initial, self.config.reconnect_max);

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    backoff.reset();
                    tracing::info!(code = ?ack.code, "Connected to MQTT broker");
                    if let Err(e) = self.subscribe(&client) {
                        tracing::warn!(error = %e, "Failed to queue subscriptions");
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    if let Err(e) = self.dispatch(raw_message(&publish)).await {
                        tracing::info!(error = %e, "Stopping MQTT ingress");
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    let delay = backoff.next_delay();
                    tracing::warn!(
                        error = %TransportError::from(e),
                        retry_in_ms = delay.as_millis() as u64,
                        "MQTT connection lost"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Queue subscribe requests without waiting on the event loop we run in
    fn subscribe(&self, client: &AsyncClient) -> Result<(), TransportError> {
        for filter in &self.config.subscriptions {
            client.try_subscribe(filter.as_str(), QoS::AtMostOnce)?;
            tracing::debug!(filter = %filter, "Subscribed");
        }
        Ok(())
    }

    async fn dispatch(&self, msg: RawMessage) -> Result<(), TransportError> {
        for tap in &self.taps {
            if let Err(mpsc::error::TrySendError::Full(_)) = tap.try_send(msg.clone()) {
                tracing::debug!(topic = %msg.topic, "Tap queue full, message dropped");
            }
        }

        self.pipeline
            .send(msg)
            .await
            .map_err(|_| TransportError::QueueClosed)
    }
}

fn raw_message(publish: &Publish) -> RawMessage {
    RawMessage::new(publish.topic.clone(), publish.payload.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ingress(pipeline: mpsc::Sender<RawMessage>) -> MqttIngress {
        MqttIngress::new(TransportConfig::default(), pipeline)
    }

    #[test]
    fn test_raw_message_from_publish() {
        let publish = Publish::new(
            "/server/t/PIR1/properties/motion",
            QoS::AtMostOnce,
            r#"{"motion":1}"#,
        );
        let msg = raw_message(&publish);

        assert_eq!(msg.topic, "/server/t/PIR1/properties/motion");
        assert_eq!(&msg.payload[..], br#"{"motion":1}"#);
        assert!(msg.received_at > 0);
    }

    #[tokio::test]
    async fn test_dispatch_reaches_pipeline_and_tap() {
        let (tx, mut rx) = mpsc::channel(4);
        let (tap_tx, mut tap_rx) = mpsc::channel(4);
        let ingress = ingress(tx).with_tap(tap_tx);

        ingress
            .dispatch(RawMessage::new("/server/t/PIR1/properties/motion", "{}"))
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap().topic, "/server/t/PIR1/properties/motion");
        assert!(tap_rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_full_tap_does_not_block_pipeline() {
        let (tx, mut rx) = mpsc::channel(4);
        let (tap_tx, mut tap_rx) = mpsc::channel(1);
        let ingress = ingress(tx).with_tap(tap_tx);

        for i in 0..3 {
            ingress
                .dispatch(RawMessage::new(format!("/server/t/PIR{}/properties/motion", i), "{}"))
                .await
                .unwrap();
        }

        for _ in 0..3 {
            assert!(rx.recv().await.is_some());
        }
        assert!(tap_rx.recv().await.is_some());
        assert!(tap_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_pipeline_stops_dispatch() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let result = ingress(tx).dispatch(RawMessage::new("t", "{}")).await;
        assert!(matches!(result, Err(TransportError::QueueClosed)));
    }

    #[test]
    fn test_options_follow_config() {
        let (tx, _rx) = mpsc::channel(1);
        let options = ingress(tx).options();

        assert_eq!(options.broker_address(), ("localhost".to_string(), 1883));
        assert_eq!(options.client_id(), "sensorcast");
    }
}
