use std::{sync::Arc, time::Duration};

use rumqttc::{
    AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, SubAck, SubscribeFilter,
    SubscribeReasonCode,
};
use tokio::sync::oneshot;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::{error::BrokerSubscribeError, router::TopicRouter};

const REQUEST_CAPACITY: usize = 10;
const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const DISCONNECT_GRACE: Duration = Duration::from_secs(1);

pub struct MqttHandler {
    client: AsyncClient,
    router: Arc<TopicRouter>,
    topics: Vec<String>,
}

impl MqttHandler {
    pub fn new(client: AsyncClient, router: Arc<TopicRouter>) -> Self {
        let topics = router.topics();

        Self {
            client,
            router,
            topics,
        }
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    pub async fn handle_event(&self, event: Event) {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) => {
                info!(code = ?ack.code, "connected to broker");
                // Sessions are clean, so every (re)connect subscribes again.
                if let Err(e) = self.subscribe().await {
                    error!(error = %e, "failed to subscribe");
                }
            }
            Event::Incoming(Packet::SubAck(ack)) => {
                for e in self.rejected_topics(&ack) {
                    error!(error = %e, "failed to subscribe");
                }
            }
            Event::Incoming(Packet::Publish(msg)) => {
                // The write runs detached; the router already logged its outcome.
                drop(self.router.handle_message(&msg.topic, &msg.payload).await);
            }
            Event::Incoming(packet) => trace!(?packet, "incoming packet"),
            Event::Outgoing(outgoing) => trace!(?outgoing, "outgoing packet"),
        }
    }

    /// Requests every metric topic at QoS 1. A failed request is returned to
    /// the caller and not retried.
    pub async fn subscribe(&self) -> Result<(), BrokerSubscribeError> {
        let filters = self
            .topics
            .iter()
            .map(|topic| SubscribeFilter::new(topic.clone(), QoS::AtLeastOnce));

        self.client
            .subscribe_many(filters)
            .await
            .map_err(|source| BrokerSubscribeError::Request {
                topic: self.topics.join(","),
                source,
            })?;
        debug!(topics = ?self.topics, "subscribe request sent");

        Ok(())
    }

    /// Topics the broker refused in `ack`. Accepted ones are logged.
    pub fn rejected_topics(&self, ack: &SubAck) -> Vec<BrokerSubscribeError> {
        let mut rejected = Vec::new();

        for (topic, code) in self.topics.iter().zip(&ack.return_codes) {
            match code {
                SubscribeReasonCode::Success(qos) => {
                    info!(topic = %topic, ?qos, "subscribed to topic")
                }
                SubscribeReasonCode::Failure => rejected.push(BrokerSubscribeError::Rejected {
                    topic: topic.clone(),
                }),
            }
        }

        rejected
    }
}

pub struct MqttListener {
    eventloop: EventLoop,
    handler: MqttHandler,
}

impl MqttListener {
    pub fn new(host: &str, port: u16, keep_alive: Duration, router: Arc<TopicRouter>) -> Self {
        let client_id = format!("env-telemetry-{}", Uuid::new_v4());
        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(keep_alive);

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);

        Self::from_client(client, eventloop, router)
    }

    pub fn from_client(client: AsyncClient, eventloop: EventLoop, router: Arc<TopicRouter>) -> Self {
        Self {
            eventloop,
            handler: MqttHandler::new(client, router),
        }
    }

    pub fn client(&self) -> AsyncClient {
        self.handler.client.clone()
    }

    pub fn handler(&self) -> &MqttHandler {
        &self.handler
    }

    /// Polls the broker connection until `shutdown` fires. Connection errors
    /// are logged and polling resumes, which makes rumqttc reconnect.
    pub async fn run(&mut self, mut shutdown: oneshot::Receiver<()>) {
        let Self { eventloop, handler } = self;

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown signal received");
                    break;
                }
                event = eventloop.poll() => {
                    match event {
                        Ok(event) => handler.handle_event(event).await,
                        Err(e) => {
                            error!(error = %e, "broker connection error");
                            tokio::time::sleep(RECONNECT_DELAY).await;
                        }
                    }
                }
            }
        }

        if let Err(e) = handler.client.disconnect().await {
            warn!(error = %e, "failed to request broker disconnect");
            return;
        }
        // Flush the disconnect packet.
        let _ = tokio::time::timeout(DISCONNECT_GRACE, eventloop.poll()).await;
    }
}
