//! MQTT adapter: a [`Publisher`] backed by `rumqttc` and the event loop
//! that feeds PoE commands from the broker to the executor.

use std::time::Duration;

use futures_util::future::BoxFuture;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use secrecy::ExposeSecret;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use omabus_config::{MqttSection, resolve_mqtt_password};
use omabus_core::{
    CommandExecutor, CommandOutcome, PortCommand, Publication, PublishError, Publisher, TopicError,
    Topics,
};

/// Requests buffered between the client handles and the event loop.
const REQUEST_CAPACITY: usize = 64;
/// Pause after a connection error before polling (and reconnecting) again.
const RECONNECT_DELAY: Duration = Duration::from_secs(2);
/// How long in-flight commands may keep running after shutdown starts.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

// ── Connection ───────────────────────────────────────────────────────

pub fn mqtt_options(mqtt: &MqttSection) -> MqttOptions {
    let mut opts = MqttOptions::new(&mqtt.client_id, &mqtt.host, mqtt.port);
    opts.set_keep_alive(Duration::from_secs(mqtt.keep_alive));
    if let Some(ref username) = mqtt.username {
        let password = match resolve_mqtt_password(mqtt) {
            Some(p) => p.expose_secret().to_owned(),
            None => {
                warn!(username = %username, "no MQTT password resolved, connecting with an empty one");
                String::new()
            }
        };
        opts.set_credentials(username, password);
    }
    opts
}

/// Create the client and its (not yet polled) event loop.
///
/// Nothing touches the network until the event loop is polled.
pub fn connect(mqtt: &MqttSection) -> (MqttPublisher, EventLoop) {
    let (client, eventloop) = AsyncClient::new(mqtt_options(mqtt), REQUEST_CAPACITY);
    info!(host = %mqtt.host, port = mqtt.port, client_id = %mqtt.client_id, "MQTT client created");
    (MqttPublisher { client }, eventloop)
}

// ── Publisher ────────────────────────────────────────────────────────

/// Publishes through a shared `rumqttc` client at QoS 1.
#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
}

impl MqttPublisher {
    pub fn client(&self) -> &AsyncClient {
        &self.client
    }
}

impl Publisher for MqttPublisher {
    fn publish(&self, publication: Publication) -> BoxFuture<'_, Result<(), PublishError>> {
        Box::pin(async move {
            self.client
                .publish(
                    publication.topic,
                    QoS::AtLeastOnce,
                    publication.retain,
                    publication.payload.into_bytes(),
                )
                .await
                .map_err(|e| PublishError::Unavailable(e.to_string()))
        })
    }
}

// ── Event loop ───────────────────────────────────────────────────────

/// Drive the connection until `cancel` fires.
///
/// Subscribes to the command topics on every (re)connect when an
/// executor is given. Each command runs on its own task, so a slow
/// sequence never blocks the connection.
pub async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    topics: Topics,
    executor: Option<CommandExecutor>,
    cancel: CancellationToken,
) {
    let mut commands = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            Some(_) = commands.join_next(), if !commands.is_empty() => {}
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("MQTT connected");
                    if executor.is_some() {
                        subscribe_commands(&client, &topics);
                    }
                }
                Ok(Event::Incoming(Packet::Publish(p))) => {
                    let Some(executor) = executor.as_ref() else {
                        continue;
                    };
                    if let Some(command) = command_from(&topics, &p.topic, &p.payload) {
                        let executor = executor.clone();
                        commands.spawn(async move { dispatch(&executor, command).await });
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "MQTT connection error");
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(RECONNECT_DELAY) => {}
                    }
                }
            }
        }
    }

    drain_commands(&mut eventloop, &mut commands, SHUTDOWN_GRACE).await;
    if let Err(e) = client.try_disconnect() {
        debug!(error = %e, "MQTT disconnect not sent");
    }
    debug!("MQTT event loop stopped");
}

/// Let in-flight commands finish, polling the connection so their
/// publications keep flowing. Whatever is still running after `grace`
/// is aborted.
async fn drain_commands(eventloop: &mut EventLoop, commands: &mut JoinSet<()>, grace: Duration) {
    if commands.is_empty() {
        return;
    }
    let drain = async {
        loop {
            tokio::select! {
                joined = commands.join_next() => {
                    if joined.is_none() {
                        break;
                    }
                }
                event = eventloop.poll() => {
                    if let Err(e) = event {
                        debug!(error = %e, "MQTT connection error while draining");
                        tokio::time::sleep(RECONNECT_DELAY).await;
                    }
                }
            }
        }
    };
    if tokio::time::timeout(grace, drain).await.is_err() {
        warn!(pending = commands.len(), "aborting unfinished PoE commands");
        commands.abort_all();
        while commands.join_next().await.is_some() {}
    }
}

fn subscribe_commands(client: &AsyncClient, topics: &Topics) {
    // try_subscribe: this task is the one draining the request queue
    for filter in topics.command_filters() {
        match client.try_subscribe(filter.as_str(), QoS::AtLeastOnce) {
            Ok(()) => debug!(filter = %filter, "subscribed"),
            Err(e) => warn!(filter = %filter, error = %e, "subscribe failed"),
        }
    }
}

fn command_from(topics: &Topics, topic: &str, payload: &[u8]) -> Option<PortCommand> {
    match topics.parse_command(topic, payload) {
        Ok(command) => Some(command),
        Err(TopicError::NotACommand(_)) => {
            debug!(topic = %topic, "ignoring message");
            None
        }
        Err(e) => {
            warn!(topic = %topic, error = %e, "malformed PoE command");
            None
        }
    }
}

async fn dispatch(executor: &CommandExecutor, command: PortCommand) {
    let PortCommand {
        device_key,
        port,
        desired_on,
    } = command;
    match executor.set_port_power(&device_key, port, desired_on).await {
        CommandOutcome::Applied => {}
        CommandOutcome::Failed { step, error } => {
            warn!(device = %device_key, port, %step, error = %error, "PoE command failed");
        }
        outcome => debug!(device = %device_key, port, ?outcome, "PoE command dropped"),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::task::JoinSet;

    use omabus_config::MqttSection;
    use omabus_core::{PortCommand, Publication, Topics};

    use super::{Publisher, command_from, connect, drain_commands, mqtt_options};

    #[test]
    fn options_follow_the_mqtt_section() {
        let section = MqttSection {
            host: "broker.lan".into(),
            port: 8883,
            client_id: "bridge-1".into(),
            keep_alive: 45,
            ..MqttSection::default()
        };
        let opts = mqtt_options(&section);
        assert_eq!(opts.broker_address(), ("broker.lan".to_owned(), 8883));
        assert_eq!(opts.client_id(), "bridge-1");
        assert_eq!(opts.keep_alive(), Duration::from_secs(45));
    }

    #[test]
    fn commands_are_parsed_and_other_topics_ignored() {
        let topics = Topics::new("omada");
        assert_eq!(
            command_from(&topics, "omada/switch/sw/ports/port3/poeState/set", b"OFF"),
            Some(PortCommand {
                device_key: "sw".into(),
                port: 3,
                desired_on: false,
            })
        );
        assert_eq!(
            command_from(&topics, "omada/switch/sw/ports/port3/poeState", b"1"),
            None
        );
        assert_eq!(
            command_from(&topics, "omada/switch/sw/ports/port3/poeStateSet", b"maybe"),
            None
        );
    }

    #[tokio::test]
    async fn shutdown_does_not_wait_forever_on_blocked_publishes() {
        // Nothing listens on this port, so queued publishes are never sent.
        let section = MqttSection {
            host: "127.0.0.1".into(),
            port: 1,
            ..MqttSection::default()
        };
        let (publisher, mut eventloop) = connect(&section);

        let mut commands = JoinSet::new();
        commands.spawn(async move {
            for n in 0..500 {
                let publication = Publication {
                    topic: format!("omada/switch/sw/ports/port{n}/poeState"),
                    payload: "1".into(),
                    retain: false,
                };
                let _ = publisher.publish(publication).await;
            }
        });

        tokio::time::timeout(
            Duration::from_secs(5),
            drain_commands(&mut eventloop, &mut commands, Duration::from_millis(200)),
        )
        .await
        .unwrap_or_else(|_| panic!("draining did not finish"));
        assert!(commands.is_empty());
    }
}
