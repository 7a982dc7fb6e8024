use async_trait::async_trait;
use rfp_gateway::{Bridge, BridgeError, InboundCommand};
use std::io::{self, BufRead};
use std::thread;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

/// MQTT-style filter match: `+` matches one level, a trailing `#` the rest.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut levels = topic.split('/');
    for f in filter.split('/') {
        match (f, levels.next()) {
            ("#", _) => return true,
            ("+", Some(_)) => {}
            (f, Some(t)) if f == t => {}
            _ => return false,
        }
    }
    levels.next().is_none()
}

/// Prints every publication as one `topic payload` line on stdout.
pub struct StdoutBridge {
    out: Mutex<tokio::io::Stdout>,
}

impl Default for StdoutBridge {
    fn default() -> Self {
        Self {
            out: Mutex::new(tokio::io::stdout()),
        }
    }
}

#[async_trait]
impl Bridge for StdoutBridge {
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), BridgeError> {
        let line = format!("{topic} {payload}\n");
        let mut out = self.out.lock().await;
        out.write_all(line.as_bytes())
            .await
            .map_err(|e| BridgeError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;
        out.flush().await.map_err(|_| BridgeError::Disconnected)
    }
}

/// Read `topic token` lines from stdin on a plain thread and forward those
/// matching `filter`. The thread is detached so a pending read never holds up
/// process exit.
pub fn spawn_stdin_commands(filter: String, tx: mpsc::Sender<InboundCommand>) {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!(error = %e, "stdin read failed");
                    break;
                }
            };
            let Some((topic, token)) = line.trim().split_once(char::is_whitespace) else {
                if !line.trim().is_empty() {
                    warn!(%line, "expected `topic token`");
                }
                continue;
            };
            if !topic_matches(&filter, topic) {
                debug!(topic, "not a subscribed topic, ignored");
                continue;
            }
            if tx
                .blocking_send(InboundCommand::new(topic, token.trim()))
                .is_err()
            {
                break;
            }
        }
        info!("stdin closed");
    });
}

#[cfg(feature = "mqtt")]
pub mod mqtt {
    use super::*;
    use rfp_protocol::BrokerConfig;
    use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
    use std::time::Duration;
    use tokio::task::JoinHandle;

    pub struct MqttBridge {
        client: AsyncClient,
    }

    impl MqttBridge {
        /// Connect and start the event loop task. Messages on the subscribed
        /// filter are forwarded to `commands`; the subscription is renewed on
        /// every (re)connection.
        pub fn connect(
            cfg: &BrokerConfig,
            commands: mpsc::Sender<InboundCommand>,
        ) -> (Self, JoinHandle<()>) {
            let mut opts = MqttOptions::new(&cfg.client_id, &cfg.address, cfg.port);
            opts.set_keep_alive(Duration::from_secs(30));
            if !cfg.username.is_empty() {
                opts.set_credentials(&cfg.username, &cfg.password);
            }
            let (client, mut eventloop) = AsyncClient::new(opts, 10);
            let sub_client = client.clone();
            let filter = cfg.subscribe.clone();
            let address = format!("{}:{}", cfg.address, cfg.port);

            let task = tokio::spawn(async move {
                loop {
                    match eventloop.poll().await {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            info!(%address, %filter, "connected to broker");
                            if let Err(e) =
                                sub_client.try_subscribe(filter.as_str(), QoS::AtLeastOnce)
                            {
                                warn!(error = %e, "subscribe failed");
                            }
                        }
                        Ok(Event::Incoming(Packet::Publish(p))) => {
                            let payload = String::from_utf8_lossy(&p.payload).into_owned();
                            let cmd = InboundCommand::new(p.topic, payload);
                            if commands.send(cmd).await.is_err() {
                                break;
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(%address, error = %e, "broker connection error");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            });
            (Self { client }, task)
        }
    }

    #[async_trait]
    impl Bridge for MqttBridge {
        async fn publish(&self, topic: &str, payload: &str) -> Result<(), BridgeError> {
            self.client
                .publish(topic, QoS::AtLeastOnce, false, payload.as_bytes().to_vec())
                .await
                .map_err(|e| BridgeError::Publish {
                    topic: topic.to_string(),
                    reason: e.to_string(),
                })
        }
    }
}
