//! Outbound path: bus commands to queued frames.

use crate::bridge::InboundCommand;
use crate::dispatcher::DispatchHandle;
use crate::shutdown::wait_for_shutdown;
use rfp_protocol::{encode_command, GatewayMetrics, Registry};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandReport {
    pub accepted: u64,
    pub rejected: u64,
}

pub(crate) struct CommandLoop {
    pub inbound: mpsc::Receiver<InboundCommand>,
    pub registry: Arc<Registry>,
    pub dispatch: DispatchHandle,
    pub metrics: GatewayMetrics,
    pub report: CommandReport,
}

impl CommandLoop {
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> CommandReport {
        loop {
            tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => break,
                next = self.inbound.recv() => match next {
                    Some(cmd) => self.handle(&cmd),
                    None => {
                        info!("command source closed");
                        break;
                    }
                },
            }
        }
        info!(
            accepted = self.report.accepted,
            rejected = self.report.rejected,
            "command handler stopped"
        );
        self.report
    }

    fn handle(&mut self, cmd: &InboundCommand) {
        let Some(name) = cmd.actuator() else {
            warn!(topic = %cmd.topic, "not an action topic, ignored");
            self.reject();
            return;
        };
        let token = cmd.token();
        let frame = match encode_command(&self.registry, name, token) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(actuator = name, token, error = %e, "command rejected");
                self.reject();
                return;
            }
        };
        match self.dispatch.enqueue(frame) {
            Ok(()) => {
                debug!(actuator = name, token, "command queued");
                self.report.accepted += 1;
            }
            Err(e) => {
                warn!(actuator = name, token, error = %e, "command dropped");
                self.reject();
            }
        }
    }

    fn reject(&mut self) {
        self.report.rejected += 1;
        self.metrics.commands_rejected.inc();
    }
}
