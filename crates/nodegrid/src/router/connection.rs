//! Per-connection JSONL loop for a router endpoint.

use std::io::{BufReader, Write};
use std::sync::Weak;

use tracing::{debug, warn};

use super::{MultiplexRouter, ROUTER_TARGET};
use crate::protocol::{Conversation, DispatchError, MessageEnvelope, Response};
use crate::transport::{ConnectionHandler, ConnectionStream, FrameError, read_frame, write_frame};

/// Serves envelopes from one connection until the peer disconnects.
pub(super) struct RouterConnectionHandler {
    router: Weak<MultiplexRouter>,
}

impl RouterConnectionHandler {
    pub(super) fn new(router: Weak<MultiplexRouter>) -> Self {
        Self { router }
    }

    fn serve(&self, stream: ConnectionStream) -> Result<(), DispatchError> {
        let mut writer = stream.try_clone()?;
        let mut reader = BufReader::new(stream);
        while let Some(frame) = read_frame(&mut reader)? {
            let envelope = match parse_envelope(&frame) {
                Ok(envelope) => envelope,
                Err(error) => {
                    warn!(target: ROUTER_TARGET, error = %error, "rejected inbound frame");
                    reply(&mut writer, &Response::failure(&Conversation::unknown(), error.to_failure()))?;
                    continue;
                }
            };
            let Some(router) = self.router.upgrade() else {
                let error = DispatchError::internal("endpoint has been released");
                reply(&mut writer, &Response::failure(&envelope.conversation(), error.to_failure()))?;
                return Ok(());
            };
            let response = router.on_message(&envelope);
            if !envelope.one_way {
                reply(&mut writer, &response)?;
            }
        }
        debug!(target: ROUTER_TARGET, "peer closed connection");
        Ok(())
    }
}

impl ConnectionHandler for RouterConnectionHandler {
    fn handle(&self, stream: ConnectionStream) {
        if let Err(error) = self.serve(stream) {
            warn!(
                target: ROUTER_TARGET,
                error = %error,
                "connection handler error"
            );
        }
    }
}

fn parse_envelope(frame: &[u8]) -> Result<MessageEnvelope, DispatchError> {
    let envelope = MessageEnvelope::parse(frame)?;
    envelope.validate()?;
    Ok(envelope)
}

fn reply<W: Write>(writer: &mut W, response: &Response) -> Result<(), FrameError> {
    write_frame(writer, response)
}
