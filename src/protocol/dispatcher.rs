use crate::core::binary::PayloadReader;
use crate::core::message::OutgoingMessage;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::connection::{MessageHandler, Peer};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

type HandlerFn =
    dyn Fn(&Peer, &mut PayloadReader) -> Result<Option<OutgoingMessage>> + Send + Sync + 'static;

/// Named handler registry routing server messages by tag.
/// A handler may return a reply, which is sent back under the same tag.
pub struct Dispatcher {
    handlers: Arc<RwLock<HashMap<String, Box<HandlerFn>>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn register<F>(&self, tag: &str, handler: F) -> Result<()>
    where
        F: Fn(&Peer, &mut PayloadReader) -> Result<Option<OutgoingMessage>> + Send + Sync + 'static,
    {
        let mut handlers = self.handlers.write().map_err(|_| {
            ProtocolError::Custom(constants::ERR_DISPATCHER_WRITE_LOCK.to_string())
        })?;

        handlers.insert(tag.to_string(), Box::new(handler));
        Ok(())
    }

    pub fn dispatch(
        &self,
        peer: &Peer,
        tag: &str,
        payload: &mut PayloadReader,
    ) -> Result<Option<OutgoingMessage>> {
        let handlers = self.handlers.read().map_err(|_| {
            ProtocolError::Custom(constants::ERR_DISPATCHER_READ_LOCK.to_string())
        })?;

        handlers
            .get(tag)
            .ok_or_else(|| ProtocolError::UnexpectedMessage(tag.to_string()))
            .and_then(|handler| handler(peer, payload))
    }
}

impl MessageHandler for Dispatcher {
    fn on_message(
        &self,
        peer: &Peer,
        tag: &str,
        payload: &mut PayloadReader,
    ) -> Result<Option<OutgoingMessage>> {
        self.dispatch(peer, tag, payload)
    }
}
