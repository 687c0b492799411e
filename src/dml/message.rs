use crate::{
    dml::Record,
    error::{DmlError, EncodingError, Error},
};
use fxhash::FxHashMap;
use internment::Intern;
use std::sync::Arc;
use tracing::{debug, warn};

/// Size of the message header: service id, order, and length word.
pub const MESSAGE_HEADER_SIZE: usize = 4;

/// A registered message descriptor: a handler name, the `(service, order)`
/// pair that identifies it on the wire, and the record its payload follows.
#[derive(Clone, PartialEq, Debug)]
pub struct MessageTemplate {
    name: Intern<String>,
    service_id: u8,
    order: u8,
    record: Record,
}

impl MessageTemplate {
    pub fn new(name: &str, service_id: u8, order: u8, record: Record) -> Self {
        Self {
            name: Intern::from_ref(name),
            service_id,
            order,
            record,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn service_id(&self) -> u8 {
        self.service_id
    }

    pub fn order(&self) -> u8 {
        self.order
    }

    /// The record layout of this message's payload, with zero values.
    pub fn record(&self) -> &Record {
        &self.record
    }
}

/// A concrete message: a template identity plus a populated record.
#[derive(Clone, PartialEq, Debug)]
pub struct Message {
    template: Arc<MessageTemplate>,
    record: Record,
}

impl Message {
    /// The handler name the session layer dispatches on.
    pub fn handler(&self) -> &str {
        self.template.name()
    }

    pub fn template(&self) -> &MessageTemplate {
        &self.template
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn record_mut(&mut self) -> &mut Record {
        &mut self.record
    }
}

/// The registry of message templates, keyed by handler name and by the
/// `(service, order)` wire identity.
#[derive(Debug, Default)]
pub struct MessageManager {
    by_name: FxHashMap<Intern<String>, Arc<MessageTemplate>>,
    by_wire: FxHashMap<(u8, u8), Arc<MessageTemplate>>,
}

impl MessageManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a message template under its handler name and wire identity.
    pub fn register(&mut self, template: MessageTemplate) -> Result<(), DmlError> {
        let wire = (template.service_id, template.order);
        if self.by_wire.contains_key(&wire) || self.by_name.contains_key(&template.name) {
            return Err(DmlError::DuplicateTemplate {
                service: wire.0,
                order: wire.1,
            });
        }
        debug!(
            name = template.name(),
            service = template.service_id,
            order = template.order,
            "Registered message template"
        );
        let template = Arc::new(template);
        self.by_name.insert(template.name, Arc::clone(&template));
        self.by_wire.insert(wire, template);
        Ok(())
    }

    pub fn template(&self, name: &str) -> Option<&Arc<MessageTemplate>> {
        self.by_name.get(&Intern::from_ref(name))
    }

    /// Creates a fresh message from the template registered under `name`.
    pub fn message(&self, name: &str) -> Result<Message, DmlError> {
        let template = self
            .template(name)
            .ok_or_else(|| DmlError::UnknownTemplate(name.to_owned()))?;
        Ok(Message {
            template: Arc::clone(template),
            record: template.record.clone(),
        })
    }

    /// Encodes a message as its 4-byte header followed by the record payload.
    pub fn encode(&self, message: &Message) -> Result<Vec<u8>, DmlError> {
        let payload = message.record.to_bytes();
        let total = MESSAGE_HEADER_SIZE + payload.len();
        let length = u16::try_from(total).map_err(|_| DmlError::MessageTooLarge(total))?;

        let mut bytes = Vec::with_capacity(total);
        bytes.push(message.template.service_id);
        bytes.push(message.template.order);
        bytes.extend_from_slice(&length.to_le_bytes());
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    /// Decodes a message, resolving its template from the header's
    /// `(service, order)` pair.
    pub fn decode(&self, bytes: &[u8]) -> Result<Message, Error> {
        if bytes.len() < MESSAGE_HEADER_SIZE {
            return Err(EncodingError::Truncated {
                needed: MESSAGE_HEADER_SIZE * 8,
                available: bytes.len() * 8,
            }
            .into());
        }
        let service_id = bytes[0];
        let order = bytes[1];
        let length = u16::from_le_bytes([bytes[2], bytes[3]]) as usize;

        let template = self.by_wire.get(&(service_id, order)).ok_or_else(|| {
            EncodingError::UnknownTag {
                context: format!("service {service_id} message"),
                value: i64::from(order),
            }
        })?;

        // The length field covers the header itself; anything smaller cannot
        // name a valid payload range.
        if length < MESSAGE_HEADER_SIZE {
            return Err(EncodingError::Truncated {
                needed: MESSAGE_HEADER_SIZE * 8,
                available: length * 8,
            }
            .into());
        }
        if length > bytes.len() {
            return Err(EncodingError::Truncated {
                needed: length * 8,
                available: bytes.len() * 8,
            }
            .into());
        }
        if length < bytes.len() {
            warn!(
                expected = length,
                actual = bytes.len(),
                "Message length field disagrees with the received payload"
            );
        }

        let mut record = template.record.clone();
        record.from_bytes(&bytes[MESSAGE_HEADER_SIZE..length])?;
        debug!(handler = template.name(), "Decoded message");
        Ok(Message {
            template: Arc::clone(template),
            record,
        })
    }
}
