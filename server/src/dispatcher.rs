//! Per-connection event handling over the shared registry.
//!
//! [`Dispatcher`] is the shared, cheaply cloned part: registry, delivery and
//! identity provider. Each connection drives its own [`Session`], an explicit
//! Connected / Registered / Disconnected state machine. Failures while handling
//! one event are logged and leave the session where it was.

use std::sync::Arc;

use tracing::{debug, info, warn};

use relay_protocol::{fit_users, ChatMsg, Request, Response};

use crate::delivery::{Delivery, DeliveryOutcome};
use crate::error::EventError;
use crate::identity::IdentityProvider;
use crate::registry::Registry;
use crate::server_types::{required_name, ConnectionHandle, Envelope};

#[derive(Clone)]
pub struct Dispatcher {
    registry: Registry,
    delivery: Delivery,
    identity: Arc<dyn IdentityProvider>,
}

impl Dispatcher {
    pub fn new(registry: Registry, identity: Arc<dyn IdentityProvider>) -> Self {
        let delivery = Delivery::new(&registry);
        Dispatcher { registry, delivery, identity }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Starts a session for a freshly accepted connection
    pub fn connect(&self, handle: ConnectionHandle) -> Session {
        info!("{} connected", handle.id());
        Session {
            handle,
            state: ConnectionState::Connected,
            dispatcher: self.clone(),
        }
    }

    /// Routes one private message by recipient name. An unreachable
    /// recipient is a normal outcome and is never reported to the sender.
    pub async fn route(&self, envelope: Envelope) -> DeliveryOutcome {
        let recipient = envelope.recipient.clone();
        let outcome = self.delivery.send_to(&recipient, envelope.into_response()).await;

        match outcome {
            DeliveryOutcome::Queued => debug!("Message queued for {}", &recipient),
            DeliveryOutcome::Unreachable => debug!("Recipient {} not connected", &recipient),
            _ => debug!("Message to {} dropped: {:?}", &recipient, outcome),
        }
        outcome
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Registered(String),
    Disconnected,
}

/// Whether the connection should keep reading after an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

pub struct Session {
    handle: ConnectionHandle,
    state: ConnectionState,
    dispatcher: Dispatcher,
}

impl Session {
    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Feeds one decoded frame through the state machine
    pub async fn on_frame(&mut self, msg: ChatMsg) -> Flow {
        match msg {
            ChatMsg::Client(request) => self.on_request(request).await,
            ChatMsg::Server(_) => {
                self.ignore(EventError::UnexpectedFrame);
                Flow::Continue
            },
            ChatMsg::Malformed(reason) => {
                self.ignore(EventError::Malformed(reason));
                Flow::Continue
            },
        }
    }

    pub async fn on_request(&mut self, request: Request) -> Flow {
        if self.state == ConnectionState::Disconnected {
            return Flow::Close;
        }

        match request {
            Request::Register{username} => {
                if let Err(e) = self.register(username).await {
                    self.ignore(e);
                }
            },
            Request::PrivateMessage{sender, recipient, message} => {
                match Envelope::from_fields(sender, recipient, message) {
                    Ok(envelope) => {
                        self.dispatcher.route(envelope).await;
                    },
                    Err(e) => self.ignore(e),
                }
            },
            Request::Users => {
                let names = self.dispatcher.registry.usernames().await;
                let total = names.len();
                let names = fit_users(names);
                if names.len() < total {
                    debug!("Users list for {} cut to {} of {} names", self.handle.id(), names.len(), total);
                }
                self.dispatcher.delivery.send(&self.handle, Response::Users(names));
            },
            Request::Quit => {
                self.disconnect().await;
                return Flow::Close;
            },
            Request::Malformed(reason) => self.ignore(EventError::Malformed(reason)),
        }

        Flow::Continue
    }

    async fn register(&mut self, username: Option<String>) -> Result<(), EventError> {
        let name = required_name(username, "username")?;
        if !self.dispatcher.identity.authorize(&name) {
            return Err(EventError::Rejected(name));
        }

        if let Some(old) = self.dispatcher.registry.register(name.clone(), self.handle.clone()).await {
            info!("{} supersedes {} as {}", self.handle.id(), old.id(), &name);
        }
        info!("{} registered with id: {}", &name, self.handle.id());

        self.state = ConnectionState::Registered(name);
        Ok(())
    }

    /// Terminal: releases whatever this connection owns in the registry.
    /// Safe to call more than once.
    pub async fn disconnect(&mut self) {
        if self.state == ConnectionState::Disconnected {
            return;
        }

        info!("User disconnected: {}", self.handle.id());
        if let Some(name) = self.dispatcher.registry.remove_by_handle(&self.handle).await {
            info!("User {} removed from active users", &name);
        }
        self.state = ConnectionState::Disconnected;
    }

    fn ignore(&self, e: EventError) {
        warn!("Ignoring event from {}: {}", self.handle.id(), e);
    }
}
