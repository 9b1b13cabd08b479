//! Per-connection session state.
//!
//! A session is the hub-side stand-in for one remote context. Every channel
//! it joins is a [`SharedChannel`] owned by the session, so dropping the
//! session leaves all of them. Everything the remote context should see
//! (acks, errors, deliveries, connection counts) is pushed onto one outbound
//! queue, which keeps acks ordered after the deliveries they caused.

use crate::metrics;
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};
use webchannel_core::{ConnectionRegistry, Message, Observer, RouteMode, SharedChannel};
use webchannel_protocol::{codes, Frame, Version, PROTOCOL_VERSION};

/// Whether the connection should keep going after a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

struct Joined {
    channel: SharedChannel,
    observer: Option<Observer>,
}

/// Hub session for one remote context.
pub struct Session {
    connection_id: String,
    registry: ConnectionRegistry,
    outbound: UnboundedSender<Frame>,
    channels: HashMap<String, Joined>,
}

impl Session {
    /// Create a session that writes its frames to `outbound`.
    pub fn new(
        connection_id: impl Into<String>,
        registry: ConnectionRegistry,
        outbound: UnboundedSender<Frame>,
    ) -> Self {
        Self {
            connection_id: connection_id.into(),
            registry,
            outbound,
            channels: HashMap::new(),
        }
    }

    /// Get the connection ID.
    #[must_use]
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Names of the channels this session has joined.
    #[must_use]
    pub fn joined_channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.keys().cloned().collect();
        names.sort();
        names
    }

    /// Handle one client frame.
    pub fn handle_frame(&mut self, frame: Frame) -> Flow {
        let frame_type = frame.frame_type();
        if !frame_type.is_client() {
            warn!(
                connection = %self.connection_id,
                frame_type = ?frame_type,
                "Unexpected frame from client"
            );
            metrics::record_error("invalid_frame");
            self.push(Frame::error(
                0,
                codes::INVALID_FRAME,
                "Frame type is not valid from a client",
            ));
            return Flow::Continue;
        }

        match frame {
            Frame::Hello { version } => {
                if PROTOCOL_VERSION.is_compatible_with(&Version::new(version, 0)) {
                    debug!(connection = %self.connection_id, version, "Client hello");
                    return Flow::Continue;
                }
                warn!(connection = %self.connection_id, version, "Unsupported client version");
                metrics::record_error("version");
                self.push(Frame::error(
                    0,
                    codes::UNSUPPORTED_VERSION,
                    format!("Unsupported protocol version {version}, hub speaks {PROTOCOL_VERSION}"),
                ));
                return Flow::Close;
            }
            Frame::Join { id, channel } => self.join(id, channel),
            Frame::Leave { id, channel } => self.leave(id, &channel),
            Frame::Send {
                id,
                channel,
                message,
            } => self.send(id, &channel, message),
            Frame::Register { id, channel, key } => self.register(id, channel, key),
            Frame::Unregister { id, channel, key } => {
                match self.channels.get(&channel) {
                    Some(joined) => {
                        joined.channel.unregister_callback(&key);
                        self.push(Frame::ack(id));
                    }
                    None => self.not_joined(id, &channel),
                }
            }
            Frame::Observe { id, channel } => self.observe(id, channel),
            Frame::Unobserve { id, channel } => match self.channels.get_mut(&channel) {
                Some(joined) => {
                    if let Some(observer) = joined.observer.take() {
                        observer.unsubscribe();
                    }
                    self.push(Frame::ack(id));
                }
                None => self.not_joined(id, &channel),
            },
            Frame::Ping { timestamp } => self.push(Frame::pong(timestamp)),
            // Hub frames were rejected above.
            _ => {}
        }
        Flow::Continue
    }

    /// Leave every joined channel.
    pub fn close(&mut self) {
        for (name, joined) in self.channels.drain() {
            debug!(connection = %self.connection_id, channel = %name, "Leaving on close");
            joined.channel.disconnect();
        }
        metrics::set_registry_stats(self.registry.stats());
    }

    fn join(&mut self, id: u64, name: String) {
        if self.channels.contains_key(&name) {
            self.push(Frame::ack(id));
            return;
        }

        let channel = match SharedChannel::join(&self.registry, &name) {
            Ok(channel) => channel,
            Err(e) => {
                warn!(connection = %self.connection_id, channel = %name, error = %e, "Join failed");
                metrics::record_error("join");
                self.push(Frame::error(id, codes::JOIN_FAILED, e.to_string()));
                return;
            }
        };

        debug!(connection = %self.connection_id, channel = %name, "Joined channel");
        self.push(Frame::ack(id));

        let tx = self.outbound.clone();
        let channel_name = name.clone();
        channel.on_connections_update(move |count| {
            let _ = tx.send(Frame::connections(channel_name.as_str(), count));
        });

        self.channels.insert(
            name,
            Joined {
                channel,
                observer: None,
            },
        );
        metrics::set_registry_stats(self.registry.stats());
    }

    fn leave(&mut self, id: u64, name: &str) {
        match self.channels.remove(name) {
            Some(joined) => {
                joined.channel.disconnect();
                debug!(connection = %self.connection_id, channel = %name, "Left channel");
                self.push(Frame::ack(id));
                metrics::set_registry_stats(self.registry.stats());
            }
            None => self.not_joined(id, name),
        }
    }

    fn send(&mut self, id: Option<u64>, name: &str, message: Message) {
        let Some(joined) = self.channels.get(name) else {
            self.not_joined(id.unwrap_or(0), name);
            return;
        };

        let mode = match message.mode {
            RouteMode::All => "all",
            RouteMode::Broadcast => "broadcast",
        };
        match joined.channel.send_message(message) {
            Ok(()) => {
                metrics::record_routed(mode);
                if let Some(id) = id {
                    self.push(Frame::ack(id));
                }
            }
            Err(e) => {
                metrics::record_error("send");
                self.push(Frame::error(
                    id.unwrap_or(0),
                    codes::SEND_ON_CLOSED,
                    e.to_string(),
                ));
            }
        }
    }

    fn register(&mut self, id: u64, name: String, key: String) {
        let Some(joined) = self.channels.get(&name) else {
            self.not_joined(id, &name);
            return;
        };

        let tx = self.outbound.clone();
        let callback_key = key.clone();
        joined.channel.register_callback(key, move |payload| {
            let _ = tx.send(Frame::callback(
                name.as_str(),
                callback_key.as_str(),
                payload.clone(),
            ));
        });
        self.push(Frame::ack(id));
    }

    fn observe(&mut self, id: u64, name: String) {
        let Some(joined) = self.channels.get_mut(&name) else {
            self.not_joined(id, &name);
            return;
        };

        if joined.observer.as_ref().is_some_and(Observer::is_active) {
            self.push(Frame::ack(id));
            return;
        }

        let tx = self.outbound.clone();
        let channel_name = name.clone();
        let result = Observer::new(&joined.channel, move |message| {
            let _ = tx.send(Frame::observed(channel_name.as_str(), message.clone()));
        });

        let response = match result {
            Ok(observer) => {
                joined.observer = Some(observer);
                Frame::ack(id)
            }
            Err(e) => {
                metrics::record_error("observe");
                Frame::error(id, codes::NOT_JOINED, e.to_string())
            }
        };
        self.push(response);
    }

    fn not_joined(&self, id: u64, name: &str) {
        debug!(connection = %self.connection_id, channel = %name, "Channel not joined");
        self.push(Frame::error(
            id,
            codes::NOT_JOINED,
            format!("Not joined to channel {name}"),
        ));
    }

    fn push(&self, frame: Frame) {
        // The receiver only goes away once the connection loop has ended.
        let _ = self.outbound.send(frame);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.channels.is_empty() {
            self.close();
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("connection_id", &self.connection_id)
            .field("channels", &self.joined_channels())
            .finish()
    }
}
