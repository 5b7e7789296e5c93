//! Wires a `BridgedClient` to mock collaborators.

#![allow(dead_code)]

use super::connection::{MockConnection, MockFactory};
use async_trait::async_trait;
use parking_lot::Mutex;
use slirc_bridge::{
    BridgedClient, ClientConfig, ClientEvent, ClientIdentity, Collaborators, ConnectError,
    ErrorCode, IrcNames, NameAllocator, NotificationSink, ServerConfig, ServerError,
};
use std::sync::Arc;
use tokio::sync::mpsc;

pub const DOMAIN: &str = "irc.example.net";

/// Server descriptor with defaults.
pub fn server() -> ServerConfig {
    ServerConfig::with_domain(DOMAIN)
}

pub struct FixedNames;

#[async_trait]
impl NameAllocator for FixedNames {
    async fn allocate(
        &self,
        identity: &ClientIdentity,
        _config: &ClientConfig,
    ) -> Result<IrcNames, ConnectError> {
        Ok(IrcNames {
            username: if identity.is_bot { "bridge" } else { "alice" }.to_string(),
            realname: "Bridged user".to_string(),
        })
    }
}

/// A notice delivered to the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
    pub force: bool,
    pub code: Option<ErrorCode>,
}

#[derive(Default)]
pub struct RecordingSink {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingSink {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }
}

impl NotificationSink for RecordingSink {
    fn send_metadata(
        &self,
        _client: &ClientIdentity,
        message: &str,
        force: bool,
        raw: Option<&ServerError>,
    ) {
        self.notices.lock().push(Notice {
            message: message.to_string(),
            force,
            code: raw.map(|e| e.code.clone()),
        });
    }
}

pub struct Harness {
    pub client: Arc<BridgedClient>,
    pub events: mpsc::UnboundedReceiver<ClientEvent>,
    pub factory: Arc<MockFactory>,
    pub sink: Arc<RecordingSink>,
}

impl Harness {
    /// A bridged user who wants the nick "alice".
    pub fn new(server: ServerConfig) -> Self {
        let identity = ClientIdentity::user(DOMAIN, "@alice:example.org");
        let config = ClientConfig {
            desired_nick: Some("alice".to_string()),
            ..Default::default()
        };
        Self::build(identity, server, config, |collab| collab)
    }

    /// The bridge bot.
    pub fn bot(server: ServerConfig) -> Self {
        let config = ClientConfig {
            desired_nick: Some("bridgebot".to_string()),
            ..Default::default()
        };
        Self::build(ClientIdentity::bot(DOMAIN), server, config, |collab| collab)
    }

    pub fn build(
        identity: ClientIdentity,
        server: ServerConfig,
        config: ClientConfig,
        extend: impl FnOnce(Collaborators) -> Collaborators,
    ) -> Self {
        let factory = Arc::new(MockFactory::default());
        let sink = Arc::new(RecordingSink::default());
        let collab = extend(Collaborators::new(
            factory.clone(),
            Arc::new(FixedNames),
            sink.clone(),
        ));
        let (client, events) = BridgedClient::new(identity, Arc::new(server), config, collab);
        Self {
            client,
            events,
            factory,
            sink,
        }
    }

    /// A harness whose client is already connected.
    pub async fn connected(server: ServerConfig) -> Self {
        let harness = Self::new(server);
        harness
            .client
            .connect()
            .await
            .expect("connect should succeed");
        harness
    }

    pub fn conn(&self) -> Arc<MockConnection> {
        self.factory.last()
    }

    /// Everything emitted so far.
    pub fn drain_events(&mut self) -> Vec<ClientEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    /// Wait for the next event matching `pred`.
    pub async fn next_event(&mut self, pred: impl Fn(&ClientEvent) -> bool) -> ClientEvent {
        loop {
            let event = self.events.recv().await.expect("client dropped");
            if pred(&event) {
                return event;
            }
        }
    }
}

/// Let spawned tasks (the event pump) catch up.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
