//! Who a client is, and the collaborators that allocate its names.

use crate::client::BridgedClient;
use crate::config::{ClientConfig, Secret};
use crate::connection::{ConnectionFactory, IrcConnection};
use crate::error::ConnectError;
use crate::events::NotificationSink;
use async_trait::async_trait;
use ipnet::Ipv6Net;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Immutable identity of one bridged participant. Used for logging and
/// correlation only.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    /// Random per-instance id.
    pub id: String,
    /// Owning bridge user, absent for the bridge's own bot.
    pub user_id: Option<String>,
    pub display_name: Option<String>,
    /// Domain of the target server.
    pub server: String,
    pub credential: Option<Secret>,
    /// The privileged always-on identity (the bridge bot).
    pub is_bot: bool,
}

impl ClientIdentity {
    /// Identity for a bridged user.
    pub fn user(server: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: Some(user_id.into()),
            display_name: None,
            server: server.into(),
            credential: None,
            is_bot: false,
        }
    }

    /// Identity for the bridge bot.
    pub fn bot(server: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: None,
            display_name: None,
            server: server.into(),
            credential: None,
            is_bot: true,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_credential(mut self, credential: Secret) -> Self {
        self.credential = Some(credential);
        self
    }
}

/// Username / realname pair sent at registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcNames {
    pub username: String,
    pub realname: String,
}

/// Picks the username/realname for an identity.
#[async_trait]
pub trait NameAllocator: Send + Sync {
    async fn allocate(
        &self,
        identity: &ClientIdentity,
        config: &ClientConfig,
    ) -> Result<IrcNames, ConnectError>;
}

/// Assigns a source address from a prefix, writing it into `config`.
#[async_trait]
pub trait AddressAllocator: Send + Sync {
    async fn allocate(&self, prefix: Ipv6Net, config: &mut ClientConfig)
    -> Result<(), ConnectError>;
}

/// Ident daemon mapping from local port to username.
pub trait IdentRegistry: Send + Sync {
    fn register(&self, username: &str, local_port: u16);
}

/// An ident mapping waiting for its port. Handed to the connection factory.
#[derive(Clone)]
pub struct IdentBinding {
    pub username: String,
    registry: Arc<dyn IdentRegistry>,
}

impl IdentBinding {
    pub fn new(username: impl Into<String>, registry: Arc<dyn IdentRegistry>) -> Self {
        Self {
            username: username.into(),
            registry,
        }
    }

    /// Publish the mapping once the socket's local port is known.
    pub fn bind(&self, local_port: u16) {
        self.registry.register(&self.username, local_port);
    }
}

impl fmt::Debug for IdentBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentBinding")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Offered every new connection, for cross-cutting behaviour.
pub trait ConnectionObserver: Send + Sync {
    fn on_connection_created(&self, client: &BridgedClient, connection: &Arc<dyn IrcConnection>);
}

/// Everything a client consumes but does not implement.
#[derive(Clone)]
pub struct Collaborators {
    pub factory: Arc<dyn ConnectionFactory>,
    pub names: Arc<dyn NameAllocator>,
    pub addresses: Option<Arc<dyn AddressAllocator>>,
    pub ident: Option<Arc<dyn IdentRegistry>>,
    pub observer: Option<Arc<dyn ConnectionObserver>>,
    pub sink: Arc<dyn NotificationSink>,
}

impl Collaborators {
    pub fn new(
        factory: Arc<dyn ConnectionFactory>,
        names: Arc<dyn NameAllocator>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            factory,
            names,
            addresses: None,
            ident: None,
            observer: None,
            sink,
        }
    }

    pub fn with_addresses(mut self, addresses: Arc<dyn AddressAllocator>) -> Self {
        self.addresses = Some(addresses);
        self
    }

    pub fn with_ident(mut self, ident: Arc<dyn IdentRegistry>) -> Self {
        self.ident = Some(ident);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ConnectionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(String, u16)>>);

    impl IdentRegistry for Recorder {
        fn register(&self, username: &str, local_port: u16) {
            self.0.lock().push((username.to_string(), local_port));
        }
    }

    #[test]
    fn binding_registers_username_with_port() {
        let registry = Arc::new(Recorder::default());
        let binding = IdentBinding::new("alice", registry.clone());
        binding.bind(40123);
        assert_eq!(registry.0.lock().as_slice(), &[("alice".to_string(), 40123)]);
        assert!(format!("{binding:?}").contains("alice"));
    }

    #[test]
    fn identities_get_distinct_ids() {
        let a = ClientIdentity::user("irc.example.net", "@a:example.org");
        let b = ClientIdentity::bot("irc.example.net");
        assert_ne!(a.id, b.id);
        assert!(b.is_bot && b.user_id.is_none());
    }
}
