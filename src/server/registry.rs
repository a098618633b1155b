use std::collections::HashMap;

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::protocol::{is_valid_identifier, ConnectionId, RegistrationFailure};

use super::ClientHandle;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("Identifier must be 3-30 characters: letters, digits, '_' or '-', starting with a letter or digit.")]
    InvalidFormat,
    #[error("Identifier already taken.")]
    Taken,
    #[error("You are already registered as '{current}'.")]
    AlreadyRegistered { current: String },
}

impl RegistrationError {
    pub const fn reason(&self) -> RegistrationFailure {
        match self {
            Self::InvalidFormat => RegistrationFailure::InvalidFormat,
            Self::Taken => RegistrationFailure::Taken,
            Self::AlreadyRegistered { .. } => RegistrationFailure::AlreadyRegistered,
        }
    }
}

#[derive(Default)]
struct RegistryInner {
    by_identifier: HashMap<String, ClientHandle>,
    by_connection: HashMap<ConnectionId, String>,
}

/// Bidirectional map between identifiers and live connections.
///
/// Both directions sit behind one lock so every operation observes and leaves
/// them consistent: an identifier maps to a connection exactly when that
/// connection maps back to it.
#[derive(Default)]
pub struct ClientRegistry {
    inner: RwLock<RegistryInner>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `identifier` for `client`.
    ///
    /// Re-registering the identifier a connection already holds is accepted.
    pub async fn register(
        &self,
        client: &ClientHandle,
        identifier: &str,
    ) -> Result<(), RegistrationError> {
        if !is_valid_identifier(identifier) {
            return Err(RegistrationError::InvalidFormat);
        }

        let mut inner = self.inner.write().await;

        if let Some(holder) = inner.by_identifier.get(identifier) {
            if holder.id() != client.id() {
                return Err(RegistrationError::Taken);
            }
        }

        if let Some(current) = inner.by_connection.get(&client.id()) {
            if current != identifier {
                return Err(RegistrationError::AlreadyRegistered {
                    current: current.clone(),
                });
            }
            debug!(connection_id = %client.id(), %identifier, "Repeated registration");
            return Ok(());
        }

        inner
            .by_identifier
            .insert(identifier.to_string(), client.clone());
        inner
            .by_connection
            .insert(client.id(), identifier.to_string());
        info!(connection_id = %client.id(), client_ip = %client.ip(), %identifier, "Client registered");
        Ok(())
    }

    /// Remove whatever `connection_id` holds. Idempotent.
    pub async fn unregister(&self, connection_id: ConnectionId) -> Option<String> {
        let mut inner = self.inner.write().await;
        let identifier = inner.by_connection.remove(&connection_id)?;
        inner.by_identifier.remove(&identifier);
        info!(%connection_id, %identifier, "Client unregistered");
        Some(identifier)
    }

    pub async fn lookup(&self, identifier: &str) -> Option<ClientHandle> {
        self.inner.read().await.by_identifier.get(identifier).cloned()
    }

    pub async fn identifier_of(&self, connection_id: ConnectionId) -> Option<String> {
        self.inner
            .read()
            .await
            .by_connection
            .get(&connection_id)
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.by_identifier.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn identifiers(&self) -> Vec<String> {
        self.inner.read().await.by_identifier.keys().cloned().collect()
    }
}
