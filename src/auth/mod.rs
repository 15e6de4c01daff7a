//! Token lifecycle for registered agents. Tokens are opaque UUID v4 values
//! bound to an agent identity; they defend against id spoofing between
//! localhost peers, not against a hostile local process.

use crate::protocol::{Sender, ServerError, ServerResult};
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentType {
    Referee,
    Player,
}

impl AgentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Referee => "referee",
            Self::Player => "player",
        }
    }
}

/// Identity a token resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentIdentity {
    pub agent_id: String,
    pub agent_type: AgentType,
}

type AgentKey = (AgentType, String);

#[derive(Default)]
struct TokenStore {
    /// Token value to the identity it was issued for
    by_token: HashMap<String, AgentIdentity>,
    /// Reverse index used to keep issue idempotent
    by_agent: HashMap<AgentKey, String>,
}

/// Issues, validates and revokes agent tokens. All mutations happen under
/// one mutex so concurrent registrations cannot double-issue.
#[derive(Default)]
pub struct AuthManager {
    store: Mutex<TokenStore>,
}

impl AuthManager {
    /// Issues a token for the agent. Calling again for the same agent
    /// returns the existing token until it is revoked.
    pub fn issue(&self, agent_id: &str, agent_type: AgentType) -> String {
        let store = &mut *self.store.lock();
        let key = (agent_type, agent_id.to_string());
        if let Some(existing) = store.by_agent.get(&key) {
            return existing.clone();
        }

        let token = uuid::Uuid::new_v4().to_string();
        store.by_agent.insert(key, token.clone());
        store.by_token.insert(
            token.clone(),
            AgentIdentity {
                agent_id: agent_id.to_string(),
                agent_type,
            },
        );
        token
    }

    /// Reinstates a previously issued token, used when rebuilding the
    /// manager from persisted registrations after a restart
    pub fn restore(&self, agent_id: &str, agent_type: AgentType, token: &str) {
        let store = &mut *self.store.lock();
        store
            .by_agent
            .insert((agent_type, agent_id.to_string()), token.to_string());
        store.by_token.insert(
            token.to_string(),
            AgentIdentity {
                agent_id: agent_id.to_string(),
                agent_type,
            },
        );
    }

    pub fn validate(&self, token: &str) -> ServerResult<AgentIdentity> {
        self.store
            .lock()
            .by_token
            .get(token)
            .cloned()
            .ok_or(ServerError::InvalidToken)
    }

    /// Validates the token and checks the decoded identity against the
    /// envelope sender. A mismatch leaves no state changed anywhere, the
    /// request is rejected before any handler runs.
    pub fn verify_sender(&self, token: &str, sender: &Sender) -> ServerResult<AgentIdentity> {
        let identity = self.validate(token)?;
        let matches = match sender {
            Sender::Referee(id) => {
                identity.agent_type == AgentType::Referee && identity.agent_id == *id
            }
            Sender::Player(id) => {
                identity.agent_type == AgentType::Player && identity.agent_id == *id
            }
            Sender::LeagueManager => false,
        };
        if !matches {
            return Err(ServerError::SenderMismatch);
        }
        Ok(identity)
    }

    pub fn revoke(&self, token: &str) {
        let store = &mut *self.store.lock();
        if let Some(identity) = store.by_token.remove(token) {
            store
                .by_agent
                .remove(&(identity.agent_type, identity.agent_id));
        }
    }

    pub fn revoke_agent(&self, agent_id: &str, agent_type: AgentType) {
        let store = &mut *self.store.lock();
        if let Some(token) = store
            .by_agent
            .remove(&(agent_type, agent_id.to_string()))
        {
            store.by_token.remove(&token);
        }
    }
}

#[cfg(test)]
mod test {
    use super::{AgentType, AuthManager};
    use crate::protocol::{Sender, ServerError};

    #[test]
    fn test_issue_is_idempotent() {
        let auth = AuthManager::default();
        let first = auth.issue("r1", AgentType::Referee);
        let second = auth.issue("r1", AgentType::Referee);
        assert_eq!(first, second);
    }

    #[test]
    fn test_issue_after_revoke_rotates() {
        let auth = AuthManager::default();
        let first = auth.issue("r1", AgentType::Referee);
        auth.revoke(&first);
        let second = auth.issue("r1", AgentType::Referee);
        assert_ne!(first, second);
        assert!(auth.validate(&first).is_err());
        assert!(auth.validate(&second).is_ok());
    }

    #[test]
    fn test_verify_sender() {
        let auth = AuthManager::default();
        let token = auth.issue("alice", AgentType::Player);

        assert!(auth
            .verify_sender(&token, &Sender::player("alice"))
            .is_ok());

        // Same id but wrong role
        assert!(matches!(
            auth.verify_sender(&token, &Sender::referee("alice")),
            Err(ServerError::SenderMismatch)
        ));
        // Right role but a different agent
        assert!(matches!(
            auth.verify_sender(&token, &Sender::player("bob")),
            Err(ServerError::SenderMismatch)
        ));
        // Unknown token is reported as invalid, not mismatched
        assert!(matches!(
            auth.verify_sender("bogus", &Sender::player("alice")),
            Err(ServerError::InvalidToken)
        ));
    }

    #[test]
    fn test_revoke_agent() {
        let auth = AuthManager::default();
        let token = auth.issue("bob", AgentType::Player);
        auth.revoke_agent("bob", AgentType::Player);
        assert!(auth.validate(&token).is_err());
    }
}
