use serde::{Deserialize, Serialize};

use super::Server;
use crate::error::{Error, Result};

/// Which endpoint to talk to and with which credentials.
///
/// Credentials are checked when a call is about to be made, not when the
/// account is built, so a client can be constructed before they are known.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Account {
    pub fn new(server: Server, login: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            server,
            login: Some(login.into()),
            api_key: Some(api_key.into()),
        }
    }

    /// Login and API key, or `Error::Configuration` naming the missing one.
    pub fn credentials(&self) -> Result<(&str, &str)> {
        let login = non_empty(self.login.as_deref())
            .ok_or_else(|| Error::Configuration("login is not set".to_string()))?;
        let api_key = non_empty(self.api_key.as_deref())
            .ok_or_else(|| Error::Configuration("api_key is not set".to_string()))?;
        Ok((login, api_key))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credentials() {
        let account = Account::default();
        let err = account.credentials().unwrap_err();
        assert!(err.to_string().contains("login"));

        let account = Account {
            login: Some("alice".to_string()),
            api_key: Some("  ".to_string()),
            ..Default::default()
        };
        let err = account.credentials().unwrap_err();
        assert!(err.to_string().contains("api_key"));

        let account = Account::new(Server::Com, "alice", "k");
        assert_eq!(account.credentials().unwrap(), ("alice", "k"));
    }
}
