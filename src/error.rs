// Bot error kinds.
//
// Only the three failures the polling loop treats differently get their own
// variant. Everything else travels as anyhow::Error with context attached.

use thiserror::Error;

type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum BotError {
    /// Login was rejected. Fatal at startup.
    #[error("login failed for @{handle}")]
    Auth {
        handle: String,
        #[source]
        source: Cause,
    },

    /// A feed fetch failed. The account is skipped for this cycle.
    #[error("failed to fetch feed for @{handle}")]
    Fetch {
        handle: String,
        #[source]
        source: Cause,
    },

    /// Sending a reply failed. Not retried within the cycle.
    #[error("failed to publish reply to {uri}")]
    Publish {
        uri: String,
        #[source]
        source: Cause,
    },
}

impl BotError {
    pub fn auth(handle: &str, source: anyhow::Error) -> Self {
        Self::Auth {
            handle: handle.to_string(),
            source: source.into(),
        }
    }

    pub fn fetch(handle: &str, source: anyhow::Error) -> Self {
        Self::Fetch {
            handle: handle.to_string(),
            source: source.into(),
        }
    }

    pub fn publish(uri: &str, source: anyhow::Error) -> Self {
        Self::Publish {
            uri: uri.to_string(),
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn display_names_the_subject() {
        let err = BotError::fetch("a.example", anyhow::anyhow!("timeout"));
        assert_eq!(err.to_string(), "failed to fetch feed for @a.example");
    }

    #[test]
    fn source_keeps_the_cause() {
        let err = BotError::publish("at://P", anyhow::anyhow!("HTTP 500"));
        let source = err.source().expect("publish error should carry a source");
        assert_eq!(source.to_string(), "HTTP 500");
    }
}
