use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_USER_SERVER: &str = "s.whatsapp.net";
pub const SERVER_JID: &str = "s.whatsapp.net";
pub const HIDDEN_USER_SERVER: &str = "lid";

#[derive(Debug, thiserror::Error)]
pub enum JidError {
    #[error("Invalid JID format: {0}")]
    InvalidFormat(String),
    #[error("Failed to parse component: {0}")]
    Parse(#[from] std::num::ParseIntError),
}

/// A protocol address: `user[.agent][:device]@server`, or a bare server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Jid {
    pub user: String,
    pub server: String,
    pub agent: u8,
    pub device: u16,
}

impl Jid {
    pub fn new(user: &str, server: &str) -> Self {
        Self {
            user: user.to_string(),
            server: server.to_string(),
            ..Default::default()
        }
    }

    /// The bare server address every IQ is addressed to.
    pub fn server() -> Self {
        Self::new("", SERVER_JID)
    }

    pub fn is_empty(&self) -> bool {
        self.server.is_empty()
    }
}

impl FromStr for Jid {
    type Err = JidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (user_part, server) = match s.split_once('@') {
            Some((u, s)) => (u, s.to_string()),
            None => ("", s.to_string()),
        };

        if server.is_empty() {
            return Err(JidError::InvalidFormat(s.to_string()));
        }
        if user_part.is_empty() {
            return Ok(Jid::new("", &server));
        }

        // LID users may contain dots that are not agent separators.
        if server == HIDDEN_USER_SERVER {
            let (user, device) = match user_part.rsplit_once(':') {
                Some((u, d)) => (u, d.parse()?),
                None => (user_part, 0),
            };
            return Ok(Jid {
                user: user.to_string(),
                server,
                agent: 0,
                device,
            });
        }

        let mut user = user_part;
        let mut device = 0;
        let mut agent = 0;

        if let Some((u, d)) = user_part.rsplit_once(':') {
            user = u;
            device = d.parse()?;
        }
        if let Some((u, a)) = user.rsplit_once('.')
            && let Ok(val) = a.parse::<u8>()
        {
            user = u;
            agent = val;
        }

        Ok(Jid {
            user: user.to_string(),
            server,
            agent,
            device,
        })
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.user.is_empty() {
            write!(f, "{}", self.server)
        } else {
            write!(f, "{}", self.user)?;
            if self.agent > 0 {
                write!(f, ".{}", self.agent)?;
            }
            if self.device > 0 {
                write!(f, ":{}", self.device)?;
            }
            write!(f, "@{}", self.server)
        }
    }
}
