//! Room address parsing and WebSocket endpoint resolution.
//!
//! Players type room addresses in many shapes: `room.example`,
//! `room.example:38281`, `ws://localhost:38281`, sometimes even
//! `https://room.example`. This module turns that input into a
//! [`RoomAddress`] and, from there, into concrete [`Endpoint`]s the
//! connection layer can dial.
//!
//! When the input carries no scheme we don't know whether the server
//! terminates TLS, so [`RoomAddress::candidates`] yields the secure
//! endpoint first and the insecure one second. The session layer decides
//! which one to keep.

use std::fmt;

use url::Url;

use crate::TransportError;

/// Port used by room servers when the address doesn't name one.
pub const DEFAULT_PORT: u16 = 38281;

// ---------------------------------------------------------------------------
// Scheme
// ---------------------------------------------------------------------------

/// WebSocket scheme of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// `wss://` (WebSocket over TLS).
    Secure,
    /// `ws://` (plain WebSocket).
    Insecure,
}

impl Scheme {
    /// Returns the scheme as it appears in a URL.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Secure => "wss",
            Self::Insecure => "ws",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// RoomAddress
// ---------------------------------------------------------------------------

/// A parsed, user-supplied room address.
///
/// The scheme is optional: `None` means "try secure, then insecure".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomAddress {
    scheme: Option<Scheme>,
    host: String,
    port: u16,
}

impl RoomAddress {
    /// Parses a room address typed by a player.
    ///
    /// # Errors
    /// Returns [`TransportError::InvalidAddress`] if the input is empty or
    /// has no host component.
    pub fn parse(input: &str) -> Result<Self, TransportError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid(input, "address is empty"));
        }

        let explicit = trimmed.contains("://");
        let url = if explicit {
            Url::parse(trimmed)
        } else {
            Url::parse(&format!("wss://{trimmed}"))
        }
        .map_err(|e| invalid(input, &e.to_string()))?;

        let scheme = if explicit {
            Some(match url.scheme() {
                "wss" => Scheme::Secure,
                "ws" => Scheme::Insecure,
                other => {
                    tracing::warn!(
                        scheme = other,
                        "room address scheme is not a WebSocket scheme, using wss"
                    );
                    Scheme::Secure
                }
            })
        } else {
            None
        };

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid(input, "address has no host"))?
            .to_string();

        // `Url::port` hides a scheme's own default port, so `wss://host:443`
        // would read as portless. Trust whatever port was typed.
        let port = if has_explicit_port(trimmed) {
            url.port_or_known_default().unwrap_or(DEFAULT_PORT)
        } else {
            DEFAULT_PORT
        };

        Ok(Self { scheme, host, port })
    }

    /// The scheme named in the input, if any.
    pub fn scheme(&self) -> Option<Scheme> {
        self.scheme
    }

    /// Hostname (lowercased for domain names).
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port, defaulting to [`DEFAULT_PORT`].
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Builds the endpoint for a specific scheme.
    pub fn with_scheme(&self, scheme: Scheme) -> Endpoint {
        Endpoint {
            scheme,
            host: self.host.clone(),
            port: self.port,
        }
    }

    /// Endpoints to try, in order.
    pub fn candidates(&self) -> Vec<Endpoint> {
        match self.scheme {
            Some(scheme) => vec![self.with_scheme(scheme)],
            None => vec![
                self.with_scheme(Scheme::Secure),
                self.with_scheme(Scheme::Insecure),
            ],
        }
    }
}

// ---------------------------------------------------------------------------
// Endpoint
// ---------------------------------------------------------------------------

/// A fully resolved WebSocket endpoint: scheme, host and port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    scheme: Scheme,
    host: String,
    port: u16,
}

impl Endpoint {
    /// Parses the form produced by [`Endpoint::connection_string`].
    ///
    /// # Errors
    /// Returns [`TransportError::InvalidAddress`] if the string has no
    /// WebSocket scheme.
    pub fn from_connection_string(s: &str) -> Result<Self, TransportError> {
        let address = RoomAddress::parse(s)?;
        match address.scheme() {
            Some(scheme) => Ok(address.with_scheme(scheme)),
            None => Err(invalid(s, "connection string has no scheme")),
        }
    }

    /// The verified scheme.
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port, always explicit in the rendered URL.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The URL to dial, e.g. `wss://room.example:38281`.
    pub fn url(&self) -> String {
        self.to_string()
    }

    /// The string persisted alongside saved credentials.
    pub fn connection_string(&self) -> String {
        self.to_string()
    }

    /// Returns the address with the scheme left open again.
    pub fn address(&self) -> RoomAddress {
        RoomAddress {
            scheme: Some(self.scheme),
            host: self.host.clone(),
            port: self.port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// Whether the authority of `input` ends in `:<digits>`.
fn has_explicit_port(input: &str) -> bool {
    let rest = input.split_once("://").map_or(input, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    match host_port.rsplit_once(':') {
        Some((host, port)) => {
            !port.is_empty()
                && port.bytes().all(|b| b.is_ascii_digit())
                && (!host.starts_with('[') || host.ends_with(']'))
        }
        None => false,
    }
}

fn invalid(input: &str, reason: &str) -> TransportError {
    TransportError::InvalidAddress {
        input: input.to_string(),
        reason: reason.to_string(),
    }
}
