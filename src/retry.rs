//! Session ownership and bounded retry.
//!
//! A [`Controller`] owns the one session a retriever may have. Work is handed to
//! [`Controller::run`] as a closure; the closure is re-run from its start when it fails with a
//! transient error, after reconnecting if the failure says the connection is gone. Work units
//! must therefore be safe to repeat as a whole.
//!
//! Every failure crossing the transport boundary is first reduced to a [`Disposition`] by
//! [`classify`], which is a pure function of the error's kind and message.

use std::ops::{Deref, DerefMut};
use std::thread;

use log::{debug, trace, warn};

use crate::error::{Error, Result, TransportError, TransportErrorKind};
use crate::settings::Settings;
use crate::transport::{Connector, Transport};

/// Substrings of TLS failures that mean the peer's certificate chain was rejected.
const CERTIFICATE_FAILURES: &[&str] = &[
    "certificate verify failed",
    "certificate verification failed",
    "certificate is not trusted",
    "invalid peer certificate",
];

/// What to do about a failed unit of work.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// The connection is unusable: discard it, back off, reconnect, and run the work again.
    Reconnect,
    /// The response was unusable but the connection may not be: back off and run the work again.
    Retry,
    /// The server refused the command. Reported immediately.
    ServerError,
    /// The server's certificate was rejected. Reported immediately; reconnecting cannot help.
    Untrusted,
    /// Anything else. Reported immediately.
    Fatal,
}

/// Classify a transport failure.
pub fn classify(err: &TransportError) -> Disposition {
    use TransportErrorKind::*;
    match err.kind() {
        Tls | Io if is_certificate_failure(err.message()) => Disposition::Untrusted,
        ConnectionReset | ConnectionAborted | BrokenPipe | TimedOut | NotConnected | Io | Tls
        | Bye => Disposition::Reconnect,
        Parse | Unexpected | Bad => Disposition::Retry,
        No => Disposition::ServerError,
        Other => Disposition::Fatal,
    }
}

fn is_certificate_failure(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    CERTIFICATE_FAILURES.iter().any(|m| message.contains(m))
}

/// A connected transport, tagged with the connection it belongs to.
///
/// The epoch increases with every connect, so work can tell whether the connection changed since
/// it last looked, and with it any server-side state such as the selected mailbox.
#[derive(Debug)]
pub struct Session<T> {
    transport: T,
    epoch: u64,
}

impl<T> Session<T> {
    /// The connect count at which this session was established.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

impl<T> Deref for Session<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.transport
    }
}

impl<T> DerefMut for Session<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

/// Whether a controller currently holds a session.
#[derive(Debug)]
pub enum SessionState<T> {
    /// No connection. No command may be issued in this state.
    Absent,
    /// A usable, authenticated session.
    Connected(Session<T>),
}

/// Owns the session and runs units of work against it with bounded retry.
pub struct Controller<C: Connector> {
    connector: C,
    settings: Settings,
    state: SessionState<C::Transport>,
    connects: u64,
}

impl<C: Connector> Controller<C> {
    /// A controller that connects lazily, on the first unit of work.
    pub fn new(settings: Settings, connector: C) -> Self {
        Controller {
            connector,
            settings,
            state: SessionState::Absent,
            connects: 0,
        }
    }

    /// The settings the controller connects with.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The connector sessions are opened with.
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Returns true while a session is held.
    pub fn is_connected(&self) -> bool {
        matches!(self.state, SessionState::Connected(_))
    }

    /// How many sessions this controller has opened so far.
    pub fn epoch(&self) -> u64 {
        self.connects
    }

    /// Take the session for the duration of a call. It is disconnected when the lease drops.
    pub fn lease(&mut self) -> SessionLease<'_, C> {
        SessionLease { controller: self }
    }

    /// Run `work` until it succeeds, fails for good, or the retry budget is spent.
    ///
    /// Errors other than [`Error::Transport`] returned by `work` are passed through unchanged.
    pub fn run<R, F>(&mut self, mut work: F) -> Result<R>
    where
        F: FnMut(&mut Session<C::Transport>) -> Result<R>,
    {
        let max_retries = self.settings.max_retries;
        let mut attempt: u32 = 0;
        loop {
            let outcome = match self.session() {
                Ok(session) => work(session),
                Err(e) => Err(Error::Transport(e)),
            };
            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(Error::Transport(err)) => err,
                Err(other) => return Err(other),
            };

            let disposition = classify(&err);
            let attempts = attempt + 1;
            debug!(
                "attempt {}/{} failed ({:?}): {}",
                attempts,
                max_retries + 1,
                disposition,
                err
            );
            match disposition {
                Disposition::Reconnect => {
                    self.reset();
                    if attempt >= max_retries {
                        return Err(Error::ConnectionLost {
                            attempts,
                            source: err,
                        });
                    }
                }
                Disposition::Retry => {
                    if attempt >= max_retries {
                        return Err(Error::Protocol {
                            attempts,
                            source: err,
                        });
                    }
                }
                Disposition::Untrusted => {
                    self.reset();
                    return Err(Error::CertificateTrust(err));
                }
                Disposition::ServerError => return Err(Error::Server(err)),
                Disposition::Fatal => return Err(Error::Transport(err)),
            }

            attempt += 1;
            let delay = self.settings.backoff(attempt);
            debug!("retrying in {:?}", delay);
            if !delay.is_zero() {
                thread::sleep(delay);
            }
        }
    }

    /// Log out and drop the session, if there is one. Failures to log out are only logged.
    pub fn disconnect(&mut self) {
        if let SessionState::Connected(mut session) =
            std::mem::replace(&mut self.state, SessionState::Absent)
        {
            debug!("releasing session {}", session.epoch);
            if let Err(e) = session.logout() {
                warn!("logout failed: {}", e);
            }
        }
    }

    fn session(&mut self) -> std::result::Result<&mut Session<C::Transport>, TransportError> {
        if let SessionState::Absent = self.state {
            let transport = self.connector.connect(&self.settings)?;
            self.connects += 1;
            debug!("session {} established", self.connects);
            self.state = SessionState::Connected(Session {
                transport,
                epoch: self.connects,
            });
        }
        match &mut self.state {
            SessionState::Connected(session) => Ok(session),
            SessionState::Absent => Err(TransportError::new(
                TransportErrorKind::NotConnected,
                "no session",
            )),
        }
    }

    /// Drop a broken session without talking to the server again.
    fn reset(&mut self) {
        if let SessionState::Connected(session) =
            std::mem::replace(&mut self.state, SessionState::Absent)
        {
            trace!("discarding session {}", session.epoch);
        }
    }
}

impl<C: Connector> Drop for Controller<C> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// The session held for the duration of one public call.
///
/// Dereferences to the [`Controller`]; dropping it disconnects, whichever way the call ends.
pub struct SessionLease<'a, C: Connector> {
    controller: &'a mut Controller<C>,
}

impl<C: Connector> Deref for SessionLease<'_, C> {
    type Target = Controller<C>;

    fn deref(&self) -> &Controller<C> {
        self.controller
    }
}

impl<C: Connector> DerefMut for SessionLease<'_, C> {
    fn deref_mut(&mut self) -> &mut Controller<C> {
        self.controller
    }
}

impl<C: Connector> Drop for SessionLease<'_, C> {
    fn drop(&mut self) {
        self.controller.disconnect();
    }
}
