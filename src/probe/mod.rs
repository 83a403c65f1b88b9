pub mod driver;
pub mod request;
pub mod response;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use driver::drive;
pub use request::{Method, ProbeRequest};
pub use response::{read_response, RawResponse};
pub use transport::{NetStream, NetTransport, Transport};

use std::io;
use std::sync::Arc;

use tracing::debug;

use crate::config::runtime::is_redirect;
use crate::config::StatusClass;
use crate::shared::context::Recorded;
use crate::shared::ScanContext;
use crate::utils::{self, UrlParts};

const HTTP_PORT: u16 = 80;
const HTTPS_PORT: u16 = 443;

/// Whether a session refills itself from the queue or exists for a single redirected url.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Pooled,
    Detached,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Plain,
    Tls,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Idle,
    Resolving,
    Connecting,
    Handshaking,
    Sending,
    Receiving,
    Done,
}

/// Completion of whatever the previous [`Step`] asked for.
#[derive(Debug)]
pub enum Event {
    Start,
    Resolved,
    Connected,
    Handshaken,
    Sent,
    Received(RawResponse),
    Failed(io::Error),
}

/// The next operation the driver has to perform for this session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    /// Look up `host:port`, dropping any connection kept for the previous url.
    Resolve { host: String, port: u16 },
    /// Dial the last resolved addresses, replacing the current connection.
    Connect,
    Handshake { domain: String },
    Send(Vec<u8>),
    Receive,
    Retire,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Attempts {
    pub connect: u32,
    pub send: u32,
    pub handshake: u32,
    pub redirects: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub candidates: usize,
    pub responses: usize,
    pub recorded: usize,
    pub timeouts: usize,
    pub redirects_followed: usize,
    pub tls_spawned: usize,
}

impl SessionStats {
    pub fn merge(&mut self, other: &SessionStats) {
        self.candidates += other.candidates;
        self.responses += other.responses;
        self.recorded += other.recorded;
        self.timeouts += other.timeouts;
        self.redirects_followed += other.redirects_followed;
        self.tls_spawned += other.tls_spawned;
    }
}

/// One probe connection as an explicit state machine. It never touches the network itself:
/// [`ProbeSession::handle`] consumes the completion of the last step and returns the next one,
/// which keeps every retry and terminal transition testable without sockets.
#[derive(Debug)]
pub struct ProbeSession {
    ctx: Arc<ScanContext>,
    role: Role,
    mode: Mode,
    state: State,
    url: String,
    parts: UrlParts,
    method: Method,
    via_proxy: bool,
    request: Vec<u8>,
    attempts: Attempts,
    spawned: Vec<String>,
    stats: SessionStats,
}

impl ProbeSession {
    /// A session that keeps pulling candidates from the shared queue until it is empty.
    pub fn pooled(ctx: Arc<ScanContext>) -> Self {
        Self::with_role(ctx, Role::Pooled, String::new())
    }

    /// A TLS session for exactly one url, retiring after its first outcome.
    pub fn detached(ctx: Arc<ScanContext>, url: String) -> Self {
        Self::with_role(ctx, Role::Detached, url)
    }

    fn with_role(ctx: Arc<ScanContext>, role: Role, url: String) -> Self {
        Self {
            ctx,
            role,
            mode: Mode::Plain,
            state: State::Idle,
            url,
            parts: UrlParts::default(),
            method: Method::Get,
            via_proxy: false,
            request: Vec::new(),
            attempts: Attempts::default(),
            spawned: Vec::new(),
            stats: SessionStats::default(),
        }
    }

    pub fn context(&self) -> &Arc<ScanContext> {
        &self.ctx
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn attempts(&self) -> Attempts {
        self.attempts
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// `https` urls this session was redirected to since the last call.
    pub fn take_spawned(&mut self) -> Vec<String> {
        std::mem::take(&mut self.spawned)
    }

    pub fn handle(&mut self, event: Event) -> Step {
        match (self.state, event) {
            (State::Idle, Event::Start) => match self.role {
                Role::Pooled => self.advance(),
                Role::Detached => {
                    let url = std::mem::take(&mut self.url);
                    self.stats.candidates += 1;
                    self.begin(url)
                }
            },
            (State::Resolving, Event::Resolved) => {
                self.state = State::Connecting;
                Step::Connect
            }
            (State::Connecting, Event::Connected) => match self.mode {
                Mode::Tls => {
                    self.state = State::Handshaking;
                    Step::Handshake {
                        domain: self.parts.hostname().to_string(),
                    }
                }
                Mode::Plain => self.send_request(),
            },
            (State::Handshaking, Event::Handshaken) => self.send_request(),
            (State::Sending, Event::Sent) => {
                self.state = State::Receiving;
                Step::Receive
            }
            (State::Receiving, Event::Received(response)) => {
                self.stats.responses += 1;
                self.evaluate(response)
            }
            (state, Event::Failed(e)) => self.on_failure(state, e),
            (State::Done, _) => Step::Retire,
            (state, event) => {
                debug!("{}: unexpected {:?} while {:?}", self.url, event, state);
                self.give_up()
            }
        }
    }

    fn on_failure(&mut self, state: State, e: io::Error) -> Step {
        let limits = self.ctx.config.limits;
        match state {
            State::Connecting => {
                self.attempts.connect += 1;
                if self.attempts.connect >= limits.max_reconnect {
                    debug!("{}: connect failed {} times: {e}", self.url, self.attempts.connect);
                    return self.give_up();
                }
                debug!("{}: connect failed, retrying: {e}", self.url);
                Step::Connect
            }
            State::Handshaking => {
                self.attempts.handshake += 1;
                if self.attempts.handshake >= limits.max_send {
                    debug!("{}: handshake failed {} times: {e}", self.url, self.attempts.handshake);
                    return self.give_up();
                }
                // the failed handshake consumed the stream, dial again before retrying
                debug!("{}: handshake failed, retrying: {e}", self.url);
                self.state = State::Connecting;
                Step::Connect
            }
            State::Sending => {
                self.attempts.send += 1;
                if self.attempts.send >= limits.max_send {
                    debug!("{}: send failed {} times: {e}", self.url, self.attempts.send);
                    return self.give_up();
                }
                debug!("{}: send failed, resending: {e}", self.url);
                Step::Send(self.request.clone())
            }
            State::Done => Step::Retire,
            _ => {
                debug!("{}: {:?} failed: {e}", self.url, state);
                self.give_up()
            }
        }
    }

    /// Terminal network failure: reported as a synthetic timeout when 408 is wanted.
    fn give_up(&mut self) -> Step {
        self.stats.timeouts += 1;
        if self.ctx.report_timeout(&self.url, &self.parts.path) {
            self.stats.recorded += 1;
        }
        self.finish()
    }

    fn evaluate(&mut self, response: RawResponse) -> Step {
        let status = response.status;
        match self.ctx.config.statuses.classify(status) {
            StatusClass::Exempt | StatusClass::Unlisted => {
                debug!("{}: status {status} not reported", self.url);
                self.finish()
            }
            StatusClass::Accepted => {
                if is_redirect(status) && self.role == Role::Pooled {
                    if let Some(location) = response.location() {
                        let location = location.to_string();
                        return self.redirect(&location);
                    }
                }
                if self.method == Method::Get && status == 200 {
                    return self.switch_to_post(response.keep_alive);
                }
                let recorded = self
                    .ctx
                    .record(&self.url, &self.parts.path, status, &response.body);
                if let Recorded::Written { .. } = recorded {
                    self.stats.recorded += 1;
                }
                self.finish()
            }
        }
    }

    fn redirect(&mut self, location: &str) -> Step {
        let limit = self.ctx.config.limits.max_redirect;
        if self.attempts.redirects >= limit {
            debug!("{}: redirect limit of {limit} reached, dropping", self.url);
            return self.finish();
        }
        self.attempts.redirects += 1;

        let next = utils::absolutize_location(location, &self.parts.host);
        if utils::is_https(&next) {
            debug!("{}: redirected to {next}, handing over to tls", self.url);
            self.stats.tls_spawned += 1;
            self.spawned.push(next);
            return self.finish();
        }
        debug!("{}: following redirect to {next}", self.url);
        self.stats.redirects_followed += 1;
        self.begin(next)
    }

    fn switch_to_post(&mut self, reuse_connection: bool) -> Step {
        self.method = Method::Post;
        self.request = self.build_request();
        if reuse_connection {
            self.send_request()
        } else {
            self.state = State::Connecting;
            Step::Connect
        }
    }

    /// Done with the current url: pooled sessions move on to the next candidate, detached ones
    /// retire.
    fn finish(&mut self) -> Step {
        match self.role {
            Role::Pooled => self.advance(),
            Role::Detached => self.retire(),
        }
    }

    fn advance(&mut self) -> Step {
        match self.ctx.next_candidate() {
            Some(url) => {
                self.attempts = Attempts::default();
                self.stats.candidates += 1;
                self.begin(url)
            }
            None => self.retire(),
        }
    }

    fn retire(&mut self) -> Step {
        self.state = State::Done;
        Step::Retire
    }

    fn begin(&mut self, url: String) -> Step {
        self.parts = utils::split_url(&url);
        self.url = url;
        self.method = Method::Get;
        self.mode = if self.role == Role::Detached || self.parts.is_https() {
            Mode::Tls
        } else {
            Mode::Plain
        };

        let (host, port) = match (self.mode, self.ctx.proxies.as_ref()) {
            (Mode::Plain, Some(pool)) => {
                let proxy = pool.next();
                self.via_proxy = true;
                (proxy.host.clone(), proxy.port)
            }
            (mode, _) => {
                self.via_proxy = false;
                let default_port = if mode == Mode::Tls { HTTPS_PORT } else { HTTP_PORT };
                (
                    self.parts.hostname().to_string(),
                    self.parts.explicit_port().unwrap_or(default_port),
                )
            }
        };
        self.request = self.build_request();
        self.state = State::Resolving;
        Step::Resolve { host, port }
    }

    fn build_request(&self) -> Vec<u8> {
        ProbeRequest::new(
            self.method,
            &self.url,
            &self.parts,
            self.mode == Mode::Tls,
            self.via_proxy,
        )
        .to_bytes()
    }

    fn send_request(&mut self) -> Step {
        self.state = State::Sending;
        Step::Send(self.request.clone())
    }
}
