//! Scripted in-memory transport for exercising sessions, workers and the scheduler without
//! sockets. Responses are keyed by `host/path` as seen in the request.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use super::{RawResponse, Transport};

#[derive(Debug)]
pub struct FakeConn {
    host: String,
    tls: bool,
    pending: Option<String>,
}

#[derive(Debug, Default)]
pub struct FakeTransport {
    routes: HashMap<String, RawResponse>,
    unresolvable: HashSet<String>,
    refuse_connect: HashSet<String>,
    refuse_tls: HashSet<String>,
    hosts: RefCell<Vec<String>>,
    connects: RefCell<HashMap<String, usize>>,
    handshakes: RefCell<usize>,
    requests: RefCell<Vec<String>>,
}

fn refused(what: &str, host: &str) -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionRefused, format!("{what} refused by {host}"))
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, key: &str, status: u16, body: &str) -> Self {
        self.respond_with(
            key,
            RawResponse {
                status,
                headers: Vec::new(),
                body: body.as_bytes().to_vec(),
                keep_alive: true,
            },
        )
    }

    pub fn redirect(self, key: &str, status: u16, location: &str) -> Self {
        self.respond_with(
            key,
            RawResponse {
                status,
                headers: vec![("Location".to_string(), location.to_string())],
                body: Vec::new(),
                keep_alive: true,
            },
        )
    }

    pub fn respond_with(mut self, key: &str, response: RawResponse) -> Self {
        self.routes.insert(key.to_string(), response);
        self
    }

    pub fn unresolvable(mut self, host: &str) -> Self {
        self.unresolvable.insert(host.to_string());
        self
    }

    pub fn refuse_connect(mut self, host: &str) -> Self {
        self.refuse_connect.insert(host.to_string());
        self
    }

    pub fn refuse_tls(mut self, host: &str) -> Self {
        self.refuse_tls.insert(host.to_string());
        self
    }

    /// `METHOD host/path` for every request sent, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }

    pub fn connect_attempts(&self, host: &str) -> usize {
        self.connects.borrow().get(host).copied().unwrap_or(0)
    }

    pub fn handshakes(&self) -> usize {
        *self.handshakes.borrow()
    }

    fn address_of(&self, host: &str, port: u16) -> SocketAddr {
        let mut hosts = self.hosts.borrow_mut();
        let idx = match hosts.iter().position(|h| h == host) {
            Some(idx) => idx,
            None => {
                hosts.push(host.to_string());
                hosts.len() - 1
            }
        };
        let ip = Ipv4Addr::new(10, 0, (idx / 256) as u8, (idx % 256) as u8);
        SocketAddr::new(IpAddr::V4(ip), port)
    }

    fn host_of(&self, addr: &SocketAddr) -> Option<String> {
        let IpAddr::V4(ip) = addr.ip() else {
            return None;
        };
        let [_, _, hi, lo] = ip.octets();
        let idx = hi as usize * 256 + lo as usize;
        self.hosts.borrow().get(idx).cloned()
    }
}

// "GET /x HTTP/1.1" + "Host: a.com:443" -> ("GET", "a.com/x")
fn route_key(raw: &[u8]) -> Option<(String, String)> {
    let text = String::from_utf8_lossy(raw);
    let mut lines = text.split("\r\n");
    let mut request_line = lines.next()?.split(' ');
    let method = request_line.next()?.to_string();
    let target = request_line.next()?;
    if let Some(absolute) = target.split_once("://").map(|(_, rest)| rest) {
        return Some((method, absolute.to_string()));
    }
    let host = lines.find_map(|l| l.strip_prefix("Host: "))?;
    let host = host.strip_suffix(":443").unwrap_or(host);
    Some((method, format!("{host}{target}")))
}

impl Transport for FakeTransport {
    type Conn = FakeConn;

    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
        if self.unresolvable.contains(host) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{host} does not resolve"),
            ));
        }
        Ok(vec![self.address_of(host, port)])
    }

    async fn connect(&self, addrs: &[SocketAddr]) -> io::Result<FakeConn> {
        let host = addrs
            .first()
            .and_then(|addr| self.host_of(addr))
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "unknown address"))?;
        *self.connects.borrow_mut().entry(host.clone()).or_default() += 1;
        if self.refuse_connect.contains(&host) {
            return Err(refused("connect", &host));
        }
        Ok(FakeConn {
            host,
            tls: false,
            pending: None,
        })
    }

    async fn handshake(&self, mut conn: FakeConn, _domain: &str) -> io::Result<FakeConn> {
        *self.handshakes.borrow_mut() += 1;
        if conn.tls {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "already tls"));
        }
        if self.refuse_tls.contains(&conn.host) {
            return Err(refused("handshake", &conn.host));
        }
        conn.tls = true;
        Ok(conn)
    }

    async fn send(&self, conn: &mut FakeConn, bytes: &[u8]) -> io::Result<()> {
        let (method, key) = route_key(bytes)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "unparseable request"))?;
        self.requests.borrow_mut().push(format!("{method} {key}"));
        conn.pending = Some(key);
        Ok(())
    }

    async fn receive(&self, conn: &mut FakeConn, _limit: usize) -> io::Result<RawResponse> {
        let key = conn
            .pending
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "nothing was sent"))?;
        Ok(self.routes.get(&key).cloned().unwrap_or_else(|| RawResponse {
            status: 404,
            headers: Vec::new(),
            body: b"not found".to_vec(),
            keep_alive: true,
        }))
    }

    async fn shutdown(&self, _conn: &mut FakeConn) -> io::Result<()> {
        Ok(())
    }
}
