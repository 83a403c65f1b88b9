use rand::seq::SliceRandom;

use crate::utils::{self, UrlParts};

pub const USER_AGENTS: [&str; 18] = [
    "Mozilla/5.0 (Windows NT 6.1) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/41.0.2228.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 6.1; WOW64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/41.0.2227.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 6.3; WOW64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/41.0.2226.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 6.1; WOW64; rv:40.0) Gecko/20100101 Firefox/40.1",
    "Mozilla/5.0 (Windows NT 6.3; rv:36.0) Gecko/20100101 Firefox/36.0",
    "Mozilla/5.0 (X11; Linux i586; rv:31.0) Gecko/20100101 Firefox/31.0",
    "Mozilla/5.0 (Windows NT 6.1; WOW64; rv:31.0) Gecko/20130401 Firefox/31.0",
    "Mozilla/5.0 (Windows NT 5.1; rv:31.0) Gecko/20100101 Firefox/31.0",
    "Mozilla/5.0 (Windows NT 6.1; WOW64; Trident/7.0; AS; rv:11.0) like Gecko",
    "Mozilla/5.0 (Windows; U; MSIE 9.0; WIndows NT 9.0; en-US))",
    "Mozilla/5.0 (Windows; U; MSIE 9.0; Windows NT 9.0; en-US)",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:68.0) Gecko/20100101 Firefox/68.0",
    "Mozilla/5.0 (Windows NT 6.1; WOW64; rv:67.0) Gecko/20100101 Firefox/67.0",
    "Mozilla/5.0 (X11; Linux i686; rv:67.0) Gecko/20100101 Firefox/67.0",
    "Mozilla/5.0 (X11; Linux x86_64; rv:67.0) Gecko/20100101 Firefox/67.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/74.0.3729.28 Safari/537.36 OPR/61.0.3298.6 (Edition developer)",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/64.0.3282.140 Safari/537.36 Edge/17.17134",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/74.0.3729.134 Safari/537.36 Vivaldi/2.5.1525.40",
];

pub fn random_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// `k1=v1&k2=v2` with random keys of 5 characters and values of 10 and 11.
pub fn random_form_body() -> String {
    format!(
        "{}={}&{}={}",
        utils::random_string(5),
        utils::random_string(10),
        utils::random_string(5),
        utils::random_string(11)
    )
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// One probe request, already rendered down to what goes on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeRequest {
    pub method: Method,
    pub target: String,
    pub host: String,
    pub user_agent: &'static str,
    pub body: Option<String>,
}

impl ProbeRequest {
    /// `absolute_target` sends the full url as request target, which is what forward proxies
    /// expect. TLS requests carry an explicit `:443` in `Host` when the url names no port.
    pub fn new(
        method: Method,
        url: &str,
        parts: &UrlParts,
        tls: bool,
        absolute_target: bool,
    ) -> Self {
        let target = if absolute_target {
            url.to_string()
        } else {
            parts.request_target()
        };
        let host = if tls && parts.explicit_port().is_none() {
            format!("{}:443", parts.host)
        } else {
            parts.host.clone()
        };
        let body = match method {
            Method::Get => None,
            Method::Post => Some(random_form_body()),
        };
        Self {
            method,
            target,
            host,
            user_agent: random_agent(),
            body,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut head = format!(
            "{} {} HTTP/1.1\r\nHost: {}\r\nAccept: */*\r\nConnection: keep-alive\r\nCache-Control: no-cache\r\nUser-Agent: {}\r\n",
            self.method.as_str(),
            self.target,
            self.host,
            self.user_agent
        );
        if let Some(body) = self.body.as_ref() {
            head.push_str("Content-Type: text/plain\r\n");
            head.push_str(&format!("Content-Length: {}\r\n\r\n", body.len()));
            head.push_str(body);
        } else {
            head.push_str("\r\n");
        }
        head.into_bytes()
    }
}
