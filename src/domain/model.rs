use crate::utils::error::{Result, UpdateError};
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use url::Url;

/// 語意化版本 (major.minor.patch[-pre][+build])
///
/// Build metadata is kept for display but does not take part in ordering
/// or equality.
#[derive(Debug, Clone)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre: Vec<Identifier>,
    pub build: Option<String>,
}

/// 預發布識別碼
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    Numeric(u64),
    AlphaNumeric(String),
}

impl Ord for Identifier {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Identifier::Numeric(a), Identifier::Numeric(b)) => a.cmp(b),
            (Identifier::Numeric(_), Identifier::AlphaNumeric(_)) => Ordering::Less,
            (Identifier::AlphaNumeric(_), Identifier::Numeric(_)) => Ordering::Greater,
            (Identifier::AlphaNumeric(a), Identifier::AlphaNumeric(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for Identifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Numeric(n) => write!(f, "{}", n),
            Identifier::AlphaNumeric(s) => f.write_str(s),
        }
    }
}

fn version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^v?(0|[1-9]\d*)(?:\.(0|[1-9]\d*))?(?:\.(0|[1-9]\d*))?(?:-([0-9A-Za-z-]+(?:\.[0-9A-Za-z-]+)*))?(?:\+([0-9A-Za-z-]+(?:\.[0-9A-Za-z-]+)*))?$",
        )
        .expect("version regex is valid")
    })
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre: Vec::new(),
            build: None,
        }
    }

    /// 解析版本字串，接受前綴 `v` 以及省略的 minor/patch (`1.2` 即 `1.2.0`)
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = |reason: &str| UpdateError::InvalidVersion {
            value: input.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid("empty version string"));
        }

        let caps = version_regex()
            .captures(trimmed)
            .ok_or_else(|| invalid("not a semantic version"))?;

        let number = |idx: usize| -> Result<u64> {
            match caps.get(idx) {
                Some(m) => m
                    .as_str()
                    .parse::<u64>()
                    .map_err(|_| invalid("numeric field out of range")),
                None => Ok(0),
            }
        };

        let mut pre = Vec::new();
        if let Some(m) = caps.get(4) {
            for part in m.as_str().split('.') {
                let is_numeric = part.bytes().all(|b| b.is_ascii_digit());
                if is_numeric {
                    if part.len() > 1 && part.starts_with('0') {
                        return Err(invalid("numeric pre-release identifier has leading zero"));
                    }
                    let n = part
                        .parse::<u64>()
                        .map_err(|_| invalid("pre-release identifier out of range"))?;
                    pre.push(Identifier::Numeric(n));
                } else {
                    pre.push(Identifier::AlphaNumeric(part.to_string()));
                }
            }
        }

        Ok(Self {
            major: number(1)?,
            minor: number(2)?,
            patch: number(3)?,
            pre,
            build: caps.get(5).map(|m| m.as_str().to_string()),
        })
    }

    pub fn is_prerelease(&self) -> bool {
        !self.pre.is_empty()
    }

    pub fn is_newer_than(&self, other: &Version) -> bool {
        self > other
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            .then_with(|| match (self.pre.is_empty(), other.pre.is_empty()) {
                (true, true) => Ordering::Equal,
                // 預發布版本 < 正式版本
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => self.pre.cmp(&other.pre),
            })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl FromStr for Version {
    type Err = UpdateError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.pre.is_empty() {
            let pre: Vec<String> = self.pre.iter().map(|i| i.to_string()).collect();
            write!(f, "-{}", pre.join("."))?;
        }
        if let Some(build) = &self.build {
            write!(f, "+{}", build)?;
        }
        Ok(())
    }
}

/// 可升級的候選執行檔
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    pub version: Version,
}

impl Candidate {
    pub fn new(path: PathBuf, version: Version) -> Self {
        Self { path, version }
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.path.display(), self.version)
    }
}

/// A validated `host:port` or `:port` address. An empty host means `localhost`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindAddress {
    host: String,
    port: u16,
}

impl BindAddress {
    pub fn parse(bind: &str) -> Result<Self> {
        let invalid = |reason: &str| UpdateError::InvalidBind {
            bind: bind.to_string(),
            reason: reason.to_string(),
        };

        let split: Vec<&str> = bind.split(':').collect();
        let (host, port) = match split.as_slice() {
            [host, port] => (*host, *port),
            [_] => return Err(invalid("missing port")),
            _ => return Err(invalid("expected host:port or :port")),
        };

        if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("port must be a decimal number"));
        }
        let port: u16 = port
            .parse()
            .map_err(|_| invalid("port must be between 1 and 65535"))?;
        if port == 0 {
            return Err(invalid("port must be between 1 and 65535"));
        }

        let host = if host.is_empty() { "localhost" } else { host };
        if host.chars().any(|c| c.is_whitespace() || c == '/' || c == '@') {
            return Err(invalid("host contains invalid characters"));
        }
        // url 驗證主機名稱
        Url::parse(&format!("http://{}:{}/", host, port))
            .map_err(|e| invalid(format!("invalid host: {}", e).as_str()))?;

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Address suitable for `TcpListener::bind` / `TcpStream::connect`.
    pub fn socket_target(&self) -> (&str, u16) {
        (self.host.as_str(), self.port)
    }

    /// Resolved socket addresses. A host that does not resolve yields none.
    pub fn resolve(&self) -> Vec<SocketAddr> {
        self.socket_target()
            .to_socket_addrs()
            .map(|addrs| addrs.collect())
            .unwrap_or_default()
    }

    pub async fn lookup(&self) -> Vec<SocketAddr> {
        tokio::net::lookup_host(self.socket_target())
            .await
            .map(|addrs| addrs.collect())
            .unwrap_or_default()
    }

    /// Whether listening on both addresses would collide: the same port with a
    /// shared resolved IP, or a wildcard IP on either side.
    pub fn conflicts_with(&self, other: &BindAddress) -> bool {
        if self.port != other.port {
            return false;
        }
        self.host.eq_ignore_ascii_case(&other.host) || sockets_overlap(&self.resolve(), &other.resolve())
    }

    /// Same as [`BindAddress::conflicts_with`] without blocking the runtime on DNS.
    pub async fn lookup_conflicts_with(&self, other: &BindAddress) -> bool {
        if self.port != other.port {
            return false;
        }
        if self.host.eq_ignore_ascii_case(&other.host) {
            return true;
        }
        let (ours, theirs) = tokio::join!(self.lookup(), other.lookup());
        sockets_overlap(&ours, &theirs)
    }

    /// Base URL of the service listening on this address.
    pub fn to_url(&self) -> Result<Url> {
        Url::parse(&format!("http://{}:{}/", self.host, self.port)).map_err(|e| {
            UpdateError::InvalidBind {
                bind: self.to_string(),
                reason: e.to_string(),
            }
        })
    }
}

fn sockets_overlap(ours: &[SocketAddr], theirs: &[SocketAddr]) -> bool {
    ours.iter().any(|a| {
        theirs.iter().any(|b| {
            a.port() == b.port()
                && (a.ip() == b.ip() || a.ip().is_unspecified() || b.ip().is_unspecified())
        })
    })
}

impl FromStr for BindAddress {
    type Err = UpdateError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for BindAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
