//! Canonical IPv4/IPv6 address value type.
//!
//! The hub keys all admission control on addresses: blacklist and
//! whitelist membership, relay identity, crossfeed identity. One host
//! may run several relays on different ports, so the default equality
//! of [`NetAddress`] compares address bytes and prefix only;
//! [`NetAddress::same_endpoint`] is the port-aware comparison used
//! where the port matters.
//!
//! Addresses are parsed from text (with an optional `/prefix`), built
//! from socket addresses, and rendered in three IPv6 text forms.
//! Parsing reports a specific error per failure mode; hostname
//! resolution is attempted only when the string is not a literal
//! address.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs};

/// Address family of a [`NetAddress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrFamily {
    Invalid,
    V4,
    V6,
    /// An IPv4 address carried in IPv6 mapped form (::ffff:a.b.c.d).
    V4InV6,
    /// The wildcard, matching anything.
    Any,
}

/// Why an address string failed to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AddrError {
    #[error("address string is empty")]
    Empty,
    #[error("illegal characters in address string")]
    IllegalChars,
    #[error("prefix length is not decimal")]
    MaskNotDecimal,
    #[error("expected a prefix length after '/'")]
    MaskMissing,
    #[error("prefix length out of range")]
    MaskOutOfRange,
    #[error("malformed IPv4 address")]
    MalformedV4,
    #[error("malformed IPv6 address")]
    MalformedV6,
    #[error("missing value between separators")]
    MissingValue,
    #[error("'::' expansion allowed only once")]
    DoubleExpansion,
    #[error("could not resolve host name")]
    Unresolvable,
}

/// IPv6 text renditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextForm {
    /// `2001:aa0:801:2::2`
    Compressed,
    /// `2001:aa0:801:2:0:0:0:2`
    Short,
    /// `2001:0aa0:0801:0002:0000:0000:0000:0002`
    Full,
}

/// An IPv4 or IPv6 address with prefix length and port.
///
/// IPv4 addresses occupy the first four bytes of the buffer with a
/// prefix in 0..=32; IPv6 uses all sixteen bytes with a prefix in
/// 0..=128. Plain value type, `Copy`.
#[derive(Debug, Clone, Copy)]
pub struct NetAddress {
    addr: [u8; 16],
    mask: u8,
    family: AddrFamily,
    port: u16,
}

/// Default equality ignores the port: two relays on one host are the
/// same address but not the same endpoint.
impl PartialEq for NetAddress {
    fn eq(&self, other: &Self) -> bool {
        self.family == other.family && self.addr == other.addr && self.mask == other.mask
    }
}

impl Eq for NetAddress {}

impl Default for NetAddress {
    fn default() -> Self {
        Self {
            addr: [0u8; 16],
            mask: 0,
            family: AddrFamily::Invalid,
            port: 0,
        }
    }
}

impl NetAddress {
    /// The wildcard address, equal to nothing and containing nothing.
    pub fn any() -> Self {
        Self {
            family: AddrFamily::Any,
            ..Self::default()
        }
    }

    /// Parse a textual address, optionally suffixed with `/prefix`.
    ///
    /// Falls back to hostname resolution only when the string is not
    /// a literal address. The port is left at 0; see
    /// [`with_port`](Self::with_port).
    pub fn parse(s: &str) -> Result<Self, AddrError> {
        if s.is_empty() {
            return Err(AddrError::Empty);
        }
        let (host, mask) = split_mask(s)?;
        if host.is_empty() {
            return Err(AddrError::Empty);
        }

        if host.contains(':') {
            let addr = parse_v6(host)?;
            let mask = match mask {
                Some(m) if m > 128 => return Err(AddrError::MaskOutOfRange),
                Some(m) => m as u8,
                None => 128,
            };
            let family = if is_mapped_bytes(&addr) {
                AddrFamily::V4InV6
            } else {
                AddrFamily::V6
            };
            return Ok(Self {
                addr,
                mask,
                family,
                port: 0,
            });
        }

        if host.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
            let quad = parse_v4(host)?;
            let mask = match mask {
                Some(m) if m > 32 => return Err(AddrError::MaskOutOfRange),
                Some(m) => m as u8,
                None => 32,
            };
            let mut addr = [0u8; 16];
            addr[..4].copy_from_slice(&quad);
            return Ok(Self {
                addr,
                mask,
                family: AddrFamily::V4,
                port: 0,
            });
        }

        // Not a literal. A prefix makes no sense on a hostname.
        if mask.is_some() {
            return Err(AddrError::IllegalChars);
        }
        resolve(host)
    }

    /// Same address with the given port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn family(&self) -> AddrFamily {
        self.family
    }

    pub fn mask(&self) -> u8 {
        self.mask
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self.family, AddrFamily::Invalid | AddrFamily::Any)
    }

    /// Port-aware comparison, used for relay and crossfeed identity.
    pub fn same_endpoint(&self, other: &Self) -> bool {
        self == other && self.port == other.port
    }

    // conversions

    pub fn ip(&self) -> Option<IpAddr> {
        match self.family {
            AddrFamily::V4 => Some(IpAddr::V4(Ipv4Addr::new(
                self.addr[0],
                self.addr[1],
                self.addr[2],
                self.addr[3],
            ))),
            AddrFamily::V6 | AddrFamily::V4InV6 => {
                Some(IpAddr::V6(Ipv6Addr::from(self.addr)))
            }
            _ => None,
        }
    }

    pub fn to_socket_addr(&self) -> Option<SocketAddr> {
        self.ip().map(|ip| SocketAddr::new(ip, self.port))
    }

    /// Map an IPv4 address into IPv6 mapped form (::ffff:a.b.c.d).
    /// Other families are returned unchanged.
    pub fn map_to_v6(&self) -> Self {
        if self.family != AddrFamily::V4 {
            return *self;
        }
        let mut addr = [0u8; 16];
        addr[10] = 0xff;
        addr[11] = 0xff;
        addr[12..].copy_from_slice(&self.addr[..4]);
        Self {
            addr,
            mask: self.mask + 96,
            family: AddrFamily::V4InV6,
            port: self.port,
        }
    }

    /// Extract the IPv4 address from IPv6 mapped form.
    /// Other families are returned unchanged.
    pub fn map_from_v6(&self) -> Self {
        if self.family != AddrFamily::V4InV6 {
            return *self;
        }
        let mut addr = [0u8; 16];
        addr[..4].copy_from_slice(&self.addr[12..]);
        Self {
            addr,
            mask: self.mask.saturating_sub(96).min(32),
            family: AddrFamily::V4,
            port: self.port,
        }
    }

    // prefix arithmetic

    /// The address value and the bit width of its family's space.
    fn prefix_space(&self) -> Option<(u128, u32)> {
        match self.family {
            AddrFamily::V4 => {
                let v = u32::from_be_bytes([
                    self.addr[0],
                    self.addr[1],
                    self.addr[2],
                    self.addr[3],
                ]);
                Some((v as u128, 32))
            }
            AddrFamily::V6 | AddrFamily::V4InV6 => {
                Some((u128::from_be_bytes(self.addr), 128))
            }
            _ => None,
        }
    }

    fn with_value(&self, value: u128) -> Self {
        let mut out = *self;
        match self.family {
            AddrFamily::V4 => {
                out.addr = [0u8; 16];
                out.addr[..4].copy_from_slice(&(value as u32).to_be_bytes());
            }
            _ => {
                out.addr = value.to_be_bytes();
            }
        }
        out
    }

    fn net_mask_bits(width: u32, prefix: u8) -> u128 {
        if prefix == 0 {
            return 0;
        }
        let host = width - prefix as u32;
        let space = if width == 128 {
            u128::MAX
        } else {
            (1u128 << width) - 1
        };
        space & !((1u128 << host) - 1)
    }

    /// Number of host bits in the prefix.
    pub fn host_bits(&self) -> u32 {
        match self.prefix_space() {
            Some((_, width)) => width - self.mask as u32,
            None => 0,
        }
    }

    /// The first address of the prefix (the network address).
    pub fn first_addr(&self) -> Self {
        match self.prefix_space() {
            Some((v, width)) => {
                self.with_value(v & Self::net_mask_bits(width, self.mask))
            }
            None => *self,
        }
    }

    /// The last address of the prefix (the broadcast address in v4).
    pub fn last_addr(&self) -> Self {
        match self.prefix_space() {
            Some((v, width)) => {
                let host = width - self.mask as u32;
                let host_mask = if host >= 128 {
                    u128::MAX
                } else {
                    (1u128 << host) - 1
                };
                self.with_value(v | host_mask)
            }
            None => *self,
        }
    }

    /// First host address of the prefix. Equal to the network address
    /// when the prefix leaves fewer than two host addresses.
    pub fn first_usable_addr(&self) -> Self {
        let first = self.first_addr();
        if self.host_bits() < 2 {
            return first;
        }
        match first.prefix_space() {
            Some((v, _)) => first.with_value(v + 1),
            None => first,
        }
    }

    /// Last host address of the prefix.
    pub fn last_usable_addr(&self) -> Self {
        let last = self.last_addr();
        if self.host_bits() < 2 {
            return last;
        }
        match last.prefix_space() {
            Some((v, _)) => last.with_value(v - 1),
            None => last,
        }
    }

    /// True if `other` lies within this address's prefix.
    pub fn contains(&self, other: &Self) -> bool {
        let (Some((_, sw)), Some((ov, ow))) = (self.prefix_space(), other.prefix_space())
        else {
            return false;
        };
        if sw != ow {
            return false;
        }
        let (Some((fv, _)), Some((lv, _))) =
            (self.first_addr().prefix_space(), self.last_addr().prefix_space())
        else {
            return false;
        };
        fv <= ov && ov <= lv
    }

    /// True if this address lies within `other`'s prefix.
    pub fn is_part_of(&self, other: &Self) -> bool {
        other.contains(self)
    }

    // classification

    pub fn is_unspecified(&self) -> bool {
        match self.prefix_space() {
            Some((v, _)) => v == 0,
            None => false,
        }
    }

    pub fn is_loopback(&self) -> bool {
        match self.family {
            AddrFamily::V4 => self.addr[0] == 127,
            AddrFamily::V6 => u128::from_be_bytes(self.addr) == 1,
            AddrFamily::V4InV6 => self.addr[12] == 127,
            _ => false,
        }
    }

    pub fn is_mapped_v4(&self) -> bool {
        self.family == AddrFamily::V4InV6
    }

    // text forms

    /// Render the address. IPv4 is always a dotted quad; the form
    /// selects the IPv6 rendition.
    pub fn to_text(&self, form: TextForm) -> String {
        match self.family {
            AddrFamily::V4 => format!(
                "{}.{}.{}.{}",
                self.addr[0], self.addr[1], self.addr[2], self.addr[3]
            ),
            AddrFamily::V6 | AddrFamily::V4InV6 => {
                let groups: Vec<u16> = self
                    .addr
                    .chunks_exact(2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect();
                match form {
                    TextForm::Full => groups
                        .iter()
                        .map(|g| format!("{g:04x}"))
                        .collect::<Vec<_>>()
                        .join(":"),
                    TextForm::Short => groups
                        .iter()
                        .map(|g| format!("{g:x}"))
                        .collect::<Vec<_>>()
                        .join(":"),
                    TextForm::Compressed => compress_groups(&groups),
                }
            }
            AddrFamily::Any => "any".to_owned(),
            AddrFamily::Invalid => "invalid".to_owned(),
        }
    }
}

impl fmt::Display for NetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text(TextForm::Compressed))
    }
}

impl From<SocketAddr> for NetAddress {
    fn from(sa: SocketAddr) -> Self {
        let mut out = match sa.ip() {
            IpAddr::V4(v4) => {
                let mut addr = [0u8; 16];
                addr[..4].copy_from_slice(&v4.octets());
                Self {
                    addr,
                    mask: 32,
                    family: AddrFamily::V4,
                    port: 0,
                }
            }
            IpAddr::V6(v6) => {
                let addr = v6.octets();
                let family = if is_mapped_bytes(&addr) {
                    AddrFamily::V4InV6
                } else {
                    AddrFamily::V6
                };
                Self {
                    addr,
                    mask: 128,
                    family,
                    port: 0,
                }
            }
        };
        out.port = sa.port();
        out
    }
}

// parsing internals

fn split_mask(s: &str) -> Result<(&str, Option<u32>), AddrError> {
    match s.find('/') {
        None => Ok((s, None)),
        Some(i) => {
            let rest = &s[i + 1..];
            if rest.is_empty() {
                return Err(AddrError::MaskMissing);
            }
            if !rest.bytes().all(|b| b.is_ascii_digit()) {
                return Err(AddrError::MaskNotDecimal);
            }
            let mask: u32 = rest.parse().map_err(|_| AddrError::MaskOutOfRange)?;
            Ok((&s[..i], Some(mask)))
        }
    }
}

fn parse_v4(s: &str) -> Result<[u8; 4], AddrError> {
    let parts: Vec<&str> = s.split('.').collect();
    if parts.len() != 4 {
        return Err(AddrError::MalformedV4);
    }
    let mut out = [0u8; 4];
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            return Err(AddrError::MissingValue);
        }
        if !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AddrError::IllegalChars);
        }
        let v: u32 = part.parse().map_err(|_| AddrError::MalformedV4)?;
        if v > 255 {
            return Err(AddrError::MalformedV4);
        }
        out[i] = v as u8;
    }
    Ok(out)
}

fn parse_v6(s: &str) -> Result<[u8; 16], AddrError> {
    if !s
        .bytes()
        .all(|b| b.is_ascii_hexdigit() || b == b':' || b == b'.')
    {
        return Err(AddrError::IllegalChars);
    }

    let (head, tail) = match s.find("::") {
        Some(i) => {
            let tail = &s[i + 2..];
            if tail.contains("::") {
                return Err(AddrError::DoubleExpansion);
            }
            (&s[..i], Some(tail))
        }
        None => (s, None),
    };

    let head_bytes = parse_v6_groups(head)?;
    let tail_bytes = match tail {
        Some(t) => parse_v6_groups(t)?,
        None => Vec::new(),
    };

    let filled = head_bytes.len() + tail_bytes.len();
    match tail {
        None => {
            if filled != 16 {
                return Err(AddrError::MalformedV6);
            }
        }
        Some(_) => {
            if filled > 14 {
                return Err(AddrError::MalformedV6);
            }
        }
    }

    let mut out = [0u8; 16];
    out[..head_bytes.len()].copy_from_slice(&head_bytes);
    out[16 - tail_bytes.len()..].copy_from_slice(&tail_bytes);
    Ok(out)
}

fn parse_v6_groups(s: &str) -> Result<Vec<u8>, AddrError> {
    let mut out = Vec::new();
    if s.is_empty() {
        return Ok(out);
    }
    let parts: Vec<&str> = s.split(':').collect();
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            return Err(AddrError::MissingValue);
        }
        if part.contains('.') {
            // embedded dotted quad, only valid as the final group pair
            if i != parts.len() - 1 {
                return Err(AddrError::MalformedV6);
            }
            out.extend_from_slice(&parse_v4(part)?);
        } else {
            if part.len() > 4 {
                return Err(AddrError::MalformedV6);
            }
            let v = u16::from_str_radix(part, 16).map_err(|_| AddrError::IllegalChars)?;
            out.extend_from_slice(&v.to_be_bytes());
        }
    }
    Ok(out)
}

fn is_mapped_bytes(addr: &[u8; 16]) -> bool {
    addr[..10].iter().all(|&b| b == 0) && addr[10] == 0xff && addr[11] == 0xff
}

fn resolve(host: &str) -> Result<NetAddress, AddrError> {
    if !host
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-')
    {
        return Err(AddrError::IllegalChars);
    }
    let mut addrs = (host, 0u16)
        .to_socket_addrs()
        .map_err(|_| AddrError::Unresolvable)?;
    match addrs.next() {
        Some(sa) => Ok(NetAddress::from(sa).with_port(0)),
        None => Err(AddrError::Unresolvable),
    }
}

/// Standard `::` compression: squeeze the longest run of two or more
/// zero groups, leftmost on ties.
fn compress_groups(groups: &[u16]) -> String {
    let mut best_start = 0usize;
    let mut best_len = 0usize;
    let mut run_start = 0usize;
    let mut run_len = 0usize;
    for (i, &g) in groups.iter().enumerate() {
        if g == 0 {
            if run_len == 0 {
                run_start = i;
            }
            run_len += 1;
            if run_len > best_len {
                best_start = run_start;
                best_len = run_len;
            }
        } else {
            run_len = 0;
        }
    }
    if best_len < 2 {
        return groups
            .iter()
            .map(|g| format!("{g:x}"))
            .collect::<Vec<_>>()
            .join(":");
    }
    let left: Vec<String> = groups[..best_start].iter().map(|g| format!("{g:x}")).collect();
    let right: Vec<String> = groups[best_start + best_len..]
        .iter()
        .map(|g| format!("{g:x}"))
        .collect();
    format!("{}::{}", left.join(":"), right.join(":"))
}
