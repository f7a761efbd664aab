//! Address blocks, subnet carving, and security-group rule primitives.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Invalid IPv4 CIDR block: {0}")]
    InvalidCidr(String),

    #[error("Address block {block} has no room left for a /{mask} subnet")]
    AddressSpaceExhausted { block: String, mask: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Cidr {
    network: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Cidr {
    pub fn new(network: Ipv4Addr, prefix: u8) -> Result<Self, Error> {
        let candidate = format!("{}/{}", network, prefix);
        if prefix > 32 {
            return Err(Error::InvalidCidr(candidate));
        }

        let cidr = Self { network, prefix };
        if u32::from(network) & !cidr.mask() != 0 {
            return Err(Error::InvalidCidr(candidate));
        }
        Ok(cidr)
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    pub fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix))
    }

    /// True for the unrestricted 0.0.0.0/0 block.
    pub fn is_any(&self) -> bool {
        self.prefix == 0
    }

    fn start(&self) -> u64 {
        u64::from(u32::from(self.network))
    }

    fn mask(&self) -> u32 {
        if self.prefix == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(self.prefix))
        }
    }
}

impl FromStr for Ipv4Cidr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidCidr(s.to_string());
        let (address, prefix) = s.split_once('/').ok_or_else(invalid)?;
        let network = Ipv4Addr::from_str(address).map_err(|_| invalid())?;
        let prefix = prefix.parse::<u8>().map_err(|_| invalid())?;
        Ipv4Cidr::new(network, prefix)
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

/// Hands out consecutive subnets of a block, each aligned to its own size.
#[derive(Debug)]
pub struct SubnetAllocator {
    block: Ipv4Cidr,
    next: u64,
}

impl SubnetAllocator {
    pub fn new(block: Ipv4Cidr) -> Self {
        Self {
            next: block.start(),
            block,
        }
    }

    pub fn allocate(&mut self, mask: u8) -> Result<Ipv4Cidr, Error> {
        let exhausted = || Error::AddressSpaceExhausted {
            block: self.block.to_string(),
            mask,
        };
        if mask < self.block.prefix || mask > 32 {
            return Err(exhausted());
        }

        let size = 1u64 << (32 - u32::from(mask));
        let start = (self.next + size - 1) / size * size;
        let end = start + size;
        if end > self.block.start() + self.block.size() {
            return Err(exhausted());
        }

        self.next = end;
        Ipv4Cidr::new(Ipv4Addr::from(start as u32), mask)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubnetType {
    Public,
    PrivateWithEgress,
    PrivateIsolated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Port {
    Tcp(u16),
    IcmpPing,
    AllTraffic,
}

impl Port {
    /// `(IpProtocol, FromPort, ToPort)` as security-group rules spell them.
    pub fn rule_fields(&self) -> (&'static str, Option<i32>, Option<i32>) {
        match self {
            Port::Tcp(port) => ("tcp", Some(i32::from(*port)), Some(i32::from(*port))),
            Port::IcmpPing => ("icmp", Some(8), Some(-1)),
            Port::AllTraffic => ("-1", None, None),
        }
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Port::Tcp(port) => write!(f, "tcp/{}", port),
            Port::IcmpPing => write!(f, "icmp echo"),
            Port::AllTraffic => write!(f, "all traffic"),
        }
    }
}
