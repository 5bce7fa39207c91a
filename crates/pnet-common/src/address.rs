//! Virtual addresses and address blocks.
//!
//! A virtual address is an ordered 4-tuple of non-negative integers,
//! rendered `a.b.c.d`. An address *block* has the same shape but allows
//! `*` in one or more trailing components; `*.*.*.*` is the root block.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// A single component of an address block: either a concrete value or a
/// wildcard (`*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockPart {
    Value(u32),
    Wildcard,
}

impl fmt::Display for BlockPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockPart::Value(v) => write!(f, "{v}"),
            BlockPart::Wildcard => write!(f, "*"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidAddress {
    #[error("address string not of form a.b.c.d: {0:?}")]
    WrongShape(String),
    #[error("address parts must be non-negative integers, got {0:?}")]
    NotAnInteger(String),
}

/// A concrete virtual address: four non-negative integers, `zone.network.device.index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Addr {
    pub zone: u32,
    pub network: u32,
    pub device: u32,
    pub index: u32,
}

impl Addr {
    /// The sentinel address used to zero out the endpoint a `PortKey` isn't
    /// keyed on (e.g. the destination half of a source-only key).
    pub const UNSPECIFIED: Addr = Addr::new(0, 0, 0, 0);

    pub const fn new(zone: u32, network: u32, device: u32, index: u32) -> Self {
        Addr {
            zone,
            network,
            device,
            index,
        }
    }

    pub fn parts(&self) -> [u32; 4] {
        [self.zone, self.network, self.device, self.index]
    }

    /// The address block identical to this address (no wildcards).
    pub fn as_block(&self) -> AddrBlock {
        AddrBlock {
            parts: self.parts().map(BlockPart::Value),
        }
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.zone, self.network, self.device, self.index)
    }
}

impl FromStr for Addr {
    type Err = InvalidAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = split_four(s)?;
        let mut values = [0u32; 4];
        for (i, part) in parts.iter().enumerate() {
            values[i] = part
                .parse::<u32>()
                .map_err(|_| InvalidAddress::NotAnInteger(s.to_string()))?;
        }
        Ok(Addr::new(values[0], values[1], values[2], values[3]))
    }
}

/// An address block: same shape as [`Addr`] but any trailing component (and,
/// per the original semantics, any individual component) may be `*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddrBlock {
    parts: [BlockPart; 4],
}

impl AddrBlock {
    pub const ROOT: AddrBlock = AddrBlock {
        parts: [BlockPart::Wildcard; 4],
    };

    pub fn new(parts: [BlockPart; 4]) -> Self {
        AddrBlock { parts }
    }

    pub fn parts(&self) -> [BlockPart; 4] {
        self.parts
    }

    /// Is the string a well-formed address or address block (i.e. four
    /// dot-separated parts, each either a non-negative integer or `*`)?
    pub fn is_valid_str(s: &str) -> bool {
        Self::from_str(s).is_ok()
    }

    /// `true` iff every non-`*` component of `self` equals the
    /// corresponding component of `addr`.
    pub fn is_parent_of(&self, addr: &Addr) -> bool {
        let addr_parts = addr.parts();
        for (block_part, addr_part) in self.parts.iter().zip(addr_parts.iter()) {
            if let BlockPart::Value(v) = block_part {
                if v != addr_part {
                    return false;
                }
            }
        }
        true
    }

    /// The next block up the parent chain: the same block with its last
    /// concrete (non-wildcard) trailing component replaced by `*`. Returns
    /// `None` once this block is already the root `*.*.*.*`.
    pub fn parent_block(&self) -> Option<AddrBlock> {
        let last_concrete = self.parts.iter().rposition(|p| matches!(p, BlockPart::Value(_)))?;
        let mut parts = self.parts;
        parts[last_concrete] = BlockPart::Wildcard;
        Some(AddrBlock { parts })
    }

    /// Iterate this block, then its parent, then its parent's parent, ...,
    /// ending at (and including) the root `*.*.*.*`.
    pub fn chain(&self) -> ParentChain {
        ParentChain { current: Some(*self) }
    }

    /// Build the block obtained by wildcarding the trailing `wildcard_count`
    /// components of `addr` (0 = exact address, 4 = root). Used by VNIC
    /// promiscuity levels.
    pub fn from_addr_wildcarding(addr: &Addr, wildcard_count: u8) -> AddrBlock {
        let mut block = addr.as_block();
        for _ in 0..wildcard_count.min(4) {
            block = block.parent_block().unwrap_or(AddrBlock::ROOT);
        }
        block
    }
}

pub struct ParentChain {
    current: Option<AddrBlock>,
}

impl Iterator for ParentChain {
    type Item = AddrBlock;

    fn next(&mut self) -> Option<AddrBlock> {
        let cur = self.current?;
        self.current = cur.parent_block();
        Some(cur)
    }
}

impl fmt::Display for AddrBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.parts[0], self.parts[1], self.parts[2], self.parts[3]
        )
    }
}

impl FromStr for AddrBlock {
    type Err = InvalidAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw_parts = split_four(s)?;
        let mut parts = [BlockPart::Wildcard; 4];
        for (i, raw) in raw_parts.iter().enumerate() {
            parts[i] = if *raw == "*" {
                BlockPart::Wildcard
            } else {
                BlockPart::Value(
                    raw.parse::<u32>()
                        .map_err(|_| InvalidAddress::NotAnInteger(s.to_string()))?,
                )
            };
        }
        Ok(AddrBlock { parts })
    }
}

fn split_four(s: &str) -> Result<[&str; 4], InvalidAddress> {
    let mut iter = s.split('.');
    let parts = [
        iter.next().ok_or_else(|| InvalidAddress::WrongShape(s.to_string()))?,
        iter.next().ok_or_else(|| InvalidAddress::WrongShape(s.to_string()))?,
        iter.next().ok_or_else(|| InvalidAddress::WrongShape(s.to_string()))?,
        iter.next().ok_or_else(|| InvalidAddress::WrongShape(s.to_string()))?,
    ];
    if iter.next().is_some() {
        return Err(InvalidAddress::WrongShape(s.to_string()));
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays() {
        let a: Addr = "20.174.5.1".parse().unwrap();
        assert_eq!(a, Addr::new(20, 174, 5, 1));
        assert_eq!(a.to_string(), "20.174.5.1");
    }

    #[test]
    fn rejects_malformed() {
        assert!("1.2.3".parse::<Addr>().is_err());
        assert!("1.2.3.x".parse::<Addr>().is_err());
        assert!("1.2.3.*".parse::<Addr>().is_err());
        assert!("1.2.3.4.5".parse::<Addr>().is_err());
    }

    #[test]
    fn root_block_matches_every_address() {
        let a: Addr = "9.9.9.9".parse().unwrap();
        assert!(AddrBlock::ROOT.is_parent_of(&a));
    }

    #[test]
    fn parent_chain_walks_to_root() {
        let a: Addr = "1.2.3.4".parse().unwrap();
        let chain: Vec<String> = a.as_block().chain().map(|b| b.to_string()).collect();
        assert_eq!(
            chain,
            vec!["1.2.3.4", "1.2.3.*", "1.2.*.*", "1.*.*.*", "*.*.*.*"]
        );
    }

    #[test]
    fn wildcard_block_parses() {
        let b: AddrBlock = "2.2.*.*".parse().unwrap();
        let a: Addr = "2.2.7.9".parse().unwrap();
        assert!(b.is_parent_of(&a));
        let other: Addr = "2.3.7.9".parse().unwrap();
        assert!(!b.is_parent_of(&other));
    }

    #[test]
    fn promiscuity_wildcarding() {
        let a: Addr = "1.1.1.1".parse().unwrap();
        assert_eq!(AddrBlock::from_addr_wildcarding(&a, 0).to_string(), "1.1.1.1");
        assert_eq!(AddrBlock::from_addr_wildcarding(&a, 2).to_string(), "1.1.*.*");
        assert_eq!(AddrBlock::from_addr_wildcarding(&a, 4).to_string(), "*.*.*.*");
        assert_eq!(AddrBlock::from_addr_wildcarding(&a, 10).to_string(), "*.*.*.*");
    }
}
