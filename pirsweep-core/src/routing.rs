//! Routing tables for meshes with shortcut links.
//!
//! Generates the table used by the simulator's table-based routing: one
//! row per source node, one output port per destination node. Destinations
//! connected through a shortcut use the shortcut's dedicated port, all
//! others follow XY dimension-order routing over the mesh.
//!
//! Nodes are numbered row by row, so node `i` sits at `(i % width, i / width)`.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Output port towards the node above.
pub const PORT_NORTH: u8 = 0;
pub const PORT_EAST: u8 = 1;
pub const PORT_SOUTH: u8 = 2;
pub const PORT_WEST: u8 = 3;
/// Local port, delivering to the node itself.
pub const PORT_LOCAL: u8 = 4;

/// Long-range link between two nodes, reachable through its own port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shortcut {
    pub a: usize,
    pub b: usize,
    pub port: u8,
}

impl Shortcut {
    fn connects(&self, src: usize, dst: usize) -> bool {
        (self.a == src && self.b == dst) || (self.a == dst && self.b == src)
    }
}

impl FromStr for Shortcut {
    type Err = Error;

    /// Parses `a:b:port`, e.g. `0:31:5`.
    fn from_str(s: &str) -> Result<Shortcut> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 3 {
            return Err(Error::InvalidRoutingTable(format!(
                "shortcut must be given as a:b:port, got \"{}\"",
                s
            )));
        }
        Ok(Shortcut {
            a: parts[0].trim().parse()?,
            b: parts[1].trim().parse()?,
            port: parts[2].trim().parse()?,
        })
    }
}

/// Shortcuts of the default 8x4 mesh.
pub fn default_shortcuts() -> Vec<Shortcut> {
    vec![
        Shortcut { a: 0, b: 31, port: 5 },
        Shortcut { a: 7, b: 24, port: 6 },
        Shortcut { a: 12, b: 20, port: 7 },
        Shortcut { a: 4, b: 28, port: 8 },
    ]
}

pub const DEFAULT_WIDTH: usize = 8;
pub const DEFAULT_HEIGHT: usize = 4;

/// Next-hop port for every (source, destination) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingTable {
    ports: Vec<Vec<u8>>,
}

impl RoutingTable {
    /// Builds the table for a `width` x `height` mesh.
    pub fn xy(width: usize, height: usize, shortcuts: &[Shortcut]) -> Result<RoutingTable> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidRoutingTable(format!(
                "mesh dimensions must be positive, got {}x{}",
                width, height
            )));
        }
        let nodes = width * height;
        for shortcut in shortcuts {
            if shortcut.a >= nodes || shortcut.b >= nodes {
                return Err(Error::InvalidRoutingTable(format!(
                    "shortcut {}-{} is outside of the {}-node mesh",
                    shortcut.a, shortcut.b, nodes
                )));
            }
            if shortcut.a == shortcut.b {
                return Err(Error::InvalidRoutingTable(format!(
                    "shortcut connects node {} to itself",
                    shortcut.a
                )));
            }
            if shortcut.port <= PORT_LOCAL {
                return Err(Error::InvalidRoutingTable(format!(
                    "shortcut port {} collides with mesh ports 0-{}",
                    shortcut.port, PORT_LOCAL
                )));
            }
        }

        let mut ports = Vec::with_capacity(nodes);
        for src in 0..nodes {
            let row = (0..nodes)
                .map(|dst| match shortcuts.iter().find(|s| s.connects(src, dst)) {
                    Some(shortcut) => shortcut.port,
                    None => xy_next_hop(width, src, dst),
                })
                .collect();
            ports.push(row);
        }
        Ok(RoutingTable { ports })
    }

    /// Port used at `src` for packets headed to `dst`.
    pub fn port(&self, src: usize, dst: usize) -> Option<u8> {
        self.ports.get(src).and_then(|row| row.get(dst)).copied()
    }
}

impl Default for RoutingTable {
    fn default() -> Self {
        match RoutingTable::xy(DEFAULT_WIDTH, DEFAULT_HEIGHT, &default_shortcuts()) {
            Ok(table) => table,
            Err(e) => unreachable!("default routing table is invalid: {}", e),
        }
    }
}

fn xy_next_hop(width: usize, src: usize, dst: usize) -> u8 {
    let (sx, sy) = (src % width, src / width);
    let (dx, dy) = (dst % width, dst / width);
    if src == dst {
        PORT_LOCAL
    } else if dx > sx {
        PORT_EAST
    } else if dx < sx {
        PORT_WEST
    } else if dy > sy {
        PORT_SOUTH
    } else {
        PORT_NORTH
    }
}

impl fmt::Display for RoutingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.ports {
            let line: Vec<String> = row.iter().map(|p| p.to_string()).collect();
            writeln!(f, "{}", line.join(" "))?;
        }
        Ok(())
    }
}

#[test]
fn xy_routes_x_first() {
    let table = RoutingTable::xy(3, 3, &[]).unwrap();
    // node 0 is top left, node 8 bottom right
    assert_eq!(table.port(0, 0), Some(PORT_LOCAL));
    assert_eq!(table.port(0, 8), Some(PORT_EAST));
    assert_eq!(table.port(8, 0), Some(PORT_WEST));
    assert_eq!(table.port(1, 7), Some(PORT_SOUTH));
    assert_eq!(table.port(7, 1), Some(PORT_NORTH));
    assert_eq!(table.port(9, 0), None);
}

#[test]
fn shortcuts_apply_both_ways() {
    let table = RoutingTable::default();
    assert_eq!(table.port(0, 31), Some(5));
    assert_eq!(table.port(31, 0), Some(5));
    assert_eq!(table.port(20, 12), Some(7));
    assert_eq!(table.port(4, 28), Some(8));
    assert_eq!(table.port(0, 30), Some(PORT_EAST));
}

#[test]
fn display_renders_one_row_per_source() {
    let table = RoutingTable::xy(2, 1, &[]).unwrap();
    assert_eq!(table.to_string(), "4 1\n3 4\n");
    assert_eq!(RoutingTable::default().to_string().lines().count(), 32);
}

#[test]
fn invalid_shortcuts_are_rejected() {
    assert!(RoutingTable::xy(2, 2, &[Shortcut { a: 0, b: 4, port: 5 }]).is_err());
    assert!(RoutingTable::xy(2, 2, &[Shortcut { a: 0, b: 3, port: 2 }]).is_err());
    assert!(RoutingTable::xy(2, 2, &[Shortcut { a: 1, b: 1, port: 5 }]).is_err());
    assert!(RoutingTable::xy(0, 2, &[]).is_err());
}

#[test]
fn parse_shortcut() {
    let shortcut: Shortcut = "12:20:7".parse().unwrap();
    assert_eq!(shortcut, Shortcut { a: 12, b: 20, port: 7 });
    assert!("12:20".parse::<Shortcut>().is_err());
    assert!("a:20:7".parse::<Shortcut>().is_err());
}
