//! Inter-prefix routing: a graph of per-prefix LAN switches, all-pairs-
//! shortest-paths next-hop computation, and the `HierarchyRouter`
//! per-connection adapter that migrates between LAN switches.

mod error;
mod router;
mod routes;
mod wan;

pub use error::Error;
pub use router::HierarchyRouter;
pub use routes::{EdgeDiff, Prefix, RouteTable};
pub use wan::{dispatch_decoded, Wan};
