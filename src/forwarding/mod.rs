//! Port Forwarding Module
//!
//! Local port forwarding through a bastion, used to reach a store that is
//! only routable from the bastion's network.

mod local;
mod tunnel;

pub use local::{start_local_forward, ForwardStats, LocalForward, LocalForwardHandle};
pub use tunnel::Tunnel;
