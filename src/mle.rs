//! Mesh Link Establishment collaborator contract.

use std::fmt;

use crate::neighbor::NeighborId;

/// Device role within the mesh partition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Role {
    /// The stack is disabled.
    Disabled,
    /// Not attached to any partition.
    #[default]
    Detached,
    /// Attached as a child.
    Child,
    /// Acting as a router.
    Router,
    /// Acting as the partition leader.
    Leader,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Disabled => "disabled",
            Role::Detached => "detached",
            Role::Child => "child",
            Role::Router => "router",
            Role::Leader => "leader",
        };
        write!(f, "{}", s)
    }
}

/// The slice of MLE state and actions the CSL subsystem depends on.
pub trait Mle {
    /// Current device role.
    fn role(&self) -> Role;

    /// The parent neighbor, when its link is valid.
    fn parent(&self) -> Option<NeighborId>;

    /// The parent candidate currently being attached to.
    fn parent_candidate(&self) -> Option<NeighborId>;

    /// Whether a CSL central is known to be present.
    fn is_csl_central_present(&self) -> bool;

    /// Drop the current attachment and restart the attach process.
    fn become_detached(&mut self);

    /// Ask for the next Child ID Request to be built short enough to fit a
    /// single frame.
    fn request_shorter_child_id_request(&mut self);

    /// Send a Child Update Request to the parent (the keep-alive used by
    /// child supervision).
    fn send_child_update_request(&mut self);
}
