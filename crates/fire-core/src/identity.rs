//! Owning-identity resolution
//!
//! The firewall keys per-application state by a numeric identity. Mapping
//! package identifiers to identities, and packets to their owners, is the
//! host platform's job; the core only consumes these traits.

/// Numeric owning identity of an application
pub type Uid = i32;

/// Identity of traffic whose owner is not known
pub const UNKNOWN_UID: Uid = -1;

/// Maps package identifiers to numeric identities and back
#[cfg_attr(test, mockall::automock)]
pub trait IdentityResolver: Send + Sync {
    /// Numeric identity currently assigned to `package`
    fn resolve_uid(&self, package: &str) -> Option<Uid>;

    /// Package identifier owning `uid`
    fn resolve_name(&self, uid: Uid) -> Option<String>;
}

/// Resolver that knows nobody
#[derive(Debug, Clone, Copy, Default)]
pub struct NullResolver;

impl IdentityResolver for NullResolver {
    fn resolve_uid(&self, _package: &str) -> Option<Uid> {
        None
    }

    fn resolve_name(&self, _uid: Uid) -> Option<String> {
        None
    }
}

/// Attributes a raw outgoing packet to the application that sent it
pub trait OwnerLookup: Send + Sync {
    /// Owner of `packet`, or [`UNKNOWN_UID`]
    fn owner_of(&self, packet: &[u8]) -> Uid;
}

/// Lookup used when the platform cannot attribute packets
#[derive(Debug, Clone, Copy, Default)]
pub struct UnknownOwner;

impl OwnerLookup for UnknownOwner {
    fn owner_of(&self, _packet: &[u8]) -> Uid {
        UNKNOWN_UID
    }
}

/// Whether `uid` names a real application
pub fn is_known(uid: Uid) -> bool {
    uid >= 0
}
