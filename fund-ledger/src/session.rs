//! Identity lookup and role scoping
//!
//! Login is an identity lookup by mobile number, not a credential check. A
//! [`Session`] only remembers the member id; the role is re-read from the
//! store every time the session is used.

use crate::{
    types::{AppData, Member, MemberId, Role},
    Error, Result,
};

/// Look up the member registered under `mobile`.
///
/// Fails with [`Error::NotFound`] for an unknown number and
/// [`Error::Disabled`] for an inactive member.
pub fn authenticate<'a>(data: &'a AppData, mobile: &str) -> Result<&'a Member> {
    let member = data
        .member_by_mobile(mobile)
        .ok_or_else(|| Error::NotFound("mobile number not recognized".to_string()))?;
    if !member.is_active() {
        return Err(Error::Disabled(member.member_id.clone()));
    }
    Ok(member)
}

/// Logged-in session bound to one member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    member_id: MemberId,
}

impl Session {
    /// Bind a session to an authenticated member
    pub fn new(member: &Member) -> Self {
        Self {
            member_id: member.member_id.clone(),
        }
    }

    /// Member the session belongs to
    pub fn member_id(&self) -> &MemberId {
        &self.member_id
    }

    /// Re-read the session's member from the store.
    ///
    /// A session whose member no longer exists is treated as logged out.
    pub fn resolve<'a>(&self, data: &'a AppData) -> Result<&'a Member> {
        data.member(&self.member_id).ok_or(Error::Unauthenticated)
    }
}

/// Rows a member may see
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope<'a> {
    /// Everything
    All,
    /// Only rows with this member id
    Own(&'a MemberId),
}

impl<'a> Scope<'a> {
    /// Scope for a viewer
    pub fn for_member(member: &'a Member) -> Self {
        match member.role {
            Role::Admin => Scope::All,
            Role::Member => Scope::Own(&member.member_id),
        }
    }

    /// Whether a row owned by `member_id` is visible
    pub fn permits(&self, member_id: &MemberId) -> bool {
        match self {
            Scope::All => true,
            Scope::Own(own) => *own == member_id,
        }
    }
}

/// Require the admin role
pub fn require_admin(member: &Member) -> Result<()> {
    if member.is_admin() {
        Ok(())
    } else {
        Err(Error::Forbidden(member.member_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed::initial_data;
    use crate::types::MemberStatus;

    #[test]
    fn test_authenticate_active_member() {
        let data = initial_data();
        let member = authenticate(&data, "9988776655").unwrap();
        assert_eq!(member.member_id, MemberId::new("M002"));
        assert_eq!(member.role, Role::Member);
    }

    #[test]
    fn test_authenticate_unknown_mobile() {
        let data = initial_data();
        let err = authenticate(&data, "0000000000").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(err.to_string().contains("not recognized"));
    }

    #[test]
    fn test_authenticate_inactive_member() {
        let mut data = initial_data();
        data.members[2].status = MemberStatus::Inactive;
        let err = authenticate(&data, "9123456789").unwrap_err();
        assert!(matches!(err, Error::Disabled(id) if id == MemberId::new("M003")));
    }

    #[test]
    fn test_session_resolves_current_role() {
        let mut data = initial_data();
        let session = Session::new(authenticate(&data, "9988776655").unwrap());
        data.members[1].role = Role::Admin;
        assert!(session.resolve(&data).unwrap().is_admin());

        data.members.remove(1);
        assert!(matches!(session.resolve(&data), Err(Error::Unauthenticated)));
    }

    #[test]
    fn test_scope() {
        let data = initial_data();
        let admin = Scope::for_member(&data.members[0]);
        let member = Scope::for_member(&data.members[1]);
        assert!(admin.permits(&MemberId::new("M004")));
        assert!(member.permits(&MemberId::new("M002")));
        assert!(!member.permits(&MemberId::new("M001")));
        assert!(require_admin(&data.members[0]).is_ok());
        assert!(matches!(
            require_admin(&data.members[1]),
            Err(Error::Forbidden(_))
        ));
    }
}
