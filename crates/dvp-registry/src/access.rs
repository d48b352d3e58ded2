//! Access controller: role membership as explicit identity sets.
//!
//! Two independent sets (attestors, oracles) and one admin. Membership is a
//! pure lookup; the only mutators are [`AccessController::grant`] and
//! [`AccessController::revoke`], and both require the admin as caller.
//! Nobody can enroll themselves.
//!
//! Checks happen at the moment of use. Revoking an attestor does not undo
//! proofs it already signed.

use std::collections::HashSet;

use dvp_types::{Address, DvpError, Result, Role};

/// Role registry for one trade registry.
#[derive(Debug, Clone)]
pub struct AccessController {
    admin: Address,
    attestors: HashSet<Address>,
    oracles: HashSet<Address>,
}

impl AccessController {
    #[must_use]
    pub fn new(admin: Address) -> Self {
        Self {
            admin,
            attestors: HashSet::new(),
            oracles: HashSet::new(),
        }
    }

    #[must_use]
    pub fn admin(&self) -> Address {
        self.admin
    }

    #[must_use]
    pub fn is_admin(&self, who: &Address) -> bool {
        *who == self.admin
    }

    #[must_use]
    pub fn has_role(&self, role: Role, who: &Address) -> bool {
        self.members(role).contains(who)
    }

    /// # Errors
    /// [`DvpError::MissingRole`] if `who` lacks `role`.
    pub fn require_role(&self, role: Role, who: &Address) -> Result<()> {
        if self.has_role(role, who) {
            Ok(())
        } else {
            Err(DvpError::MissingRole { role, account: *who })
        }
    }

    fn check_grant(&self, caller: &Address, account: &Address) -> Result<()> {
        self.require_admin(caller)?;
        if account.is_zero() {
            return Err(DvpError::InvalidInput {
                reason: "cannot grant a role to the zero address".to_string(),
            });
        }
        Ok(())
    }

    /// Add `account` to `role`. Returns `true` if membership changed.
    pub fn grant(&mut self, caller: &Address, role: Role, account: Address) -> Result<bool> {
        self.check_grant(caller, &account)?;
        Ok(self.members_mut(role).insert(account))
    }

    /// Remove `account` from `role`. Returns `true` if membership changed.
    pub fn revoke(&mut self, caller: &Address, role: Role, account: &Address) -> Result<bool> {
        self.require_admin(caller)?;
        Ok(self.members_mut(role).remove(account))
    }

    fn require_admin(&self, caller: &Address) -> Result<()> {
        if self.is_admin(caller) {
            Ok(())
        } else {
            Err(DvpError::NotAdmin { caller: *caller })
        }
    }

    fn members(&self, role: Role) -> &HashSet<Address> {
        match role {
            Role::Attestor => &self.attestors,
            Role::Oracle => &self.oracles,
        }
    }

    fn members_mut(&mut self, role: Role) -> &mut HashSet<Address> {
        match role {
            Role::Attestor => &mut self.attestors,
            Role::Oracle => &mut self.oracles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (AccessController, Address) {
        let admin = Address::random();
        (AccessController::new(admin), admin)
    }

    #[test]
    fn admin_grants_and_revokes() {
        let (mut ac, admin) = setup();
        let who = Address::random();

        assert!(ac.grant(&admin, Role::Attestor, who).unwrap());
        assert!(ac.has_role(Role::Attestor, &who));
        assert!(!ac.has_role(Role::Oracle, &who), "roles are independent");

        assert!(ac.revoke(&admin, Role::Attestor, &who).unwrap());
        assert!(!ac.has_role(Role::Attestor, &who));
    }

    #[test]
    fn repeated_grant_is_noop() {
        let (mut ac, admin) = setup();
        let who = Address::random();
        assert!(ac.grant(&admin, Role::Oracle, who).unwrap());
        assert!(!ac.grant(&admin, Role::Oracle, who).unwrap());
        assert_eq!(ac.oracles.len(), 1);
        assert!(!ac.revoke(&admin, Role::Oracle, &Address::random()).unwrap());
    }

    #[test]
    fn no_self_enrollment() {
        let (mut ac, _admin) = setup();
        let who = Address::random();
        let err = ac.grant(&who, Role::Attestor, who).unwrap_err();
        assert!(matches!(err, DvpError::NotAdmin { caller } if caller == who));
        assert!(!ac.has_role(Role::Attestor, &who));
    }

    #[test]
    fn non_admin_cannot_revoke() {
        let (mut ac, admin) = setup();
        let who = Address::random();
        ac.grant(&admin, Role::Oracle, who).unwrap();
        assert!(ac.revoke(&who, Role::Oracle, &who).is_err());
        assert!(ac.has_role(Role::Oracle, &who));
    }

    #[test]
    fn zero_address_rejected() {
        let (mut ac, admin) = setup();
        let err = ac.grant(&admin, Role::Attestor, Address::ZERO).unwrap_err();
        assert!(matches!(err, DvpError::InvalidInput { .. }));
    }

    #[test]
    fn require_role_reports_account() {
        let (ac, _) = setup();
        let who = Address::random();
        let err = ac.require_role(Role::Oracle, &who).unwrap_err();
        assert!(matches!(
            err,
            DvpError::MissingRole { role: Role::Oracle, account } if account == who
        ));
    }
}
