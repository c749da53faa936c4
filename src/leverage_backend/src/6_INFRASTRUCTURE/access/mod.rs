//! Caller identity and capability checks
//!
//! Every state-changing engine operation receives a `CallerIdentity` and asks
//! `AccessPolicy::authorize` for one `Capability`. There is no role
//! inheritance: an operation names exactly what it needs.
//!
//! ## Origin classification
//! The IC encodes the principal class in its last byte:
//! - `0x02` self-authenticating: a key pair held by a person or an off-chain bot.
//!   This is the originator of the call.
//! - `0x01` opaque (canisters), `0x03` derived, management canister: another
//!   program invoking on someone's behalf.
//! - `0x04` anonymous.
//!
//! `DirectOriginator` therefore admits only self-authenticating principals.
//! A canister cannot manipulate a price and trigger ripcord in the same
//! composed call because it is never accepted as a direct caller.

use candid::{CandidType, Deserialize, Principal};
use serde::Serialize;
use crate::infrastructure::errors::{GuardError, LeverageError, Result};

const CLASS_SELF_AUTHENTICATING: u8 = 0x02;
const CLASS_ANONYMOUS: u8 = 0x04;

#[derive(CandidType, Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOrigin {
    /// Ultimate originator of the message
    Direct,
    /// Another program relaying a call
    Delegated,
    Anonymous,
}

#[derive(CandidType, Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub principal: Principal,
    pub origin: CallOrigin,
}

impl CallerIdentity {
    pub fn from_principal(principal: Principal) -> Self {
        let origin = match principal.as_slice().last() {
            Some(&CLASS_SELF_AUTHENTICATING) => CallOrigin::Direct,
            Some(&CLASS_ANONYMOUS) => CallOrigin::Anonymous,
            _ => CallOrigin::Delegated,
        };
        Self { principal, origin }
    }

    pub fn is_direct(&self) -> bool {
        self.origin == CallOrigin::Direct
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Any non-anonymous principal, human or canister
    Authenticated,
    /// Any principal that originated the call itself
    DirectOriginator,
    /// Configured operator, any origin
    Operator,
    /// Configured operator calling directly
    OperatorDirect,
    /// Configured capital router (vault adapter)
    CapitalRouter,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Authenticated => "authenticated",
            Capability::DirectOriginator => "direct-originator",
            Capability::Operator => "operator",
            Capability::OperatorDirect => "operator (direct)",
            Capability::CapitalRouter => "capital-router",
        }
    }
}

#[derive(CandidType, Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicy {
    pub operator: Principal,
    pub capital_router: Principal,
}

impl AccessPolicy {
    pub fn validate(&self) -> Result<()> {
        for (name, p) in [("operator", &self.operator), ("capital_router", &self.capital_router)] {
            if *p == Principal::anonymous() {
                return Err(LeverageError::Guard(GuardError::InvalidConfiguration {
                    reason: format!("{} cannot be the anonymous principal", name),
                }));
            }
        }
        Ok(())
    }

    /// Check `caller` holds `capability` for `operation`
    pub fn authorize(&self, caller: &CallerIdentity, capability: Capability, operation: &str) -> Result<()> {
        if caller.origin == CallOrigin::Anonymous {
            return Err(LeverageError::Guard(GuardError::AnonymousCaller));
        }

        let needs_direct = matches!(capability, Capability::DirectOriginator | Capability::OperatorDirect);
        if needs_direct && !caller.is_direct() {
            return Err(LeverageError::Guard(GuardError::DirectCallerRequired {
                principal: caller.principal.to_text(),
                operation: operation.to_string(),
            }));
        }

        let permitted = match capability {
            Capability::Authenticated | Capability::DirectOriginator => true,
            Capability::Operator | Capability::OperatorDirect => caller.principal == self.operator,
            Capability::CapitalRouter => caller.principal == self.capital_router,
        };

        if permitted {
            Ok(())
        } else {
            Err(LeverageError::Guard(GuardError::Unauthorized {
                principal: caller.principal.to_text(),
                required: capability.as_str().to_string(),
            }))
        }
    }
}
