/// Closed set of caller roles. Handlers gate on one capability from the
/// table below instead of re-branching on the role inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Bursar,
    Teacher,
    Parent,
}

impl Role {
    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "admin" => Some(Role::Admin),
            "bursar" => Some(Role::Bursar),
            "teacher" => Some(Role::Teacher),
            "parent" => Some(Role::Parent),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Bursar => "bursar",
            Role::Teacher => "teacher",
            Role::Parent => "parent",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    ManageSchools,
    ManageRoster,
    ManageFees,
    RecordPayment,
    RecordGatewayPayment,
    ReversePayment,
    ViewBalances,
    ViewLedger,
    RunSweep,
    ManagePayroll,
    ExportBackup,
}

pub fn capabilities(role: Role) -> &'static [Capability] {
    use Capability::*;
    match role {
        Role::Admin => &[
            ManageSchools,
            ManageRoster,
            ManageFees,
            RecordPayment,
            RecordGatewayPayment,
            ReversePayment,
            ViewBalances,
            ViewLedger,
            RunSweep,
            ManagePayroll,
            ExportBackup,
        ],
        Role::Bursar => &[
            ManageFees,
            RecordPayment,
            RecordGatewayPayment,
            ViewBalances,
            ViewLedger,
            RunSweep,
            ManagePayroll,
            ExportBackup,
        ],
        Role::Teacher => &[ManageRoster, ViewBalances],
        Role::Parent => &[RecordGatewayPayment, ViewBalances],
    }
}

pub fn allows(role: Role, cap: Capability) -> bool {
    capabilities(role).contains(&cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_holds_every_capability() {
        for cap in [
            Capability::ManageSchools,
            Capability::ManageRoster,
            Capability::ManageFees,
            Capability::RecordPayment,
            Capability::RecordGatewayPayment,
            Capability::ReversePayment,
            Capability::ViewBalances,
            Capability::ViewLedger,
            Capability::RunSweep,
            Capability::ManagePayroll,
            Capability::ExportBackup,
        ] {
            assert!(allows(Role::Admin, cap), "admin missing {:?}", cap);
        }
    }

    #[test]
    fn reversal_is_admin_only() {
        assert!(allows(Role::Admin, Capability::ReversePayment));
        assert!(!allows(Role::Bursar, Capability::ReversePayment));
        assert!(!allows(Role::Teacher, Capability::ReversePayment));
        assert!(!allows(Role::Parent, Capability::ReversePayment));
    }

    #[test]
    fn parent_pays_through_gateway_but_cannot_manage() {
        assert!(allows(Role::Parent, Capability::RecordGatewayPayment));
        assert!(allows(Role::Parent, Capability::ViewBalances));
        assert!(!allows(Role::Parent, Capability::RecordPayment));
        assert!(!allows(Role::Parent, Capability::ManageFees));
    }

    #[test]
    fn parse_round_trips_known_roles() {
        for role in [Role::Admin, Role::Bursar, Role::Teacher, Role::Parent] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("principal"), None);
    }
}
