//! Role predicates. Handlers ask the viewer for one of these before touching
//! data that is not their own.

use crate::entities::sea_orm_active_enums::Role;

impl Role {
    pub fn is_staff(self) -> bool {
        matches!(self, Role::Admin | Role::Pastor)
    }

    pub fn is_admin(self) -> bool {
        matches!(self, Role::Admin)
    }

    pub fn can_manage_members(self) -> bool {
        self.is_staff()
    }

    pub fn can_view_donations(self) -> bool {
        matches!(self, Role::Admin | Role::Pastor | Role::Treasurer)
    }

    pub fn can_manage_donations(self) -> bool {
        matches!(self, Role::Admin | Role::Treasurer)
    }

    pub fn can_manage_events(self) -> bool {
        matches!(self, Role::Admin | Role::Pastor | Role::GroupLeader)
    }

    pub fn can_manage_volunteers(self) -> bool {
        matches!(self, Role::Admin | Role::Pastor | Role::GroupLeader)
    }

    pub fn can_send_communications(self) -> bool {
        self.is_staff()
    }

    pub fn can_manage_help_requests(self) -> bool {
        self.is_staff()
    }

    pub fn can_manage_onboarding(self) -> bool {
        self.is_staff()
    }

    pub fn can_check_in(self) -> bool {
        matches!(
            self,
            Role::Admin | Role::Pastor | Role::GroupLeader | Role::Volunteer
        )
    }

    pub fn can_view_reports(self) -> bool {
        matches!(self, Role::Admin | Role::Pastor | Role::Treasurer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::Iterable;

    type Predicate = fn(Role) -> bool;

    fn allowed(predicate: Predicate) -> Vec<Role> {
        Role::iter().filter(|role| predicate(*role)).collect()
    }

    #[test]
    fn permission_matrix() {
        use Role::*;

        let matrix: [(&str, Predicate, Vec<Role>); 10] = [
            ("manage members", Role::can_manage_members, vec![Admin, Pastor]),
            (
                "view donations",
                Role::can_view_donations,
                vec![Admin, Pastor, Treasurer],
            ),
            ("manage donations", Role::can_manage_donations, vec![Admin, Treasurer]),
            (
                "manage events",
                Role::can_manage_events,
                vec![Admin, Pastor, GroupLeader],
            ),
            (
                "manage volunteers",
                Role::can_manage_volunteers,
                vec![Admin, Pastor, GroupLeader],
            ),
            ("send communications", Role::can_send_communications, vec![Admin, Pastor]),
            ("manage help requests", Role::can_manage_help_requests, vec![Admin, Pastor]),
            ("manage onboarding", Role::can_manage_onboarding, vec![Admin, Pastor]),
            (
                "check in",
                Role::can_check_in,
                vec![Admin, Pastor, GroupLeader, Volunteer],
            ),
            (
                "view reports",
                Role::can_view_reports,
                vec![Admin, Pastor, Treasurer],
            ),
        ];

        for (name, predicate, expected) in matrix {
            assert_eq!(allowed(predicate), expected, "{name}");
        }
    }

    #[test]
    fn plain_members_have_no_elevated_rights() {
        let role = Role::Member;
        assert!(!role.is_staff());
        assert!(!role.can_check_in());
        assert!(!role.can_view_reports());
    }
}
