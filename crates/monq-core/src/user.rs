//! Per-user authorization.
//!
//! A query without `AuthUser` sees everything. With it, rows are gated on
//! contact assignments: strict service authorization demands the service
//! itself name the contact, loose also accepts the host's contacts. Group
//! authorization is any-member (loose) or all-members (strict).

use crate::model::{Contact, Host, HostGroup, ObjectGraph, Service, ServiceGroup};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceAuthorization {
    #[default]
    Loose,
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupAuthorization {
    #[default]
    Loose,
    Strict,
}

#[derive(Clone, Copy)]
pub struct AuthUser<'a> {
    contact: &'a Contact,
    service_auth: ServiceAuthorization,
    group_auth: GroupAuthorization,
    graph: &'a ObjectGraph,
}

/// The user a query runs as.
#[derive(Clone, Copy, Default)]
pub enum User<'a> {
    /// No `AuthUser` header: the query sees everything.
    #[default]
    NoAuth,
    /// `AuthUser` named a contact the core does not know: the query sees
    /// nothing.
    Unknown,
    Contact(AuthUser<'a>),
}

impl<'a> User<'a> {
    pub fn from_name(
        graph: &'a ObjectGraph,
        name: Option<&str>,
        service_auth: ServiceAuthorization,
        group_auth: GroupAuthorization,
    ) -> User<'a> {
        match name {
            None => User::NoAuth,
            Some(name) => match graph.find_contact(name) {
                Some(contact) => User::Contact(AuthUser {
                    contact,
                    service_auth,
                    group_auth,
                    graph,
                }),
                None => User::Unknown,
            },
        }
    }

    pub fn is_authorized_for_host(&self, host: &Host) -> bool {
        match self {
            User::NoAuth => true,
            User::Unknown => false,
            User::Contact(auth) => auth.host_has_contact(host),
        }
    }

    pub fn is_authorized_for_service(&self, service: &Service) -> bool {
        match self {
            User::NoAuth => true,
            User::Unknown => false,
            User::Contact(auth) => {
                auth.service_has_contact(service)
                    || (auth.service_auth == ServiceAuthorization::Loose
                        && auth.host_has_contact(auth.graph.host(service.host)))
            }
        }
    }

    pub fn is_authorized_for_host_group(&self, group: &HostGroup) -> bool {
        match self {
            User::NoAuth => true,
            User::Unknown => false,
            User::Contact(auth) => {
                let authorized =
                    |id: &crate::model::HostId| self.is_authorized_for_host(auth.graph.host(*id));
                match auth.group_auth {
                    GroupAuthorization::Loose => group.members.iter().any(authorized),
                    GroupAuthorization::Strict => group.members.iter().all(authorized),
                }
            }
        }
    }

    pub fn is_authorized_for_service_group(&self, group: &ServiceGroup) -> bool {
        match self {
            User::NoAuth => true,
            User::Unknown => false,
            User::Contact(auth) => {
                let authorized = |id: &crate::model::ServiceId| {
                    self.is_authorized_for_service(auth.graph.service(*id))
                };
                match auth.group_auth {
                    GroupAuthorization::Loose => group.members.iter().any(authorized),
                    GroupAuthorization::Strict => group.members.iter().all(authorized),
                }
            }
        }
    }

    /// The gate used by history rows, which may refer to objects that no
    /// longer exist.
    pub fn is_authorized_for_object(
        &self,
        host: Option<&Host>,
        service: Option<&Service>,
        authorized_if_no_host: bool,
    ) -> bool {
        match (host, service) {
            (None, _) => match self {
                User::NoAuth => true,
                _ => authorized_if_no_host,
            },
            (Some(_), Some(svc)) => self.is_authorized_for_service(svc),
            (Some(hst), None) => self.is_authorized_for_host(hst),
        }
    }
}

impl<'a> AuthUser<'a> {
    fn host_has_contact(&self, host: &Host) -> bool {
        host.contacts.contains(&self.contact.id)
            || host.contact_groups.iter().any(|gid| {
                self.graph
                    .contact_group(*gid)
                    .members
                    .contains(&self.contact.id)
            })
    }

    fn service_has_contact(&self, service: &Service) -> bool {
        service.contacts.contains(&self.contact.id)
            || service.contact_groups.iter().any(|gid| {
                self.graph
                    .contact_group(*gid)
                    .members
                    .contains(&self.contact.id)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ContactGroup, HostGroup, ObjectGraph, Service};

    fn graph() -> ObjectGraph {
        let mut g = ObjectGraph::new();
        let alice = g.insert_contact(Contact {
            name: "alice".into(),
            ..Contact::default()
        });
        let bob = g.insert_contact(Contact {
            name: "bob".into(),
            ..Contact::default()
        });
        let oncall = g.insert_contact_group(ContactGroup {
            name: "oncall".into(),
            members: vec![bob],
            ..ContactGroup::default()
        });
        let h1 = g.insert_host(Host {
            name: "h1".into(),
            contacts: vec![alice],
            ..Host::default()
        });
        let h2 = g.insert_host(Host {
            name: "h2".into(),
            contact_groups: vec![oncall],
            ..Host::default()
        });
        g.insert_service(Service {
            host: h1,
            description: "ping".into(),
            ..Service::default()
        });
        g.insert_service(Service {
            host: h2,
            description: "ping".into(),
            contacts: vec![alice],
            ..Service::default()
        });
        g.insert_host_group(HostGroup {
            name: "all".into(),
            members: vec![h1, h2],
            ..HostGroup::default()
        });
        g
    }

    #[test]
    fn no_auth_sees_everything_unknown_sees_nothing() {
        let g = graph();
        let h = g.find_host("h1").unwrap();
        assert!(User::NoAuth.is_authorized_for_host(h));
        let unknown = User::from_name(&g, Some("nobody"), Default::default(), Default::default());
        assert!(!unknown.is_authorized_for_host(h));
    }

    #[test]
    fn host_contact_via_group_membership() {
        let g = graph();
        let bob = User::from_name(&g, Some("bob"), Default::default(), Default::default());
        assert!(bob.is_authorized_for_host(g.find_host("h2").unwrap()));
        assert!(!bob.is_authorized_for_host(g.find_host("h1").unwrap()));
    }

    #[test]
    fn loose_service_authorization_falls_back_to_the_host() {
        let g = graph();
        let svc = g.find_service("h1", "ping").unwrap();
        let loose = User::from_name(
            &g,
            Some("alice"),
            ServiceAuthorization::Loose,
            Default::default(),
        );
        assert!(loose.is_authorized_for_service(svc));
        let strict = User::from_name(
            &g,
            Some("alice"),
            ServiceAuthorization::Strict,
            Default::default(),
        );
        assert!(!strict.is_authorized_for_service(svc));
        // direct service contact passes either way
        assert!(strict.is_authorized_for_service(g.find_service("h2", "ping").unwrap()));
    }

    #[test]
    fn group_authorization_any_vs_all_members() {
        let g = graph();
        let group = g.find_host_group("all").unwrap();
        let loose = User::from_name(
            &g,
            Some("alice"),
            Default::default(),
            GroupAuthorization::Loose,
        );
        assert!(loose.is_authorized_for_host_group(group));
        let strict = User::from_name(
            &g,
            Some("alice"),
            Default::default(),
            GroupAuthorization::Strict,
        );
        assert!(!strict.is_authorized_for_host_group(group));
    }
}
