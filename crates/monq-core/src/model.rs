//! The live object graph: hosts, services, contacts, groups, timeperiods,
//! comments and downtimes.
//!
//! The graph is arena-shaped: entities live in flat vectors and refer to
//! each other by index. Back references (service to host, downtime to its
//! object) are indices too, so the whole graph is a plain owned value with
//! no interior cycles. The monitoring core owns one graph for the process
//! lifetime; the query engine only ever borrows it.

use std::collections::{BTreeMap, HashMap};

macro_rules! id_type {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(pub usize);
    };
}

id_type!(HostId);
id_type!(ServiceId);
id_type!(HostGroupId);
id_type!(ServiceGroupId);
id_type!(ContactId);
id_type!(ContactGroupId);

#[derive(Debug, Clone, Default)]
pub struct Host {
    pub id: HostId,
    pub name: String,
    pub display_name: String,
    pub alias: String,
    pub address: String,
    /// 0 up, 1 down, 2 unreachable.
    pub state: i64,
    /// 0 soft, 1 hard.
    pub state_type: i64,
    pub has_been_checked: bool,
    pub last_check: i64,
    pub next_check: i64,
    pub last_state_change: i64,
    pub last_hard_state_change: i64,
    pub last_hard_state: i64,
    pub plugin_output: String,
    pub long_plugin_output: String,
    pub perf_data: String,
    pub check_command: String,
    pub current_attempt: i64,
    pub max_check_attempts: i64,
    pub latency: f64,
    pub execution_time: f64,
    pub acknowledged: bool,
    pub scheduled_downtime_depth: i64,
    pub is_flapping: bool,
    pub checks_enabled: bool,
    pub accept_passive_checks: bool,
    pub notifications_enabled: bool,
    pub notification_period: String,
    pub service_period: String,
    pub check_period: String,
    pub notes: String,
    pub notes_url: String,
    pub action_url: String,
    pub icon_image: String,
    pub parents: Vec<HostId>,
    pub childs: Vec<HostId>,
    pub services: Vec<ServiceId>,
    pub groups: Vec<HostGroupId>,
    pub contacts: Vec<ContactId>,
    pub contact_groups: Vec<ContactGroupId>,
    /// Raw attributes, including the mangled `_TAG_`/`_LABEL_`/
    /// `_LABELSOURCE_` entries. Decoded views live in [`crate::attrs`].
    pub custom_variables: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default)]
pub struct Service {
    pub id: ServiceId,
    pub host: HostId,
    pub description: String,
    pub display_name: String,
    /// 0 ok, 1 warning, 2 critical, 3 unknown.
    pub state: i64,
    pub state_type: i64,
    pub has_been_checked: bool,
    pub last_check: i64,
    pub next_check: i64,
    pub last_state_change: i64,
    pub last_hard_state_change: i64,
    pub last_hard_state: i64,
    pub plugin_output: String,
    pub long_plugin_output: String,
    pub perf_data: String,
    pub check_command: String,
    pub current_attempt: i64,
    pub max_check_attempts: i64,
    pub latency: f64,
    pub execution_time: f64,
    pub acknowledged: bool,
    pub scheduled_downtime_depth: i64,
    pub is_flapping: bool,
    pub checks_enabled: bool,
    pub accept_passive_checks: bool,
    pub notifications_enabled: bool,
    pub notification_period: String,
    pub service_period: String,
    pub check_period: String,
    pub notes: String,
    pub notes_url: String,
    pub action_url: String,
    pub icon_image: String,
    pub groups: Vec<ServiceGroupId>,
    pub contacts: Vec<ContactId>,
    pub contact_groups: Vec<ContactGroupId>,
    pub custom_variables: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default)]
pub struct HostGroup {
    pub id: HostGroupId,
    pub name: String,
    pub alias: String,
    pub notes: String,
    pub notes_url: String,
    pub action_url: String,
    pub members: Vec<HostId>,
}

#[derive(Debug, Clone, Default)]
pub struct ServiceGroup {
    pub id: ServiceGroupId,
    pub name: String,
    pub alias: String,
    pub notes: String,
    pub notes_url: String,
    pub action_url: String,
    pub members: Vec<ServiceId>,
}

#[derive(Debug, Clone, Default)]
pub struct Contact {
    pub id: ContactId,
    pub name: String,
    pub alias: String,
    pub email: String,
    pub pager: String,
    pub host_notification_period: String,
    pub service_notification_period: String,
    pub host_notifications_enabled: bool,
    pub service_notifications_enabled: bool,
    pub custom_variables: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default)]
pub struct ContactGroup {
    pub id: ContactGroupId,
    pub name: String,
    pub alias: String,
    pub members: Vec<ContactId>,
}

#[derive(Debug, Clone, Default)]
pub struct Timeperiod {
    pub name: String,
    pub alias: String,
    /// Whether the period is active right now, maintained by the core.
    pub active: bool,
    /// Number of transitions seen since program start.
    pub num_transitions: i64,
}

/// Comment entry types, as used by the wire protocol.
pub const COMMENT_ENTRY_USER: i64 = 1;
pub const COMMENT_ENTRY_DOWNTIME: i64 = 2;
pub const COMMENT_ENTRY_FLAPPING: i64 = 3;
pub const COMMENT_ENTRY_ACKNOWLEDGEMENT: i64 = 4;

#[derive(Debug, Clone)]
pub struct Comment {
    pub id: u64,
    pub host: HostId,
    pub service: Option<ServiceId>,
    pub author: String,
    pub comment: String,
    pub entry_time: i64,
    pub entry_type: i64,
    pub persistent: bool,
    pub expires: bool,
    pub expire_time: i64,
}

#[derive(Debug, Clone)]
pub struct Downtime {
    pub id: u64,
    pub host: HostId,
    pub service: Option<ServiceId>,
    pub author: String,
    pub comment: String,
    pub entry_time: i64,
    pub start_time: i64,
    pub end_time: i64,
    pub fixed: bool,
    pub duration: i64,
    pub triggered_by: u64,
    pub is_pending: bool,
}

pub type CommentMap = BTreeMap<u64, Comment>;
pub type DowntimeMap = BTreeMap<u64, Downtime>;

/// The read-only object graph exposed by the monitoring core.
#[derive(Debug, Default)]
pub struct ObjectGraph {
    hosts: Vec<Host>,
    services: Vec<Service>,
    host_groups: Vec<HostGroup>,
    service_groups: Vec<ServiceGroup>,
    contacts: Vec<Contact>,
    contact_groups: Vec<ContactGroup>,
    timeperiods: Vec<Timeperiod>,

    host_by_name: HashMap<String, HostId>,
    service_by_key: HashMap<(String, String), ServiceId>,
    host_group_by_name: HashMap<String, HostGroupId>,
    service_group_by_name: HashMap<String, ServiceGroupId>,
    contact_by_name: HashMap<String, ContactId>,
    contact_group_by_name: HashMap<String, ContactGroupId>,
}

impl ObjectGraph {
    pub fn new() -> ObjectGraph {
        ObjectGraph::default()
    }

    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    pub fn host_groups(&self) -> &[HostGroup] {
        &self.host_groups
    }

    pub fn service_groups(&self) -> &[ServiceGroup] {
        &self.service_groups
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn contact_groups(&self) -> &[ContactGroup] {
        &self.contact_groups
    }

    pub fn timeperiods(&self) -> &[Timeperiod] {
        &self.timeperiods
    }

    pub fn host(&self, id: HostId) -> &Host {
        &self.hosts[id.0]
    }

    pub fn service(&self, id: ServiceId) -> &Service {
        &self.services[id.0]
    }

    pub fn host_group(&self, id: HostGroupId) -> &HostGroup {
        &self.host_groups[id.0]
    }

    pub fn service_group(&self, id: ServiceGroupId) -> &ServiceGroup {
        &self.service_groups[id.0]
    }

    pub fn contact(&self, id: ContactId) -> &Contact {
        &self.contacts[id.0]
    }

    pub fn contact_group(&self, id: ContactGroupId) -> &ContactGroup {
        &self.contact_groups[id.0]
    }

    pub fn find_host(&self, name: &str) -> Option<&Host> {
        self.host_by_name.get(name).map(|id| self.host(*id))
    }

    pub fn find_service(&self, host_name: &str, description: &str) -> Option<&Service> {
        self.service_by_key
            .get(&(host_name.to_string(), description.to_string()))
            .map(|id| self.service(*id))
    }

    pub fn find_host_group(&self, name: &str) -> Option<&HostGroup> {
        self.host_group_by_name.get(name).map(|id| self.host_group(*id))
    }

    pub fn find_service_group(&self, name: &str) -> Option<&ServiceGroup> {
        self.service_group_by_name
            .get(name)
            .map(|id| self.service_group(*id))
    }

    pub fn find_contact(&self, name: &str) -> Option<&Contact> {
        self.contact_by_name.get(name).map(|id| self.contact(*id))
    }

    pub fn find_contact_group(&self, name: &str) -> Option<&ContactGroup> {
        self.contact_group_by_name
            .get(name)
            .map(|id| self.contact_group(*id))
    }

    pub fn find_timeperiod(&self, name: &str) -> Option<&Timeperiod> {
        self.timeperiods.iter().find(|tp| tp.name == name)
    }

    /// Resolve a host by name or by address ("designation"), the lookup
    /// used for `WaitObject` on the hosts table.
    pub fn host_by_designation(&self, designation: &str) -> Option<&Host> {
        self.find_host(designation)
            .or_else(|| self.hosts.iter().find(|h| h.address == designation))
    }

    // Graph construction. Used by the embedding core while it mirrors its
    // object tables; entity ids are assigned here and must be treated as
    // opaque by callers.

    pub fn insert_host(&mut self, mut host: Host) -> HostId {
        let id = HostId(self.hosts.len());
        host.id = id;
        self.host_by_name.insert(host.name.clone(), id);
        self.hosts.push(host);
        id
    }

    pub fn insert_service(&mut self, mut service: Service) -> ServiceId {
        let id = ServiceId(self.services.len());
        service.id = id;
        let host_name = self.hosts[service.host.0].name.clone();
        self.service_by_key
            .insert((host_name, service.description.clone()), id);
        self.hosts[service.host.0].services.push(id);
        self.services.push(service);
        id
    }

    pub fn insert_host_group(&mut self, mut group: HostGroup) -> HostGroupId {
        let id = HostGroupId(self.host_groups.len());
        group.id = id;
        self.host_group_by_name.insert(group.name.clone(), id);
        for member in &group.members {
            self.hosts[member.0].groups.push(id);
        }
        self.host_groups.push(group);
        id
    }

    pub fn insert_service_group(&mut self, mut group: ServiceGroup) -> ServiceGroupId {
        let id = ServiceGroupId(self.service_groups.len());
        group.id = id;
        self.service_group_by_name.insert(group.name.clone(), id);
        for member in &group.members {
            self.services[member.0].groups.push(id);
        }
        self.service_groups.push(group);
        id
    }

    pub fn insert_contact(&mut self, mut contact: Contact) -> ContactId {
        let id = ContactId(self.contacts.len());
        contact.id = id;
        self.contact_by_name.insert(contact.name.clone(), id);
        self.contacts.push(contact);
        id
    }

    pub fn insert_contact_group(&mut self, mut group: ContactGroup) -> ContactGroupId {
        let id = ContactGroupId(self.contact_groups.len());
        group.id = id;
        self.contact_group_by_name.insert(group.name.clone(), id);
        self.contact_groups.push(group);
        id
    }

    pub fn insert_timeperiod(&mut self, timeperiod: Timeperiod) {
        self.timeperiods.push(timeperiod);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_insertion_links_back_to_its_host() {
        let mut g = ObjectGraph::new();
        let h = g.insert_host(Host {
            name: "web01".into(),
            ..Host::default()
        });
        let s = g.insert_service(Service {
            host: h,
            description: "HTTP".into(),
            ..Service::default()
        });
        assert_eq!(g.host(h).services, vec![s]);
        assert_eq!(g.find_service("web01", "HTTP").unwrap().id, s);
    }

    #[test]
    fn group_insertion_back_links_members() {
        let mut g = ObjectGraph::new();
        let h = g.insert_host(Host {
            name: "db01".into(),
            ..Host::default()
        });
        let gid = g.insert_host_group(HostGroup {
            name: "linux".into(),
            members: vec![h],
            ..HostGroup::default()
        });
        assert_eq!(g.host(h).groups, vec![gid]);
        assert_eq!(g.find_host_group("linux").unwrap().members, vec![h]);
    }
}
