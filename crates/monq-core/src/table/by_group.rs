//! The composite group tables: `hostsbygroup`, `servicesbygroup` and
//! `servicesbyhostgroup`. Each row pairs an entity with one group it is a
//! member of, so a host in three groups yields three rows.

use crate::core::ExecContext;
use crate::query::Query;
use crate::row::{HostsByGroupRow, RowRef, ServicesByGroupRow, ServicesByHostGroupRow};
use crate::table::{ColumnSet, Table, hostgroups, hosts, servicegroups, services};
use crate::user::User;

fn project_hbg_host<'a>(row: RowRef<'a>, _ctx: &ExecContext<'a>) -> Option<RowRef<'a>> {
    match row {
        RowRef::HostsByGroup(r) => Some(RowRef::Host(r.host)),
        _ => None,
    }
}

fn project_hbg_group<'a>(row: RowRef<'a>, _ctx: &ExecContext<'a>) -> Option<RowRef<'a>> {
    match row {
        RowRef::HostsByGroup(r) => Some(RowRef::HostGroup(r.group)),
        _ => None,
    }
}

pub struct TableHostsByGroup {
    columns: ColumnSet,
}

impl TableHostsByGroup {
    pub fn new() -> TableHostsByGroup {
        let mut columns = ColumnSet::new();
        hosts::add_columns(&mut columns, "", project_hbg_host);
        hostgroups::add_columns(&mut columns, "hostgroup_", project_hbg_group);
        TableHostsByGroup { columns }
    }
}

impl Default for TableHostsByGroup {
    fn default() -> Self {
        TableHostsByGroup::new()
    }
}

impl Table for TableHostsByGroup {
    fn name(&self) -> &'static str {
        "hostsbygroup"
    }

    fn prefix(&self) -> &'static str {
        "host_"
    }

    fn column_set(&self) -> &ColumnSet {
        &self.columns
    }

    fn answer_query(&self, query: &mut Query<'_>, user: &User<'_>, ctx: &ExecContext<'_>) {
        let graph = ctx.graph();
        for group in graph.host_groups() {
            if !user.is_authorized_for_host_group(group) {
                continue;
            }
            for id in &group.members {
                let host = graph.host(*id);
                if !user.is_authorized_for_host(host) {
                    continue;
                }
                let row = HostsByGroupRow { host, group };
                if !query.process_row(RowRef::HostsByGroup(row), ctx) {
                    return;
                }
            }
        }
    }
}

fn project_sbg_service<'a>(row: RowRef<'a>, _ctx: &ExecContext<'a>) -> Option<RowRef<'a>> {
    match row {
        RowRef::ServicesByGroup(r) => Some(RowRef::Service(r.service)),
        _ => None,
    }
}

fn project_sbg_host<'a>(row: RowRef<'a>, _ctx: &ExecContext<'a>) -> Option<RowRef<'a>> {
    match row {
        RowRef::ServicesByGroup(r) => Some(RowRef::Host(r.host)),
        _ => None,
    }
}

fn project_sbg_group<'a>(row: RowRef<'a>, _ctx: &ExecContext<'a>) -> Option<RowRef<'a>> {
    match row {
        RowRef::ServicesByGroup(r) => Some(RowRef::ServiceGroup(r.group)),
        _ => None,
    }
}

pub struct TableServicesByGroup {
    columns: ColumnSet,
}

impl TableServicesByGroup {
    pub fn new() -> TableServicesByGroup {
        let mut columns = ColumnSet::new();
        services::add_columns(&mut columns, "", project_sbg_service, false);
        hosts::add_columns(&mut columns, "host_", project_sbg_host);
        servicegroups::add_columns(&mut columns, "servicegroup_", project_sbg_group);
        TableServicesByGroup { columns }
    }
}

impl Default for TableServicesByGroup {
    fn default() -> Self {
        TableServicesByGroup::new()
    }
}

impl Table for TableServicesByGroup {
    fn name(&self) -> &'static str {
        "servicesbygroup"
    }

    fn prefix(&self) -> &'static str {
        "service_"
    }

    fn column_set(&self) -> &ColumnSet {
        &self.columns
    }

    fn answer_query(&self, query: &mut Query<'_>, user: &User<'_>, ctx: &ExecContext<'_>) {
        let graph = ctx.graph();
        for group in graph.service_groups() {
            if !user.is_authorized_for_service_group(group) {
                continue;
            }
            for id in &group.members {
                let service = graph.service(*id);
                if !user.is_authorized_for_service(service) {
                    continue;
                }
                let row = ServicesByGroupRow {
                    service,
                    host: graph.host(service.host),
                    group,
                };
                if !query.process_row(RowRef::ServicesByGroup(row), ctx) {
                    return;
                }
            }
        }
    }
}

fn project_sbhg_service<'a>(row: RowRef<'a>, _ctx: &ExecContext<'a>) -> Option<RowRef<'a>> {
    match row {
        RowRef::ServicesByHostGroup(r) => Some(RowRef::Service(r.service)),
        _ => None,
    }
}

fn project_sbhg_host<'a>(row: RowRef<'a>, _ctx: &ExecContext<'a>) -> Option<RowRef<'a>> {
    match row {
        RowRef::ServicesByHostGroup(r) => Some(RowRef::Host(r.host)),
        _ => None,
    }
}

fn project_sbhg_group<'a>(row: RowRef<'a>, _ctx: &ExecContext<'a>) -> Option<RowRef<'a>> {
    match row {
        RowRef::ServicesByHostGroup(r) => Some(RowRef::HostGroup(r.group)),
        _ => None,
    }
}

pub struct TableServicesByHostGroup {
    columns: ColumnSet,
}

impl TableServicesByHostGroup {
    pub fn new() -> TableServicesByHostGroup {
        let mut columns = ColumnSet::new();
        services::add_columns(&mut columns, "", project_sbhg_service, false);
        hosts::add_columns(&mut columns, "host_", project_sbhg_host);
        hostgroups::add_columns(&mut columns, "hostgroup_", project_sbhg_group);
        TableServicesByHostGroup { columns }
    }
}

impl Default for TableServicesByHostGroup {
    fn default() -> Self {
        TableServicesByHostGroup::new()
    }
}

impl Table for TableServicesByHostGroup {
    fn name(&self) -> &'static str {
        "servicesbyhostgroup"
    }

    fn prefix(&self) -> &'static str {
        "service_"
    }

    fn column_set(&self) -> &ColumnSet {
        &self.columns
    }

    fn answer_query(&self, query: &mut Query<'_>, user: &User<'_>, ctx: &ExecContext<'_>) {
        let graph = ctx.graph();
        for group in graph.host_groups() {
            if !user.is_authorized_for_host_group(group) {
                continue;
            }
            for host_id in &group.members {
                let host = graph.host(*host_id);
                for id in &host.services {
                    let service = graph.service(*id);
                    if !user.is_authorized_for_service(service) {
                        continue;
                    }
                    let row = ServicesByHostGroupRow {
                        service,
                        host,
                        group,
                    };
                    if !query.process_row(RowRef::ServicesByHostGroup(row), ctx) {
                        return;
                    }
                }
            }
        }
    }
}
