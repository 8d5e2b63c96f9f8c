//! Row handles.
//!
//! A row is a borrowed view produced by a table while it answers a query;
//! it is only valid for the duration of the call that produced it. Join
//! tables carry a small struct of references and install the borrowed
//! column sets with a projection that picks the right side back out.

use crate::core::CommandDef;
use crate::logcache::entry::LogEntry;
use crate::model::{
    Comment, Contact, ContactGroup, Downtime, Host, HostGroup, Service, ServiceGroup, Timeperiod,
};
use crate::table::columns::ColumnMetaRow;
use crate::table::labels::LabelRow;
use crate::table::statehist::HostServiceState;

/// A comment joined with the objects it is attached to.
#[derive(Clone, Copy)]
pub struct CommentRow<'a> {
    pub comment: &'a Comment,
    pub host: &'a Host,
    pub service: Option<&'a Service>,
}

/// A downtime joined with the objects it is attached to.
#[derive(Clone, Copy)]
pub struct DowntimeRow<'a> {
    pub downtime: &'a Downtime,
    pub host: &'a Host,
    pub service: Option<&'a Service>,
}

/// A log entry joined with whatever of its objects still exists.
pub struct LogRow<'a> {
    pub entry: &'a LogEntry,
    pub host: Option<&'a Host>,
    pub service: Option<&'a Service>,
    pub contact: Option<&'a Contact>,
    pub command: Option<CommandDef>,
}

#[derive(Clone, Copy)]
pub struct HostsByGroupRow<'a> {
    pub host: &'a Host,
    pub group: &'a HostGroup,
}

#[derive(Clone, Copy)]
pub struct ServicesByGroupRow<'a> {
    pub service: &'a Service,
    pub host: &'a Host,
    pub group: &'a ServiceGroup,
}

#[derive(Clone, Copy)]
pub struct ServicesByHostGroupRow<'a> {
    pub service: &'a Service,
    pub host: &'a Host,
    pub group: &'a HostGroup,
}

/// One row of some table. Copyable so projections can pass it around
/// freely; every variant is just a reference or two.
#[derive(Clone, Copy)]
pub enum RowRef<'a> {
    Host(&'a Host),
    Service(&'a Service),
    HostGroup(&'a HostGroup),
    ServiceGroup(&'a ServiceGroup),
    Contact(&'a Contact),
    ContactGroup(&'a ContactGroup),
    Timeperiod(&'a Timeperiod),
    Comment(CommentRow<'a>),
    Downtime(DowntimeRow<'a>),
    Log(&'a LogRow<'a>),
    StateHist(&'a HostServiceState<'a>),
    HostsByGroup(HostsByGroupRow<'a>),
    ServicesByGroup(ServicesByGroupRow<'a>),
    ServicesByHostGroup(ServicesByHostGroupRow<'a>),
    ColumnMeta(&'a ColumnMetaRow),
    Command(&'a CommandDef),
    Label(&'a LabelRow),
    Status,
}

/// A single projection step, e.g. from a log row to its current host.
/// Plain function pointers: projections never capture anything; the
/// context is there to resolve id-based back references through the graph.
pub type Projection =
    for<'a> fn(RowRef<'a>, &crate::core::ExecContext<'a>) -> Option<RowRef<'a>>;

/// The identity projection used by a table for its own columns.
pub fn project_self<'a>(
    row: RowRef<'a>,
    _ctx: &crate::core::ExecContext<'a>,
) -> Option<RowRef<'a>> {
    Some(row)
}
