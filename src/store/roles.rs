use std::collections::HashMap;

use crate::core::{RoleCategory, RoleId, RoleInfo};

/// Static role table collaborator.
///
/// The engine only ever resolves ids it received from the wire: traveler
/// roles through [`RoleLookup::role`] and fabled roles through
/// [`RoleLookup::fabled`]. Unknown ids resolve to `None` and the input is
/// discarded.
pub trait RoleLookup: Send + Sync {
    fn role(&self, id: &RoleId) -> Option<RoleInfo>;
    fn fabled(&self, id: &RoleId) -> Option<RoleInfo>;
}

/// Map-backed [`RoleLookup`] built from a flat role list.
#[derive(Default)]
pub struct RoleTable {
    roles: HashMap<RoleId, RoleInfo>,
    fabled: HashMap<RoleId, RoleInfo>,
}

impl RoleTable {
    /// Builds a table, routing fabled entries to their own namespace
    pub fn new(entries: impl IntoIterator<Item = RoleInfo>) -> Self {
        let mut table = RoleTable::default();
        for role in entries {
            match role.category {
                RoleCategory::Fabled => table.fabled.insert(role.id.clone(), role),
                _ => table.roles.insert(role.id.clone(), role),
            };
        }
        table
    }

    /// A table with no entries; every lookup misses
    pub fn empty() -> Self {
        RoleTable::default()
    }
}

impl RoleLookup for RoleTable {
    fn role(&self, id: &RoleId) -> Option<RoleInfo> {
        self.roles.get(id).cloned()
    }

    fn fabled(&self, id: &RoleId) -> Option<RoleInfo> {
        self.fabled.get(id).cloned()
    }
}
