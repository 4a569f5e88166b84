//! NotificationRouter: from a change set to one routing entry per recipient

use super::ownership::{OwnedFile, Ownership, OwnershipResolver};
use crate::dbafs::ChangeSet;
use crate::directory::{load_template, Group, GroupId, Template, TemplateStore, User};
use crate::error::{FilesyncError, Result};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, info};

/// Files to announce to one recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingEntry {
    pub recipient: User,
    /// Display paths in change set order
    pub files: Vec<String>,
    /// `None` when none of the recipient's groups has a template
    pub template: Option<Template>,
}

#[derive(Debug, Default)]
pub struct RoutingTable {
    pub entries: Vec<RoutingEntry>,
    /// Groups and recipients skipped along the way
    pub notices: Vec<FilesyncError>,
}

impl RoutingTable {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct NotificationRouter<'a> {
    upload_path: &'a str,
    templates: &'a dyn TemplateStore,
}

impl<'a> NotificationRouter<'a> {
    pub fn new(upload_path: &'a str, templates: &'a dyn TemplateStore) -> Self {
        Self {
            upload_path,
            templates,
        }
    }

    /// Build the routing table for a change set.
    ///
    /// Fails only if the template store cannot be read.
    pub fn route(
        &self,
        change_set: &ChangeSet,
        users: &[User],
        groups: &[Group],
    ) -> Result<RoutingTable> {
        let mut table = RoutingTable::default();

        let changed = change_set.notifiable_paths();
        let ownership = OwnershipResolver::new(self.upload_path, users, groups).partition(&changed);
        if ownership.is_empty() {
            debug!(changed = changed.len(), "No owned files in change set");
            return Ok(table);
        }

        let templates = self.group_templates(&ownership, users, groups, &mut table.notices)?;

        for user in users {
            let templated: Vec<&Group> = groups
                .iter()
                .filter(|g| user.is_member_of(g.id) && templates.contains_key(&g.id))
                .collect();

            let files = collect_files(
                ownership.files_of_user(user.id),
                templated.iter().map(|g| ownership.files_of_group(g.id)),
            );
            if files.is_empty() {
                continue;
            }

            let reason = if !user.active {
                Some("account disabled")
            } else if !user.notifications_enabled {
                Some("notifications disabled")
            } else {
                None
            };
            if let Some(reason) = reason {
                let notice = FilesyncError::RecipientExcluded {
                    recipient: user.display_name.clone(),
                    reason: reason.to_string(),
                };
                info!(user = %user.id, "{}", notice);
                table.notices.push(notice);
                continue;
            }

            let template = templated
                .first()
                .and_then(|g| templates.get(&g.id))
                .cloned();
            table.entries.push(RoutingEntry {
                recipient: user.clone(),
                files,
                template,
            });
        }

        info!(
            recipients = table.entries.len(),
            notices = table.notices.len(),
            "Routed notifications"
        );
        Ok(table)
    }

    /// Templates of the groups that have something to announce.
    fn group_templates(
        &self,
        ownership: &Ownership,
        users: &[User],
        groups: &[Group],
        notices: &mut Vec<FilesyncError>,
    ) -> Result<BTreeMap<GroupId, Template>> {
        let home_owners: Vec<&User> = users
            .iter()
            .filter(|u| !ownership.files_of_user(u.id).is_empty())
            .collect();

        let mut templates = BTreeMap::new();
        for group in groups {
            let has_files = !ownership.files_of_group(group.id).is_empty()
                || home_owners.iter().any(|u| u.is_member_of(group.id));
            if !has_files {
                continue;
            }
            match load_template(self.templates, group)? {
                Some(template) => {
                    templates.insert(group.id, template);
                }
                None => {
                    let notice = FilesyncError::TemplateMissing {
                        group: group.name.clone(),
                    };
                    info!(group = %group.id, "{}", notice);
                    notices.push(notice);
                }
            }
        }
        Ok(templates)
    }
}

/// Merge home files and group files in change set order, one entry per
/// display path.
fn collect_files<'f>(
    home: &'f [OwnedFile],
    groups: impl Iterator<Item = &'f [OwnedFile]>,
) -> Vec<String> {
    let mut files: Vec<&OwnedFile> = home.iter().chain(groups.flatten()).collect();
    files.sort_by_key(|f| f.order);

    let mut seen_orders = BTreeSet::new();
    let mut seen_displays = HashSet::new();
    let mut displays = Vec::new();
    for file in files {
        if seen_orders.insert(file.order) && seen_displays.insert(file.display.as_str()) {
            displays.push(file.display.clone());
        }
    }
    displays
}
