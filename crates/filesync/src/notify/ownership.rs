//! Attribution of changed paths to users and groups
//!
//! Resolution runs in two phases over the root-relative path segments:
//!
//! 1. Home directories: the first user whose home directory contains the path
//!    claims it.
//! 2. Groups: every path nobody claimed in phase 1 goes to each group whose
//!    name appears as a contiguous run of segments in it.
//!
//! Only paths naming a file (see [`paths::has_extension`]) take part.

use crate::directory::{Group, GroupId, User, UserId};
use crate::paths;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// A changed file attributed to an owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedFile {
    /// Index path of the change
    pub path: String,
    /// Path shown to recipients, relative to the home directory or group
    pub display: String,
    /// Position in the batch of changed paths
    pub order: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Ownership {
    pub user_files: BTreeMap<UserId, Vec<OwnedFile>>,
    pub group_files: BTreeMap<GroupId, Vec<OwnedFile>>,
    /// Eligible files with no owner
    pub unowned: Vec<String>,
}

impl Ownership {
    pub fn files_of_user(&self, id: UserId) -> &[OwnedFile] {
        self.user_files.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn files_of_group(&self, id: GroupId) -> &[OwnedFile] {
        self.group_files.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.user_files.is_empty() && self.group_files.is_empty()
    }
}

pub struct OwnershipResolver<'a> {
    upload_path: &'a str,
    users: &'a [User],
    groups: &'a [Group],
}

impl<'a> OwnershipResolver<'a> {
    pub fn new(upload_path: &'a str, users: &'a [User], groups: &'a [Group]) -> Self {
        Self {
            upload_path,
            users,
            groups,
        }
    }

    /// The user whose home directory holds `path`, with the display path.
    pub fn home_owner(&self, path: &str) -> Option<(&'a User, String)> {
        self.users.iter().find_map(|user| {
            let home = user.home_dir.as_deref()?;
            let rest = paths::strip_root(path, home)?;
            (!rest.is_empty()).then(|| (user, rest.join("/")))
        })
    }

    /// Every group named inside `path`, with the path below the group.
    pub fn group_owners(&self, path: &str) -> Vec<(&'a Group, String)> {
        let Some(relative) = paths::strip_root(path, self.upload_path) else {
            return Vec::new();
        };
        self.groups
            .iter()
            .filter_map(|group| {
                let name = paths::segments(&group.name);
                let end = paths::find_segment_run(&relative, &name)?;
                let rest = &relative[end..];
                (!rest.is_empty()).then(|| (group, rest.join("/")))
            })
            .collect()
    }

    /// Attribute a batch of changed paths. Duplicates count once.
    pub fn partition(&self, changed: &[&str]) -> Ownership {
        let mut seen = BTreeSet::new();
        let eligible: Vec<(usize, &str)> = changed
            .iter()
            .copied()
            .filter(|path| paths::has_extension(path))
            .filter(|path| seen.insert(*path))
            .enumerate()
            .collect();

        let mut ownership = Ownership::default();

        let home_claims: Vec<(usize, &User, String)> = eligible
            .iter()
            .filter_map(|&(order, path)| {
                self.home_owner(path).map(|(user, display)| (order, user, display))
            })
            .collect();
        let claimed: BTreeSet<usize> = home_claims.iter().map(|(order, _, _)| *order).collect();

        for (order, user, display) in home_claims {
            let (_, path) = eligible[order];
            debug!(path = %path, user = %user.id, "Claimed by home directory");
            ownership.user_files.entry(user.id).or_default().push(OwnedFile {
                path: path.to_string(),
                display,
                order,
            });
        }

        for &(order, path) in eligible.iter().filter(|(order, _)| !claimed.contains(order)) {
            let owners = self.group_owners(path);
            if owners.is_empty() {
                debug!(path = %path, "No owner for changed file");
                ownership.unowned.push(path.to_string());
                continue;
            }
            for (group, display) in owners {
                ownership.group_files.entry(group.id).or_default().push(OwnedFile {
                    path: path.to_string(),
                    display,
                    order,
                });
            }
        }

        ownership
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i64, home: Option<&str>) -> User {
        User {
            id: UserId::new(id),
            display_name: format!("User {}", id),
            email: format!("u{}@example.org", id),
            group_ids: BTreeSet::new(),
            home_dir: home.map(str::to_string),
            notifications_enabled: true,
            active: true,
        }
    }

    fn group(id: i64, name: &str) -> Group {
        Group {
            id: GroupId::new(id),
            name: name.to_string(),
            template_id: None,
        }
    }

    fn displays(files: &[OwnedFile]) -> Vec<&str> {
        files.iter().map(|f| f.display.as_str()).collect()
    }

    #[test]
    fn test_home_directory_claims_before_groups() {
        let users = vec![user(1, Some("files/groupA/alice"))];
        let groups = vec![group(10, "groupA")];
        let resolver = OwnershipResolver::new("files", &users, &groups);

        let ownership = resolver.partition(&["files/groupA/alice/r.pdf", "files/groupA/s.pdf"]);
        assert_eq!(displays(ownership.files_of_user(UserId::new(1))), vec!["r.pdf"]);
        assert_eq!(displays(ownership.files_of_group(GroupId::new(10))), vec!["s.pdf"]);
    }

    #[test]
    fn test_first_matching_user_wins() {
        let users = vec![user(1, Some("files/shared")), user(2, Some("files/shared"))];
        let resolver = OwnershipResolver::new("files", &users, &[]);

        let ownership = resolver.partition(&["files/shared/a.txt"]);
        assert_eq!(ownership.files_of_user(UserId::new(1)).len(), 1);
        assert!(ownership.files_of_user(UserId::new(2)).is_empty());
    }

    #[test]
    fn test_group_match_is_segment_wise() {
        let groups = vec![group(10, "groupA"), group(11, "groupAB")];
        let resolver = OwnershipResolver::new("files", &[], &groups);

        let ownership = resolver.partition(&["files/projects/groupAB/q1/report.pdf"]);
        assert!(ownership.files_of_group(GroupId::new(10)).is_empty());
        assert_eq!(displays(ownership.files_of_group(GroupId::new(11))), vec!["q1/report.pdf"]);
    }

    #[test]
    fn test_file_can_belong_to_several_groups() {
        let groups = vec![group(10, "sales"), group(11, "reports")];
        let resolver = OwnershipResolver::new("files", &[], &groups);

        let ownership = resolver.partition(&["files/sales/reports/q1.pdf"]);
        assert_eq!(displays(ownership.files_of_group(GroupId::new(10))), vec!["reports/q1.pdf"]);
        assert_eq!(displays(ownership.files_of_group(GroupId::new(11))), vec!["q1.pdf"]);
    }

    #[test]
    fn test_upload_root_segments_do_not_match_groups() {
        let groups = vec![group(10, "files")];
        let resolver = OwnershipResolver::new("files", &[], &groups);

        let ownership = resolver.partition(&["files/docs/a.pdf"]);
        assert!(ownership.is_empty());
        assert_eq!(ownership.unowned, vec!["files/docs/a.pdf".to_string()]);
    }

    #[test]
    fn test_directories_and_duplicates_skipped() {
        let groups = vec![group(10, "groupA")];
        let resolver = OwnershipResolver::new("files", &[], &groups);

        let ownership = resolver.partition(&[
            "files/groupA/sub",
            "files/groupA/doc.pdf",
            "files/groupA/doc.pdf",
        ]);
        let files = ownership.files_of_group(GroupId::new(10));
        assert_eq!(displays(files), vec!["doc.pdf"]);
        assert_eq!(files[0].order, 0);
    }
}
