//! Users, groups and message templates, and the stores they come from

pub mod file_store;
pub mod membership;

pub use file_store::JsonDirectory;
pub use membership::decode_group_ids;

use crate::error::{FilesyncError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::warn;

/// Placeholder in a template body replaced by the file list
pub const FILES_PLACEHOLDER: &str = "[[files]]";

/// Form format that marks a form as an email template
pub const EMAIL_FORMAT: &str = "email";

/// Form field kind whose text is the template body
pub const BODY_FIELD_KIND: &str = "explanation";

macro_rules! define_record_id {
    ($name:ident, $label:expr) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = FilesyncError;

            fn from_str(s: &str) -> Result<Self> {
                s.trim().parse::<i64>().map(Self).map_err(|e| {
                    FilesyncError::Directory(format!("Invalid {} '{}': {}", $label, s, e))
                })
            }
        }
    };
}

define_record_id!(UserId, "user ID");
define_record_id!(GroupId, "group ID");
define_record_id!(FormId, "form ID");

/// A member as stored by the directory, home directory still a reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: UserId,
    pub display_name: String,
    pub email: String,
    pub group_ids: BTreeSet<GroupId>,
    /// File reference of the assigned home directory
    pub home_dir_ref: Option<String>,
    pub notifications_enabled: bool,
    pub active: bool,
}

/// A member with the home directory resolved to an index path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub display_name: String,
    pub email: String,
    pub group_ids: BTreeSet<GroupId>,
    pub home_dir: Option<String>,
    pub notifications_enabled: bool,
    pub active: bool,
}

impl User {
    pub fn is_member_of(&self, group: GroupId) -> bool {
        self.group_ids.contains(&group)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    /// Explicit template binding; falls back to a form titled like the group
    pub template_id: Option<FormId>,
}

/// Raw form record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Form {
    pub id: FormId,
    pub title: String,
    pub format: String,
    pub subject: String,
    /// Address used as the sender of notifications
    pub sender: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub form_id: FormId,
    pub kind: String,
    pub text: Option<String>,
}

/// Message skeleton with a [`FILES_PLACEHOLDER`] in its body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub id: FormId,
    pub subject: String,
    pub from_address: String,
    pub body: String,
}

impl Template {
    /// Substitute the placeholder with the files joined by `<br>`.
    pub fn render(&self, files: &[String]) -> String {
        self.body.replace(FILES_PLACEHOLDER, &files.join("<br>"))
    }
}

/// Source of users and groups
pub trait UserDirectory: Send + Sync {
    fn find_all_users(&self) -> Result<Vec<UserRecord>>;

    fn find_all_groups(&self) -> Result<Vec<Group>>;

    /// Index path of a file reference, `None` when the reference is dangling.
    fn resolve_path_by_id(&self, reference: &str) -> Result<Option<String>>;
}

/// Source of forms used as notification templates
pub trait TemplateStore: Send + Sync {
    fn find_template_by_title(&self, title: &str) -> Result<Option<Form>>;

    fn find_template_by_id(&self, id: FormId) -> Result<Option<Form>>;

    fn find_fields_by_template_id(&self, id: FormId) -> Result<Vec<FormField>>;
}

/// Users with resolved home directories, plus lookups that failed on the way.
#[derive(Debug, Default)]
pub struct ResolvedUsers {
    pub users: Vec<User>,
    pub notices: Vec<FilesyncError>,
}

/// Load every user and resolve home directory references.
///
/// A reference that does not resolve leaves the user without a home
/// directory and is recorded as [`FilesyncError::OwnershipLookup`].
pub fn resolve_users(directory: &dyn UserDirectory) -> Result<ResolvedUsers> {
    let mut resolved = ResolvedUsers::default();
    for record in directory.find_all_users()? {
        let home_dir = match &record.home_dir_ref {
            None => None,
            Some(reference) => match directory.resolve_path_by_id(reference)? {
                Some(path) => Some(path),
                None => {
                    let notice = FilesyncError::OwnershipLookup {
                        user: record.display_name.clone(),
                        reference: reference.clone(),
                    };
                    warn!(user = %record.id, "{}", notice);
                    resolved.notices.push(notice);
                    None
                }
            },
        };
        resolved.users.push(User {
            id: record.id,
            display_name: record.display_name,
            email: record.email,
            group_ids: record.group_ids,
            home_dir,
            notifications_enabled: record.notifications_enabled,
            active: record.active,
        });
    }
    Ok(resolved)
}

/// Find the email template of a group.
///
/// An explicit binding wins over the title match. Forms of another format do
/// not count. The body is the text of the last body field; a form without one
/// renders the bare file list.
pub fn load_template(store: &dyn TemplateStore, group: &Group) -> Result<Option<Template>> {
    let form = match group.template_id {
        Some(id) => store.find_template_by_id(id)?,
        None => store.find_template_by_title(&group.name)?,
    };
    let Some(form) = form.filter(|f| f.format == EMAIL_FORMAT) else {
        return Ok(None);
    };

    let body = store
        .find_fields_by_template_id(form.id)?
        .into_iter()
        .filter(|field| field.kind == BODY_FIELD_KIND)
        .filter_map(|field| field.text)
        .last()
        .unwrap_or_else(|| FILES_PLACEHOLDER.to_string());

    Ok(Some(Template {
        id: form.id,
        subject: form.subject,
        from_address: form.sender,
        body,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MemoryStore {
        forms: Vec<Form>,
        fields: Vec<FormField>,
        files: HashMap<String, String>,
        users: Vec<UserRecord>,
    }

    impl TemplateStore for MemoryStore {
        fn find_template_by_title(&self, title: &str) -> Result<Option<Form>> {
            Ok(self.forms.iter().find(|f| f.title == title).cloned())
        }

        fn find_template_by_id(&self, id: FormId) -> Result<Option<Form>> {
            Ok(self.forms.iter().find(|f| f.id == id).cloned())
        }

        fn find_fields_by_template_id(&self, id: FormId) -> Result<Vec<FormField>> {
            Ok(self.fields.iter().filter(|f| f.form_id == id).cloned().collect())
        }
    }

    impl UserDirectory for MemoryStore {
        fn find_all_users(&self) -> Result<Vec<UserRecord>> {
            Ok(self.users.clone())
        }

        fn find_all_groups(&self) -> Result<Vec<Group>> {
            Ok(Vec::new())
        }

        fn resolve_path_by_id(&self, reference: &str) -> Result<Option<String>> {
            Ok(self.files.get(reference).cloned())
        }
    }

    fn form(id: i64, title: &str, format: &str) -> Form {
        Form {
            id: FormId::new(id),
            title: title.to_string(),
            format: format.to_string(),
            subject: format!("{} changed", title),
            sender: "cms@example.org".to_string(),
        }
    }

    fn field(form_id: i64, kind: &str, text: &str) -> FormField {
        FormField {
            form_id: FormId::new(form_id),
            kind: kind.to_string(),
            text: Some(text.to_string()),
        }
    }

    fn group(name: &str, template_id: Option<i64>) -> Group {
        Group {
            id: GroupId::new(1),
            name: name.to_string(),
            template_id: template_id.map(FormId::new),
        }
    }

    #[test]
    fn test_id_parsing() {
        assert_eq!("42".parse::<GroupId>().unwrap(), GroupId::new(42));
        assert!("x".parse::<UserId>().is_err());
        assert_eq!(FormId::new(7).to_string(), "7");
    }

    #[test]
    fn test_template_by_title_uses_last_body_field() {
        let store = MemoryStore {
            forms: vec![form(1, "groupA", "email")],
            fields: vec![
                field(1, "explanation", "old [[files]]"),
                field(1, "text", "ignored"),
                field(1, "explanation", "New files:<br>[[files]]"),
            ],
            ..Default::default()
        };

        let template = load_template(&store, &group("groupA", None)).unwrap().unwrap();
        assert_eq!(template.body, "New files:<br>[[files]]");
        assert_eq!(template.from_address, "cms@example.org");
        assert_eq!(
            template.render(&["a.pdf".to_string(), "b.pdf".to_string()]),
            "New files:<br>a.pdf<br>b.pdf"
        );
    }

    #[test]
    fn test_non_email_form_is_not_a_template() {
        let store = MemoryStore {
            forms: vec![form(1, "groupA", "raw")],
            ..Default::default()
        };
        assert!(load_template(&store, &group("groupA", None)).unwrap().is_none());
        assert!(load_template(&store, &group("groupB", None)).unwrap().is_none());
    }

    #[test]
    fn test_explicit_binding_wins_over_title() {
        let store = MemoryStore {
            forms: vec![form(1, "groupA", "email"), form(2, "custom", "email")],
            ..Default::default()
        };

        let template = load_template(&store, &group("groupA", Some(2))).unwrap().unwrap();
        assert_eq!(template.id, FormId::new(2));
        assert_eq!(template.body, FILES_PLACEHOLDER);
    }

    #[test]
    fn test_dangling_home_reference_is_recorded() {
        let record = |id: i64, home: Option<&str>| UserRecord {
            id: UserId::new(id),
            display_name: format!("User {}", id),
            email: format!("u{}@example.org", id),
            group_ids: BTreeSet::new(),
            home_dir_ref: home.map(str::to_string),
            notifications_enabled: true,
            active: true,
        };
        let store = MemoryStore {
            files: HashMap::from([("ref-1".to_string(), "files/alice".to_string())]),
            users: vec![record(1, Some("ref-1")), record(2, Some("missing")), record(3, None)],
            ..Default::default()
        };

        let resolved = resolve_users(&store).unwrap();
        let homes: Vec<_> = resolved.users.iter().map(|u| u.home_dir.as_deref()).collect();
        assert_eq!(homes, vec![Some("files/alice"), None, None]);
        assert_eq!(resolved.notices.len(), 1);
        assert!(matches!(
            &resolved.notices[0],
            FilesyncError::OwnershipLookup { reference, .. } if reference == "missing"
        ));
    }
}
