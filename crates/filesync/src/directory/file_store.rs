//! Directory and template store backed by an exported JSON document

use super::membership::decode_group_ids;
use super::{
    Form, FormField, FormId, Group, GroupId, TemplateStore, UserDirectory, UserId, UserRecord,
};
use crate::error::{FilesyncError, Result};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::{debug, warn};

/// Export layout: one object with a table per record kind.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DirectoryExport {
    #[serde(default)]
    members: Vec<MemberRow>,
    #[serde(default)]
    groups: Vec<GroupRow>,
    #[serde(default)]
    files: Vec<FileRow>,
    #[serde(default)]
    forms: Vec<FormRow>,
    #[serde(default)]
    form_fields: Vec<FormFieldRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MemberRow {
    id: i64,
    #[serde(default)]
    firstname: String,
    #[serde(default)]
    lastname: String,
    email: String,
    /// Serialized string or plain JSON array
    #[serde(default)]
    groups: Option<serde_json::Value>,
    #[serde(default)]
    home_dir: Option<String>,
    #[serde(default)]
    assign_dir: bool,
    #[serde(default = "default_true")]
    filesync: bool,
    #[serde(default)]
    disable: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroupRow {
    id: i64,
    name: String,
    #[serde(default)]
    template_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct FileRow {
    uuid: String,
    path: String,
}

#[derive(Debug, Deserialize)]
struct FormRow {
    id: i64,
    title: String,
    #[serde(default)]
    format: String,
    #[serde(default)]
    subject: String,
    /// Form notification address, used as the sender
    #[serde(default)]
    recipient: String,
}

#[derive(Debug, Deserialize)]
struct FormFieldRow {
    pid: i64,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Users, groups, file references and forms read from one JSON file.
#[derive(Debug, Default)]
pub struct JsonDirectory {
    export: DirectoryExport,
    files: HashMap<String, String>,
}

impl JsonDirectory {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            FilesyncError::Directory(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let export: DirectoryExport = serde_json::from_str(content)
            .map_err(|e| FilesyncError::Directory(format!("invalid directory export: {}", e)))?;
        let files = export
            .files
            .iter()
            .map(|row| (row.uuid.clone(), row.path.trim_end_matches('/').to_string()))
            .collect();
        debug!(
            members = export.members.len(),
            groups = export.groups.len(),
            forms = export.forms.len(),
            "Loaded directory export"
        );
        Ok(Self { export, files })
    }

    fn member_groups(row: &MemberRow) -> BTreeSet<GroupId> {
        let decoded = match &row.groups {
            None | Some(serde_json::Value::Null) => return BTreeSet::new(),
            Some(serde_json::Value::String(raw)) => decode_group_ids(raw),
            Some(other) => decode_group_ids(&other.to_string()),
        };
        decoded.unwrap_or_else(|e| {
            warn!(member = row.id, error = %e, "Ignoring unreadable group membership");
            BTreeSet::new()
        })
    }

    fn to_form(row: &FormRow) -> Form {
        Form {
            id: FormId::new(row.id),
            title: row.title.clone(),
            format: row.format.clone(),
            subject: row.subject.clone(),
            sender: row.recipient.clone(),
        }
    }
}

impl UserDirectory for JsonDirectory {
    fn find_all_users(&self) -> Result<Vec<UserRecord>> {
        Ok(self
            .export
            .members
            .iter()
            .map(|row| UserRecord {
                id: UserId::new(row.id),
                display_name: format!("{} {}", row.firstname, row.lastname)
                    .trim()
                    .to_string(),
                email: row.email.clone(),
                group_ids: Self::member_groups(row),
                home_dir_ref: row
                    .home_dir
                    .clone()
                    .filter(|reference| row.assign_dir && !reference.is_empty()),
                notifications_enabled: row.filesync,
                active: !row.disable,
            })
            .collect())
    }

    fn find_all_groups(&self) -> Result<Vec<Group>> {
        Ok(self
            .export
            .groups
            .iter()
            .map(|row| Group {
                id: GroupId::new(row.id),
                name: row.name.clone(),
                template_id: row.template_id.map(FormId::new),
            })
            .collect())
    }

    fn resolve_path_by_id(&self, reference: &str) -> Result<Option<String>> {
        Ok(self.files.get(reference).cloned())
    }
}

impl TemplateStore for JsonDirectory {
    fn find_template_by_title(&self, title: &str) -> Result<Option<Form>> {
        Ok(self
            .export
            .forms
            .iter()
            .find(|row| row.title == title)
            .map(Self::to_form))
    }

    fn find_template_by_id(&self, id: FormId) -> Result<Option<Form>> {
        Ok(self
            .export
            .forms
            .iter()
            .find(|row| row.id == id.get())
            .map(Self::to_form))
    }

    fn find_fields_by_template_id(&self, id: FormId) -> Result<Vec<FormField>> {
        Ok(self
            .export
            .form_fields
            .iter()
            .filter(|row| row.pid == id.get())
            .map(|row| FormField {
                form_id: id,
                kind: row.kind.clone(),
                text: row.text.clone(),
            })
            .collect())
    }
}
