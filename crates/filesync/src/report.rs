//! Console rendering of a synchronization run

use crate::dbafs::ChangeSet;
use crate::error::FilesyncError;
use crate::notify::{DeliveryOutcome, DeliveryReport, DeliveryStatus};
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Color, ContentArrangement, Table};
use std::time::Duration;

/// Table of all changes followed by the totals line, or `No changes.`.
pub fn render_change_set(change_set: &ChangeSet) -> String {
    if change_set.is_empty() {
        return "No changes.".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(
        ["Action", "Resource / Change"]
            .iter()
            .map(|h| Cell::new(h).fg(Color::Cyan)),
    );

    for item in change_set.items_to_create() {
        table.add_row(vec![
            Cell::new("add").fg(Color::Green),
            Cell::new(format!("{} (new hash: {})", item.path, item.hash)),
        ]);
    }
    for item in change_set.items_to_update() {
        let (action, mut change) = if item.updates_path() {
            ("move", format!("{} → {}", item.existing_path, item.current_path()))
        } else {
            ("update", item.existing_path.clone())
        };
        if let Some(hash) = item.new_hash.as_ref().filter(|_| item.updates_hash()) {
            change.push_str(&format!(" (updated hash: {})", hash));
        }
        table.add_row(vec![Cell::new(action).fg(Color::Yellow), Cell::new(change)]);
    }
    for item in change_set.items_to_delete() {
        table.add_row(vec![
            Cell::new("delete").fg(Color::Red),
            Cell::new(&item.path),
        ]);
    }

    format!("{}\n{}", table, totals_line(change_set))
}

pub fn totals_line(change_set: &ChangeSet) -> String {
    format!(
        " Total items added: {} | updated/moved: {} | deleted: {}",
        change_set.items_to_create().len(),
        change_set.items_to_update().len(),
        change_set.items_to_delete().len()
    )
}

/// One informational line per skipped group or recipient.
pub fn notice_line(notice: &FilesyncError) -> String {
    match notice {
        FilesyncError::TemplateMissing { .. } => format!("+++ {}", notice),
        other => other.to_string(),
    }
}

pub fn delivery_line(outcome: &DeliveryOutcome) -> String {
    match &outcome.status {
        DeliveryStatus::Sent => format!("E-Mail notification sent to \"{}\"", outcome.recipient),
        DeliveryStatus::Failed(reason) => format!(
            "E-Mail notification to \"{}\" failed: {}",
            outcome.recipient, reason
        ),
        DeliveryStatus::Skipped(reason) => format!(
            "E-Mail notification to \"{}\" skipped: {}",
            outcome.recipient, reason
        ),
        DeliveryStatus::Cancelled => format!(
            "E-Mail notification to \"{}\" cancelled",
            outcome.recipient
        ),
    }
}

pub fn delivery_lines(report: &DeliveryReport) -> Vec<String> {
    report.outcomes.iter().map(delivery_line).collect()
}

pub fn completion_line(duration: Duration) -> String {
    format!("Synchronization complete in {:.2}s.", duration.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dbafs::{ContentHash, ItemToCreate, ItemToDelete, ItemToUpdate};
    use crate::notify::Mailbox;

    #[test]
    fn test_empty_change_set() {
        assert_eq!(render_change_set(&ChangeSet::empty()), "No changes.");
    }

    #[test]
    fn test_table_rows_and_totals() {
        let old = ContentHash::of_bytes(b"old");
        let new = ContentHash::of_bytes(b"new");
        let change_set = ChangeSet::new(
            vec![ItemToCreate {
                path: "files/a.txt".into(),
                hash: new.clone(),
            }],
            vec![
                ItemToUpdate::moved("files/x.pdf".into(), "files/y.pdf".into(), old.clone()),
                ItemToUpdate::rehashed("files/z.pdf".into(), old, new.clone()),
            ],
            vec![ItemToDelete {
                path: "files/gone.txt".into(),
            }],
        )
        .unwrap();

        let rendered = render_change_set(&change_set);
        assert!(rendered.contains("Resource / Change"));
        assert!(rendered.contains("add"));
        assert!(rendered.contains("files/a.txt (new hash:"));
        assert!(rendered.contains("files/x.pdf → files/y.pdf"));
        assert!(rendered.contains("files/gone.txt"));
        assert!(rendered.ends_with(" Total items added: 1 | updated/moved: 2 | deleted: 1"));
    }

    #[test]
    fn test_status_lines() {
        let outcome = DeliveryOutcome {
            recipient: Mailbox {
                name: "Alice Smith".into(),
                email: "alice@example.org".into(),
            },
            status: DeliveryStatus::Sent,
        };
        assert_eq!(
            delivery_line(&outcome),
            "E-Mail notification sent to \"Alice Smith <alice@example.org>\""
        );
        assert_eq!(
            notice_line(&FilesyncError::TemplateMissing {
                group: "groupA".into()
            }),
            "+++ No form for \"groupA\" found - skipping"
        );
        assert_eq!(
            completion_line(Duration::from_millis(1234)),
            "Synchronization complete in 1.23s."
        );
    }
}
