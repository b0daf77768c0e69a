use std::collections::HashSet;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::channels::ChannelRecord;
use crate::export::{plan_export, ExportPlan};

/// A row as shown to the editor, with its position in the working set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub index: usize,
    #[serde(flatten)]
    pub record: ChannelRecord,
}

/// Partial update of a row; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RowPatch {
    pub group: Option<String>,
    pub name: Option<String>,
    pub url: Option<String>,
    pub selected: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub selected: usize,
    pub groups: usize,
}

/// The in-memory set of records being edited. Lives only as long as the process.
#[derive(Debug, Default)]
pub struct Workspace {
    records: Vec<ChannelRecord>,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the working set with freshly loaded records, all unselected.
    pub fn replace(&mut self, mut records: Vec<ChannelRecord>) {
        for record in &mut records {
            record.selected = false;
        }
        self.records = records;
    }

    pub fn records(&self) -> &[ChannelRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Rows whose group or name contains `search` (case-insensitive). An empty
    /// search returns every row.
    pub fn rows(&self, search: Option<&str>) -> Vec<Row> {
        let needle = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        self.records
            .iter()
            .enumerate()
            .filter(|(_, record)| match &needle {
                Some(needle) => {
                    record.group.to_lowercase().contains(needle.as_str())
                        || record.name.to_lowercase().contains(needle.as_str())
                }
                None => true,
            })
            .map(|(index, record)| Row {
                index,
                record: record.clone(),
            })
            .collect()
    }

    pub fn insert(&mut self, record: ChannelRecord) -> usize {
        self.records.push(record);
        self.records.len() - 1
    }

    pub fn update(&mut self, index: usize, patch: RowPatch) -> Result<&ChannelRecord> {
        let len = self.records.len();
        let record = self
            .records
            .get_mut(index)
            .ok_or_else(|| anyhow!("row {} out of range (rows: {})", index, len))?;

        if let Some(group) = patch.group {
            record.group = group;
        }
        if let Some(name) = patch.name {
            record.name = name;
        }
        if let Some(url) = patch.url {
            record.url = url;
        }
        if let Some(selected) = patch.selected {
            record.selected = selected;
        }
        Ok(record)
    }

    pub fn remove(&mut self, index: usize) -> Result<ChannelRecord> {
        if index >= self.records.len() {
            return Err(anyhow!(
                "row {} out of range (rows: {})",
                index,
                self.records.len()
            ));
        }
        Ok(self.records.remove(index))
    }

    pub fn set_all_selected(&mut self, selected: bool) {
        for record in &mut self.records {
            record.selected = selected;
        }
    }

    pub fn summary(&self) -> Summary {
        let groups: HashSet<&str> = self.records.iter().map(|r| r.group.as_str()).collect();
        Summary {
            total: self.records.len(),
            selected: self.records.iter().filter(|r| r.selected).count(),
            groups: groups.len(),
        }
    }

    pub fn export(&self, prefix: &str) -> ExportPlan {
        plan_export(&self.records, prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Workspace {
        let mut ws = Workspace::new();
        ws.replace(vec![
            ChannelRecord::new("Haber", "Kanal A", "http://x/a"),
            ChannelRecord::new("TR|Spor", "Spor 1", "http://x/b"),
            ChannelRecord::new("Haber", "Kanal C", "http://x/c"),
        ]);
        ws
    }

    #[test]
    fn test_replace_clears_selection() {
        let mut record = ChannelRecord::new("G", "N", "http://x");
        record.selected = true;
        let mut ws = Workspace::new();
        ws.replace(vec![record]);
        assert!(!ws.records()[0].selected);
    }

    #[test]
    fn test_search_matches_group_or_name() {
        let ws = sample();
        let rows = ws.rows(Some("spor"));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].index, 1);

        let rows = ws.rows(Some("HABER"));
        assert_eq!(rows.iter().map(|r| r.index).collect::<Vec<_>>(), vec![0, 2]);

        assert_eq!(ws.rows(Some("  ")).len(), 3);
        assert_eq!(ws.rows(None).len(), 3);
        assert!(ws.rows(Some("http")).is_empty());
    }

    #[test]
    fn test_update_applies_only_given_fields() {
        let mut ws = sample();
        let patch = RowPatch {
            name: Some("Kanal A HD".to_string()),
            selected: Some(true),
            ..Default::default()
        };
        let updated = ws.update(0, patch).unwrap().clone();
        assert_eq!(updated.name, "Kanal A HD");
        assert_eq!(updated.group, "Haber");
        assert_eq!(updated.url, "http://x/a");
        assert!(updated.selected);
    }

    #[test]
    fn test_out_of_range_rows_are_errors() {
        let mut ws = sample();
        assert!(ws.update(3, RowPatch::default()).is_err());
        assert!(ws.remove(3).is_err());
        assert_eq!(ws.len(), 3);
    }

    #[test]
    fn test_insert_and_remove_keep_order() {
        let mut ws = sample();
        let index = ws.insert(ChannelRecord::new("Yeni", "Kanal D", "http://x/d"));
        assert_eq!(index, 3);
        let removed = ws.remove(1).unwrap();
        assert_eq!(removed.name, "Spor 1");
        let names: Vec<_> = ws.records().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Kanal A", "Kanal C", "Kanal D"]);
    }

    #[test]
    fn test_summary_and_selection() {
        let mut ws = sample();
        assert_eq!(
            ws.summary(),
            Summary {
                total: 3,
                selected: 0,
                groups: 2
            }
        );
        ws.set_all_selected(true);
        assert_eq!(ws.summary().selected, 3);
        ws.set_all_selected(false);
        ws.update(2, RowPatch { selected: Some(true), ..Default::default() })
            .unwrap();
        assert_eq!(ws.summary().selected, 1);

        let plan = ws.export("iptv_listesi");
        assert!(plan.selected_only);
        assert_eq!(plan.count, 1);
        assert!(plan.body.contains("Kanal C"));
    }

    #[test]
    fn test_empty_workspace() {
        let ws = Workspace::new();
        assert!(ws.is_empty());
        assert_eq!(ws.summary().groups, 0);
        let plan = ws.export("p");
        assert_eq!(plan.body, "#EXTM3U\n");
        assert_eq!(plan.file_name, "p_tum_liste.m3u");
    }
}
