use std::fmt::Write;

use serde::Deserialize;

use crate::channels::ChannelRecord;

pub const M3U_HEADER: &str = "#EXTM3U";
pub const EXPORT_EXTENSION: &str = ".m3u";
pub const EXPORT_MIME: &str = "text/plain";

const SELECTED_SUFFIX: &str = "_secilenler";
const ALL_SUFFIX: &str = "_tum_liste";

#[derive(Debug, Deserialize, Clone)]
pub struct ExportConfig {
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            file_prefix: default_file_prefix(),
        }
    }
}

fn default_file_prefix() -> String {
    "iptv_listesi".to_string()
}

/// Renders records as an M3U playlist. Every record is written, in order,
/// with a fixed `-1` duration. Values are not escaped.
pub fn to_m3u(records: &[ChannelRecord]) -> String {
    let mut out = String::with_capacity(16 + records.len() * 96);
    out.push_str(M3U_HEADER);
    out.push('\n');
    for record in records {
        // Writing into a String cannot fail.
        let _ = write!(
            out,
            "#EXTINF:-1 group-title=\"{}\",{}\n{}\n",
            record.group, record.name, record.url
        );
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPlan {
    pub file_name: String,
    pub selected_only: bool,
    pub count: usize,
    pub body: String,
}

/// Exports the selected rows if any are selected, otherwise all rows.
pub fn plan_export(records: &[ChannelRecord], prefix: &str) -> ExportPlan {
    let selected: Vec<ChannelRecord> = records.iter().filter(|r| r.selected).cloned().collect();
    let selected_only = !selected.is_empty();
    let (rows, suffix) = if selected_only {
        (selected.as_slice(), SELECTED_SUFFIX)
    } else {
        (records, ALL_SUFFIX)
    };

    ExportPlan {
        file_name: format!("{prefix}{suffix}{EXPORT_EXTENSION}"),
        selected_only,
        count: rows.len(),
        body: to_m3u(rows),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::parse_m3u;
    use crate::filter::filter_channels;

    #[test]
    fn test_to_m3u_layout() {
        let records = vec![
            ChannelRecord::new("Haber", "Kanal A", "http://example.com/a.m3u8"),
            ChannelRecord::new("TR|HD", "Kanal B", "http://example.com/b.m3u8"),
        ];
        assert_eq!(
            to_m3u(&records),
            "#EXTM3U\n\
             #EXTINF:-1 group-title=\"Haber\",Kanal A\n\
             http://example.com/a.m3u8\n\
             #EXTINF:-1 group-title=\"TR|HD\",Kanal B\n\
             http://example.com/b.m3u8\n"
        );
    }

    #[test]
    fn test_empty_input_is_header_only() {
        assert_eq!(to_m3u(&[]), "#EXTM3U\n");
    }

    #[test]
    fn test_empty_url_is_still_written() {
        let out = to_m3u(&[ChannelRecord::new("G", "N", "")]);
        assert_eq!(out, "#EXTM3U\n#EXTINF:-1 group-title=\"G\",N\n\n");
    }

    #[test]
    fn test_round_trip_preserves_records_and_order() {
        let records = vec![
            ChannelRecord::new("Spor", "Kanal 1 HD", "http://x/1"),
            ChannelRecord::new("", "", "rtsp://192.168.178.1:554/?pids=0,16"),
            ChannelRecord::new("TÜRKİYE", "İstanbul 1", "udp://@233.50.230.1:5000"),
            ChannelRecord::new("Genel", "Bilinmeyen", "http://x/4"),
        ];
        let reparsed = filter_channels(&parse_m3u(&to_m3u(&records)), false);
        assert_eq!(reparsed, records);
    }

    #[test]
    fn test_plan_exports_selection_when_present() {
        let mut records = vec![
            ChannelRecord::new("A", "One", "http://x/1"),
            ChannelRecord::new("B", "Two", "http://x/2"),
        ];
        records[1].selected = true;

        let plan = plan_export(&records, "iptv_listesi");
        assert!(plan.selected_only);
        assert_eq!(plan.count, 1);
        assert_eq!(plan.file_name, "iptv_listesi_secilenler.m3u");
        assert!(!plan.body.contains("One"));
        assert!(plan.body.contains("group-title=\"B\",Two"));
    }

    #[test]
    fn test_plan_exports_everything_without_selection() {
        let records = vec![
            ChannelRecord::new("A", "One", "http://x/1"),
            ChannelRecord::new("B", "Two", "http://x/2"),
        ];
        let plan = plan_export(&records, "liste");
        assert!(!plan.selected_only);
        assert_eq!(plan.count, 2);
        assert_eq!(plan.file_name, "liste_tum_liste.m3u");
        assert_eq!(plan.body, to_m3u(&records));
    }
}
