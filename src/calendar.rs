//! iCalendar export of task instances.
//!
//! Each instance becomes an all-day `VEVENT`. Recurring occurrences are exported as the
//! concrete instances of the listing window, so the calendar matches what `list` shows.

use chrono::{DateTime, Utc};

use crate::instance::TaskInstance;

const PRODID: &str = "-//opsdesk//Task Calendar//EN";
const CALENDAR_NAME: &str = "Operations Tasks";
const UID_DOMAIN: &str = "opsdesk.local";

/// Render instances as an `.ics` document with CRLF line endings.
pub fn render_ics(instances: &[&TaskInstance], now: DateTime<Utc>) -> String {
    let mut lines: Vec<String> = vec![
        "BEGIN:VCALENDAR".into(),
        "VERSION:2.0".into(),
        format!("PRODID:{PRODID}"),
        "CALSCALE:GREGORIAN".into(),
        "METHOD:PUBLISH".into(),
        format!("X-WR-CALNAME:{CALENDAR_NAME}"),
    ];
    let stamp = now.format("%Y%m%dT%H%M%SZ").to_string();

    for instance in instances {
        let t = instance.template();
        let date = instance.date();
        let summary = if instance.is_instance() {
            format!("{} ({})", t.title, t.frequency.as_str())
        } else {
            t.title.clone()
        };
        let categories = if t.categories.is_empty() {
            "Task".to_string()
        } else {
            t.categories.iter().map(|c| escape_text(c)).collect::<Vec<_>>().join(",")
        };

        lines.push("BEGIN:VEVENT".into());
        lines.push(format!("UID:task-{}@{UID_DOMAIN}", instance.id()));
        lines.push(format!("DTSTART;VALUE=DATE:{}", date.format("%Y%m%d")));
        // DTEND is exclusive for all-day events.
        lines.push(format!("DTEND;VALUE=DATE:{}", date.succ_opt().unwrap_or(date).format("%Y%m%d")));
        lines.push(format!("DTSTAMP:{stamp}"));
        lines.push(format!("SUMMARY:{}", escape_text(&summary)));
        lines.push(format!("DESCRIPTION:{}", escape_text(t.description.as_deref().unwrap_or(""))));
        lines.push(format!("LOCATION:{}", escape_text(&t.project_names.join(", "))));
        lines.push(format!("CATEGORIES:{categories}"));
        lines.push("STATUS:CONFIRMED".into());
        lines.push("TRANSP:OPAQUE".into());
        lines.push("END:VEVENT".into());
    }

    lines.push("END:VCALENDAR".into());
    let mut out = lines.join("\r\n");
    out.push_str("\r\n");
    out
}

/// Escape a TEXT value (RFC 5545 section 3.3.11).
pub fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{materialize, DateWindow, InstanceOptions};
    use crate::fields::Frequency;
    use crate::task::TaskTemplate;
    use chrono::{NaiveDate, TimeZone};

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn template() -> TaskTemplate {
        TaskTemplate {
            id: 21,
            title: "Inventory count".into(),
            description: Some("Dry store\nand freezer".into()),
            categories: vec!["stock".into()],
            project_names: vec!["Kowloon Bay".into(), "Central".into()],
            assigned_partners: vec![],
            priority: None,
            frequency: Frequency::Monthly,
            due_date: None,
            start_date: Some("2024-01-01".into()),
            end_date: Some("2024-02-29".into()),
            weekly_days: vec![],
            status: None,
            estimated_duration: None,
            created_at_utc: 0,
            updated_at_utc: 0,
        }
    }

    #[test]
    fn renders_one_event_per_instance() {
        let instances = materialize(
            &[template()],
            &[],
            &DateWindow::new(d("2024-01-01"), d("2024-12-31")),
            &InstanceOptions::new(d("2024-01-01")),
        );
        let refs: Vec<&TaskInstance> = instances.iter().collect();
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let ics = render_ics(&refs, now);

        assert!(ics.starts_with("BEGIN:VCALENDAR\r\nVERSION:2.0\r\n"));
        assert!(ics.ends_with("END:VCALENDAR\r\n"));
        assert_eq!(ics.matches("BEGIN:VEVENT").count(), 2);
        assert!(ics.contains("UID:task-21-2024-02@opsdesk.local"));
        assert!(ics.contains("DTSTART;VALUE=DATE:20240201\r\nDTEND;VALUE=DATE:20240202"));
        assert!(ics.contains("DTSTAMP:20240102T030405Z"));
        assert!(ics.contains("SUMMARY:Inventory count (monthly)"));
        assert!(ics.contains("DESCRIPTION:Dry store\\nand freezer"));
        assert!(ics.contains("LOCATION:Kowloon Bay\\, Central"));
        assert!(ics.contains("CATEGORIES:stock"));
    }

    #[test]
    fn escapes_reserved_characters() {
        assert_eq!(escape_text("a;b,c\\d\r\ne"), "a\\;b\\,c\\\\d\\ne");
    }
}
