//! 📊 report.rs: "So... how did it go?" Every run, every topic, answered in one table.
//!
//! Each topic worker keeps a [`TopicReport`] while it runs and hands it back when its
//! queue closes. [`render_summary`] turns the pile of them into something a human can
//! read at the end of a shift.
//!
//! 🦆 The duck counted the poems. The duck got the same number. Good duck.

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::UTF8_FULL};

/// 📋 What one topic worker did with its queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicReport {
    pub topic: String,
    /// ✅ Fragments that made it into the basket.
    pub accepted: u64,
    /// 🗑️ Payloads that failed to decode or validate. Rejected, not requeued.
    pub malformed: u64,
    /// 💥 Valid fragments that still blew up in processing (wrong topic for this queue).
    pub faulted: u64,
    /// 💾 Poems the sink confirmed.
    pub poems_stored: u64,
    /// 💀 Poems the sink refused. Those poems are gone.
    pub sink_failures: u64,
    /// 🧺 Lines still in the basket at shutdown, never turned into a poem.
    pub partial_discarded: usize,
}

impl TopicReport {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Self::default()
        }
    }
}

/// 🔢 "1000000 poems" is a war crime. "1,000,000 poems" is a summary.
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

fn number_cell(n: u64) -> Cell {
    Cell::new(format_number(n)).set_alignment(CellAlignment::Right)
}

/// 🍽️ One row per topic plus a totals row, as a comfy-table.
pub fn render_summary(reports: &[TopicReport]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        "topic",
        "accepted",
        "malformed",
        "faulted",
        "poems stored",
        "sink failures",
        "lines discarded",
    ]);

    let mut total = TopicReport::new("total");
    for report in reports {
        table.add_row(vec![
            Cell::new(&report.topic),
            number_cell(report.accepted),
            number_cell(report.malformed),
            number_cell(report.faulted),
            number_cell(report.poems_stored),
            number_cell(report.sink_failures),
            number_cell(report.partial_discarded as u64),
        ]);
        total.accepted += report.accepted;
        total.malformed += report.malformed;
        total.faulted += report.faulted;
        total.poems_stored += report.poems_stored;
        total.sink_failures += report.sink_failures;
        total.partial_discarded += report.partial_discarded;
    }
    // -- 🧮 the bottom line, literally
    table.add_row(vec![
        Cell::new(&total.topic),
        number_cell(total.accepted),
        number_cell(total.malformed),
        number_cell(total.faulted),
        number_cell(total.poems_stored),
        number_cell(total.sink_failures),
        number_cell(total.partial_discarded as u64),
    ]);
    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_big_numbers_get_their_commas() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
    }

    #[test]
    fn the_one_where_the_summary_adds_everything_up() {
        let reports = vec![
            TopicReport {
                accepted: 1200,
                poems_stored: 40,
                partial_discarded: 2,
                ..TopicReport::new("Love")
            },
            TopicReport {
                accepted: 300,
                malformed: 7,
                sink_failures: 1,
                ..TopicReport::new("Death")
            },
        ];
        let summary = render_summary(&reports);

        assert!(summary.contains("Love"));
        assert!(summary.contains("Death"));
        assert!(summary.contains("1,200"));
        assert!(summary.contains("1,500"), "total accepted: {summary}");
        let total_row = summary
            .lines()
            .find(|line| line.contains("total"))
            .expect("a totals row");
        assert!(total_row.contains("40"));
        assert!(total_row.contains('7'));
    }

    #[test]
    fn the_one_where_nobody_showed_up() {
        let summary = render_summary(&[]);
        assert!(summary.contains("total"));
        assert!(summary.contains("poems"));
    }
}
