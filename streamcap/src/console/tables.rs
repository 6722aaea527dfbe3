//! Console table rendering.

use colored::Colorize;
use tabled::builder::Builder;
use tabled::settings::Style;

use crate::database::models::ListingRow;

/// How many offline rows to show in the one-shot status table.
const OFFLINE_TABLE_LIMIT: usize = 10;

fn render(headers: &[&str], rows: Vec<Vec<String>>) -> String {
    let mut builder = Builder::default();
    builder.push_record(headers.iter().copied());
    for row in rows {
        builder.push_record(row);
    }
    builder.build().with(Style::ascii_rounded()).to_string()
}

/// Followed targets found online, most-captured first.
pub fn print_online_table(rows: &[(String, i64)]) {
    if rows.is_empty() {
        return;
    }

    let mut rows: Vec<_> = rows.to_vec();
    rows.sort_by(|a, b| b.1.cmp(&a.1));

    println!(
        "Followed streamers online: {}",
        rows.len().to_string().green()
    );
    let body = rows
        .into_iter()
        .map(|(name, recorded)| vec![name, recorded.to_string()])
        .collect();
    println!("{}\n", render(&["Streamers", "# Caps"], body));
}

/// Followed targets found offline, oldest sighting first, truncated.
pub fn print_offline_table(rows: &[ListingRow]) {
    if rows.is_empty() {
        return;
    }

    let total = rows.len();
    let mut rows: Vec<_> = rows.to_vec();
    rows.sort_by(|a, b| a.sort_value.cmp(&b.sort_value));

    if total > OFFLINE_TABLE_LIMIT {
        println!("Status for {OFFLINE_TABLE_LIMIT} of {total} followed streamers");
        rows.truncate(OFFLINE_TABLE_LIMIT);
    } else {
        println!(
            "Followed streamers offline: {}",
            total.to_string().green()
        );
    }

    let body = rows
        .into_iter()
        .map(|row| {
            vec![
                row.name,
                row.sort_value.unwrap_or_default(),
                row.recorded.to_string(),
            ]
        })
        .collect();
    println!("{}\n", render(&["Streamers", "Last Seen", "# Caps"], body));
}

/// Listing for the `cap` and `offline` console commands.
pub fn print_listing(headers: &[&str; 3], rows: &[ListingRow]) {
    let body = rows
        .iter()
        .map(|row| {
            vec![
                row.name.clone(),
                row.sort_value.clone().unwrap_or_default(),
                row.recorded.to_string(),
            ]
        })
        .collect();
    println!("{}", render(headers, body));
}
