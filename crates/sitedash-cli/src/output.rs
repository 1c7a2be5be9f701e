use serde::Serialize;
use sitedash_core::audit::AuditLogEntry;
use sitedash_core::build::BuildRecord;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let line = |cells: Vec<&str>| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, &w)| format!("{cell:w$}"))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    println!("{}", line(headers.to_vec()));
    println!(
        "{}",
        widths
            .iter()
            .map(|&w| "-".repeat(w))
            .collect::<Vec<_>>()
            .join("  ")
    );
    for row in &rows {
        println!("{}", line(row.iter().map(String::as_str).collect()));
    }
}

pub fn print_builds(records: &[BuildRecord]) {
    if records.is_empty() {
        println!("No builds yet.");
        return;
    }
    let rows = records
        .iter()
        .map(|r| {
            vec![
                r.id.to_string(),
                r.status.to_string(),
                r.user.clone(),
                r.created_at.format("%Y-%m-%d %H:%M").to_string(),
                r.message.clone(),
            ]
        })
        .collect();
    print_table(&["ID", "STATUS", "USER", "STARTED", "MESSAGE"], rows);
}

pub fn print_audit(entries: &[AuditLogEntry]) {
    if entries.is_empty() {
        println!("Audit log is empty.");
        return;
    }
    let rows = entries
        .iter()
        .map(|e| {
            vec![
                e.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                e.user.clone(),
                serde_json::to_value(e.kind)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default(),
                e.values.join(" "),
            ]
        })
        .collect();
    print_table(&["WHEN", "USER", "ACTION", "DETAILS"], rows);
}
