use serde_json::json;

use crate::permissions::ids::split_permission_id;
use crate::permissions::{GateState, PermissionSnapshot, PermissionStatus};

pub const OUTPUT_ENV: &str = "INVENTORY_OUTPUT";

fn json_requested() -> bool {
    std::env::var(OUTPUT_ENV).map(|v| v.eq_ignore_ascii_case("json")).unwrap_or(false)
}

/// Print the permission set as a table (or JSON when `INVENTORY_OUTPUT=json`).
pub fn print_permissions(snap: &PermissionSnapshot) {
    if json_requested() {
        println!("{}", snapshot_json(snap));
        return;
    }
    println!("{}", render_permission_table(snap));
}

pub fn snapshot_json(snap: &PermissionSnapshot) -> serde_json::Value {
    let mut ids: Vec<&str> = snap.permissions().collect();
    ids.sort_unstable();
    json!({
        "status": snap.status(),
        "user_type": snap.user_type(),
        "user": snap.user_info(),
        "is_admin": snap.is_admin(),
        "permissions": ids,
    })
}

pub fn render_permission_table(snap: &PermissionSnapshot) -> String {
    let cols = vec!["resource".to_string(), "action".to_string(), "permission".to_string()];
    let mut ids: Vec<&str> = snap.permissions().collect();
    ids.sort_unstable();
    let rows: Vec<Vec<String>> = ids
        .iter()
        .map(|id| match split_permission_id(id) {
            Some((r, a)) => vec![r.to_string(), a.to_string(), id.to_string()],
            None => vec!["?".to_string(), "?".to_string(), id.to_string()],
        })
        .collect();

    let mut out = Vec::new();
    out.push(format!("status: {}", status_label(snap.status())));
    if let Some(ut) = snap.user_type().and_then(|t| t.name()) {
        out.push(format!("user type: {}", ut));
    }
    if rows.is_empty() {
        out.push("no permissions".to_string());
        return out.join("\n");
    }

    let max_col_width: usize = 48;
    let mut widths: Vec<usize> = cols.iter().map(|s| s.len().min(max_col_width)).collect();
    for r in &rows {
        for (i, cell) in r.iter().enumerate() {
            let w = cell.chars().count();
            if w > widths[i] { widths[i] = w.min(max_col_width); }
        }
    }
    let sep = build_separator(&widths);
    out.push(sep.clone());
    out.push(build_row(&cols, &widths));
    out.push(sep.clone());
    for r in &rows {
        out.push(build_row(r, &widths));
    }
    out.push(sep);
    out.push(format!("permissions: {}, admin: {}", rows.len(), if snap.is_admin() { "yes" } else { "no" }));
    out.join("\n")
}

pub fn status_label(status: &PermissionStatus) -> String {
    match status {
        PermissionStatus::Loading => "loading".to_string(),
        PermissionStatus::Ready => "ready".to_string(),
        PermissionStatus::Unauthenticated => "not authenticated".to_string(),
        PermissionStatus::Failed(reason) => format!("failed ({reason})"),
    }
}

pub fn gate_label(state: GateState) -> &'static str {
    match state {
        GateState::Loading => "loading",
        GateState::Granted => "granted",
        GateState::Denied => "denied",
    }
}

fn build_separator(widths: &[usize]) -> String {
    let mut s = String::new();
    s.push('+');
    for w in widths {
        s.push_str(&"-".repeat(*w + 2));
        s.push('+');
    }
    s
}

fn build_row(cells: &[String], widths: &[usize]) -> String {
    let mut s = String::new();
    s.push('|');
    for (i, w) in widths.iter().enumerate() {
        let cell = cells.get(i).cloned().unwrap_or_default();
        let text = truncate(&cell, *w);
        s.push(' ');
        s.push_str(&text);
        s.push_str(&" ".repeat(w.saturating_sub(text.chars().count())));
        s.push(' ');
        s.push('|');
    }
    s
}

fn truncate(s: &str, max: usize) -> String {
    let len = s.chars().count();
    if len <= max { return s.to_string(); }
    if max <= 1 { return "…".to_string(); }
    let take = max - 1;
    s.chars().take(take).collect::<String>() + "…"
}
