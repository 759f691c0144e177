//! Text rendering utilities for human-friendly diagnostics.
//!
//! Provides helpers to shorten type names, render captured stacks,
//! lay out service listings and suggest close matches for unknown names.

use crate::stacktrace::Frame;

/// Renders a captured stack, one frame per line, innermost first.
///
/// # Examples
/// ```
/// use khidma_support::rendering::render_stack;
/// use khidma_support::stacktrace::Frame;
///
/// let frames = vec![
///     Frame { file: "src/db.rs".into(), line: 3, column: 1, function: None },
///     Frame { file: "src/main.rs".into(), line: 9, column: 5, function: None },
/// ];
/// assert_eq!(render_stack(&frames), "  at src/db.rs:3:1\n  at src/main.rs:9:5\n");
/// ```
pub fn render_stack(frames: &[Frame]) -> String {
    frames.iter().map(|frame| format!("  at {frame}\n")).collect()
}

/// Renders a list of registered services as aligned rows.
///
/// ```text
/// 😴 [lazy     ] db            healthchecker  (from: src/main.rs:12:5)
/// 🏭 [transient] request_id
/// ```
pub fn render_service_table(rows: &[ServiceRow]) -> String {
    let kind_width = rows.iter().map(|r| r.kind.len()).max().unwrap_or(0);
    let name_width = rows.iter().map(|r| r.name.len()).max().unwrap_or(0);

    let mut result = String::new();
    for row in rows {
        let mut line = format!(
            "{} [{:<kind_width$}] {:<name_width$}",
            row.glyph, row.kind, row.name,
        );

        if !row.tags.is_empty() {
            line.push_str("  ");
            line.push_str(&row.tags.join(", "));
        }

        if let Some(ref source) = row.source {
            line.push_str(&format!("  (from: {source})"));
        }

        result.push_str(line.trim_end());
        result.push('\n');
    }

    result
}

/// One row of [`render_service_table`].
#[derive(Debug, Clone, Default)]
pub struct ServiceRow {
    /// Lifecycle glyph, e.g. "😴"
    pub glyph: String,
    /// Lifecycle name, e.g. "lazy"
    pub kind: String,
    /// Registered service name
    pub name: String,
    /// Capability tags, e.g. "healthchecker"
    pub tags: Vec<String>,
    /// Optional: where the service was registered
    pub source: Option<String>,
}

/// Shortens a fully qualified type name for display.
///
/// ```
/// use khidma_support::rendering::shorten_type_name;
///
/// let short = shorten_type_name("my_app::db::Connection");
/// assert_eq!(short, "Connection");
///
/// let short = shorten_type_name("alloc::sync::Arc<my_app::db::Connection>");
/// assert_eq!(short, "Arc<Connection>");
/// ```
pub fn shorten_type_name(full_name: &str) -> String {
    let mut result = String::with_capacity(full_name.len());
    let mut chars = full_name.chars().peekable();
    let mut segment = String::new();

    while let Some(ch) = chars.next() {
        match ch {
            ':' if chars.peek() == Some(&':') => {
                chars.next();
                segment.clear();
            }
            '<' | '>' | ',' | ' ' | '&' | '(' | ')' | '[' | ']' | ';' => {
                result.push_str(&segment);
                result.push(ch);
                segment.clear();
            }
            _ => segment.push(ch),
        }
    }

    result.push_str(&segment);
    result
}

/// Suggests registered names close to `requested`, best match first.
///
/// Matching is case-insensitive and compares both the full names and
/// their shortened forms, so a bare `Connection` finds
/// `alloc::sync::Arc<my_app::Connection>`.
pub fn suggest_similar(requested: &str, available: &[&str], max_suggestions: usize) -> Vec<String> {
    let requested_lower = requested.to_lowercase();
    let requested_short = shorten_type_name(requested).to_lowercase();

    let mut scored: Vec<(&str, usize)> = available
        .iter()
        .filter(|&&name| name != requested)
        .filter_map(|&name| {
            let name_lower = name.to_lowercase();
            let name_short = shorten_type_name(name).to_lowercase();

            if name_lower.contains(&requested_lower) || requested_lower.contains(&name_lower) {
                return Some((name, 100));
            }

            if name_short.contains(&requested_short) || requested_short.contains(&name_short) {
                return Some((name, 80));
            }

            let common = name_short
                .chars()
                .zip(requested_short.chars())
                .take_while(|(a, b)| a == b)
                .count();

            (common >= 3).then_some((name, common * 10))
        })
        .collect();

    scored.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    scored
        .into_iter()
        .take(max_suggestions)
        .map(|(name, _)| name.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_empty_stack() {
        assert_eq!(render_stack(&[]), "");
    }

    #[test]
    fn shorten_simple_path() {
        assert_eq!(shorten_type_name("my_app::services::Mailer"), "Mailer");
    }

    #[test]
    fn shorten_with_generics_and_refs() {
        assert_eq!(
            shorten_type_name("alloc::sync::Arc<dyn my_app::traits::Clock>"),
            "Arc<dyn Clock>"
        );
        assert_eq!(shorten_type_name("&alloc::string::String"), "&String");
        assert_eq!(
            shorten_type_name("(my_app::A, my_app::B)"),
            "(A, B)"
        );
    }

    #[test]
    fn shorten_no_path() {
        assert_eq!(shorten_type_name("u32"), "u32");
    }

    #[test]
    fn suggest_by_short_name() {
        let available = vec![
            "alloc::sync::Arc<my_app::db::Connection>",
            "my_app::Mailer",
            "cache",
        ];

        let suggestions = suggest_similar("Connection", &available, 3);
        assert_eq!(suggestions.len(), 1);
        assert!(suggestions[0].contains("Connection"));
    }

    #[test]
    fn suggest_typo_by_prefix() {
        let available = vec!["database", "mailer"];
        let suggestions = suggest_similar("datbase", &available, 3);
        assert_eq!(suggestions, vec!["database".to_string()]);
    }

    #[test]
    fn suggest_excludes_exact_name_and_unrelated() {
        let available = vec!["db", "xyz"];
        assert!(suggest_similar("db", &available, 3).is_empty());
        assert!(suggest_similar("queue", &available, 3).is_empty());
    }

    #[test]
    fn service_table_aligns_columns() {
        let rows = vec![
            ServiceRow {
                glyph: "😴".into(),
                kind: "lazy".into(),
                name: "db".into(),
                tags: vec!["healthchecker".into()],
                source: Some("src/main.rs:12:5".into()),
            },
            ServiceRow {
                glyph: "🏭".into(),
                kind: "transient".into(),
                name: "request_id".into(),
                tags: vec![],
                source: None,
            },
        ];

        let rendered = render_service_table(&rows);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("😴 [lazy     ] db"));
        assert!(lines[0].contains("healthchecker"));
        assert!(lines[0].ends_with("(from: src/main.rs:12:5)"));
        assert_eq!(lines[1], "🏭 [transient] request_id");
    }
}
