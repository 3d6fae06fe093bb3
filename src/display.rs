use std::fmt;

use unicode_width::UnicodeWidthStr;

use crate::db::QueryResult;

const MAX_CELL_WIDTH: usize = 40;

fn truncate(s: &str, width: usize) -> String {
    if s.width() <= width {
        return s.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for c in s.chars() {
        let w = unicode_width::UnicodeWidthChar::width(c).unwrap_or(0);
        if used + w + 1 > width {
            break;
        }
        out.push(c);
        used += w;
    }
    out.push('…');
    out
}

fn pad(s: &str, width: usize) -> String {
    let fill = width.saturating_sub(s.width());
    format!("{}{}", s, " ".repeat(fill))
}

/// Plain-text table for the console:
///
/// ```text
///  Results (1 rows)
/// id | name
/// ---+-----
/// 1  | bob
/// ```
pub fn render_table(result: &QueryResult) -> String {
    if result.columns.is_empty() {
        return " Results ".to_string();
    }

    let cells: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|v| truncate(&v.to_string(), MAX_CELL_WIDTH))
                .collect()
        })
        .collect();

    let widths: Vec<usize> = result
        .columns
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            cells
                .iter()
                .filter_map(|row| row.get(idx))
                .map(|c| c.width())
                .chain(std::iter::once(name.width()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |row: Vec<String>| -> String {
        row.iter()
            .zip(&widths)
            .map(|(c, w)| pad(c, *w))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let mut out = vec![format!(" Results ({} rows) ", result.rows.len())];
    out.push(line(result.columns.clone()));
    out.push(
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    out.extend(cells.into_iter().map(line));
    out.join("\n")
}

impl fmt::Display for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", render_table(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Value;

    #[test]
    fn aligns_columns_by_display_width() {
        let result = QueryResult {
            columns: vec!["id".into(), "name".into()],
            rows: vec![
                vec![Value::Int(1), Value::from("bob")],
                vec![Value::Int(22), Value::from("図書館")],
            ],
        };
        let table = render_table(&result);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], " Results (2 rows) ");
        assert_eq!(lines[1], "id | name");
        assert_eq!(lines[2], "---+-------");
        assert_eq!(lines[3], "1  | bob");
        assert_eq!(lines[4], "22 | 図書館");
    }

    #[test]
    fn long_cells_are_truncated() {
        let long = "x".repeat(100);
        let result = QueryResult {
            columns: vec!["c".into()],
            rows: vec![vec![Value::from(long.as_str())]],
        };
        let table = result.to_string();
        let last = table.lines().last().unwrap();
        assert_eq!(last.width(), MAX_CELL_WIDTH);
        assert!(last.ends_with('…'));
    }

    #[test]
    fn empty_header_renders_title_only() {
        assert_eq!(render_table(&QueryResult::empty()), " Results ");
    }
}
