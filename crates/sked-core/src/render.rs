use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::NaiveDate;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::{is_strictly_after, parse_compact_date};
use crate::task::Task;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    #[tracing::instrument(skip(self, tasks, today))]
    pub fn print_task_table(&mut self, tasks: &[Task], today: NaiveDate) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let (headers, rows) = self.task_rows(tasks, today);
        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, task))]
    pub fn print_task_info(&mut self, task: &Task) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        write_task_info(&mut out, task)
    }

    fn task_rows(&self, tasks: &[Task], today: NaiveDate) -> (Vec<String>, Vec<Vec<String>>) {
        let headers = vec![
            "ID".to_string(),
            "Date".to_string(),
            "Title".to_string(),
            "Repeat".to_string(),
            "Comment".to_string(),
        ];

        let mut rows = Vec::with_capacity(tasks.len());

        for task in tasks {
            let overdue = parse_compact_date(&task.date)
                .map(|date| is_strictly_after(&today, &date))
                .unwrap_or(false);
            let date = if overdue {
                self.paint(&task.date, "31")
            } else {
                task.date.clone()
            };

            let id = self.paint(&task.id, "33");
            let comment = task.comment.lines().next().unwrap_or_default().to_string();

            rows.push(vec![id, date, task.title.clone(), task.repeat.clone(), comment]);
        }

        (headers, rows)
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_task_info<W: Write>(mut out: W, task: &Task) -> anyhow::Result<()> {
    writeln!(out, "id       {}", task.id)?;
    writeln!(out, "date     {}", task.date)?;
    writeln!(out, "title    {}", task.title)?;
    if task.is_repeating() {
        writeln!(out, "repeat   {}", task.repeat)?;
    }
    if !task.comment.is_empty() {
        writeln!(out, "comment  {}", task.comment)?;
    }
    Ok(())
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::{strip_ansi, write_table, write_task_info};
    use crate::task::Task;

    #[test]
    fn table_pads_to_widest_visible_cell() {
        let mut out = Vec::new();
        write_table(
            &mut out,
            vec!["ID".to_string(), "Title".to_string()],
            vec![
                vec!["\x1b[33m1\x1b[0m".to_string(), "Tea".to_string()],
                vec!["12".to_string(), "Café run".to_string()],
            ],
        )
        .expect("write table");

        let text = String::from_utf8(out).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "ID Title    ");
        assert_eq!(lines[1], "-- -------- ");
        assert_eq!(strip_ansi(lines[2]), "1  Tea      ");
        assert_eq!(lines[3], "12 Café run ");
    }

    #[test]
    fn info_skips_empty_optional_fields() {
        let task = Task {
            id: "3".to_string(),
            date: "20240517".to_string(),
            title: "Birthday".to_string(),
            repeat: "y".to_string(),
            ..Task::default()
        };
        let mut out = Vec::new();
        write_task_info(&mut out, &task).expect("write info");

        let text = String::from_utf8(out).expect("utf8");
        assert_eq!(
            text,
            "id       3\ndate     20240517\ntitle    Birthday\nrepeat   y\n"
        );
    }
}
