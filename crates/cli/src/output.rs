// Report rendering for the CLI
//
// Every command builds one serializable report. Structured formats dump it
// whole; text output is laid out by the command as fixed-width tables.

use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Yaml,
}

impl OutputFormat {
    /// Render `report`: serialized for json/yaml, through `text` otherwise.
    pub fn render<T: Serialize>(self, report: &T, text: impl FnOnce(&T)) -> Result<()> {
        match self {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
            OutputFormat::Yaml => print!("{}", serde_yaml::to_string(report)?),
            OutputFormat::Text => text(report),
        }
        Ok(())
    }
}

/// A record printed as one line of a fixed-width table
pub trait TableRow {
    /// Column titles and widths
    const COLUMNS: &'static [(&'static str, usize)];

    /// Cell values, in column order
    fn cells(&self) -> Vec<String>;
}

/// Print a header line followed by one line per row
pub fn print_table<R: TableRow>(rows: &[R]) {
    let titles: Vec<String> = R::COLUMNS.iter().map(|(t, _)| t.to_string()).collect();
    println!("{}", layout::<R>(&titles));
    for row in rows {
        println!("{}", layout::<R>(&row.cells()));
    }
}

fn layout<R: TableRow>(cells: &[String]) -> String {
    R::COLUMNS
        .iter()
        .zip(cells)
        .map(|((_, width), cell)| format!("{:<width$}", fit(cell, *width), width = width))
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_string()
}

/// Cut `cell` to `width` characters, marking the cut with "..."
fn fit(cell: &str, width: usize) -> String {
    if cell.chars().count() <= width {
        return cell.to_string();
    }
    let kept: String = cell.chars().take(width.saturating_sub(3)).collect();
    format!("{kept}...")
}

/// Print a `label: value` line in the summary block
pub fn print_field(label: &str, value: &str) {
    println!("{:<14} {}", format!("{label}:"), value);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Pair(&'static str, &'static str);

    impl TableRow for Pair {
        const COLUMNS: &'static [(&'static str, usize)] = &[("SLOT", 6), ("DRIVER", 6)];

        fn cells(&self) -> Vec<String> {
            vec![self.0.to_string(), self.1.to_string()]
        }
    }

    #[test]
    fn test_fit_truncates_by_chars() {
        assert_eq!(fit("D-04", 6), "D-04");
        assert_eq!(fit("Ladeplatz-Ä", 8), "Ladep...");
    }

    #[test]
    fn test_layout_pads_columns() {
        let row = Pair("D-04", "TRK-7");
        assert_eq!(layout::<Pair>(&row.cells()), "D-04    TRK-7");
    }
}
