use std::fmt::Write as _;
use std::time::Duration;

use crossterm::style::{Color, Stylize};

use super::engine::Engine;

const RULE_STAGE: &str = "-----------------------";
const RULE_PASSED: &str = "--------";
const RULE_TIME: &str = "---------------";

/// `H:MM:SS`, whole seconds.
pub fn format_hms(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProfileRow {
    pub stage: String,
    pub passed: bool,
    pub optional: bool,
    pub elapsed: Duration,
    /// Share of the total, 0 to 100.
    pub percent: f64,
}

/// Timing table over every stage whose body ran.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub title: String,
    pub rows: Vec<ProfileRow>,
    pub total: Duration,
}

impl Profile {
    /// Render the table. `styled` adds colours and a bar chart sized to the
    /// terminal.
    pub fn render(&self, styled: bool) -> String {
        let mut lines = vec![format!("{} profile:", self.title)];
        lines.push(self.rule(styled));
        lines.push("|         Stage         | Passed |     Time      |".to_string());
        lines.push(self.rule(styled));
        let columns = if styled { terminal_columns() } else { 0 };
        for row in &self.rows {
            lines.push(self.render_row(row, styled, columns));
        }
        lines.push(self.footer(styled));
        lines.join("\n")
    }

    fn rule(&self, styled: bool) -> String {
        if styled {
            format!(
                "|{}|{}|{}|",
                RULE_STAGE.blue(),
                RULE_PASSED.blue(),
                RULE_TIME.blue()
            )
        } else {
            format!("|{RULE_STAGE}|{RULE_PASSED}|{RULE_TIME}|")
        }
    }

    fn footer(&self, styled: bool) -> String {
        let time = format!("{:<9}", format_hms(self.total));
        if styled {
            format!("|{} Total Time: {time}{}|", RULE_STAGE.blue(), "---".blue())
        } else {
            format!("|{RULE_STAGE} Total Time: {time}---|")
        }
    }

    fn render_row(&self, row: &ProfileRow, styled: bool, columns: u16) -> String {
        let time = format_hms(row.elapsed);
        let passed = format!("{:>6}", row.passed);
        let passed = if styled {
            let color = if row.passed {
                Color::Green
            } else if row.optional {
                Color::Blue
            } else {
                Color::Red
            };
            passed.with(color).to_string()
        } else {
            passed
        };

        if self.total.is_zero() {
            return format!("| {:>21} | {} | {:>12} |", row.stage, passed, time);
        }

        let timestr = format!("{:>8} {:>3}%", time, row.percent as u32);
        let mut line = format!("| {:>21} | {} | {:>12} |", row.stage, passed, timestr);
        if styled {
            let _ = write!(line, "{}|", bar(row.percent, columns));
        }
        line
    }
}

fn terminal_columns() -> u16 {
    crossterm::terminal::size().map(|(cols, _)| cols).unwrap_or(80)
}

fn bar(percent: f64, columns: u16) -> String {
    let room = columns.saturating_sub(50) as f64;
    let len = (percent * room / 75.0).min(room) as usize;
    let blocks = "█".repeat(len.saturating_sub(1));
    if percent > 50.0 {
        blocks.red().to_string()
    } else if percent > 20.0 {
        blocks.blue().to_string()
    } else if percent > 10.0 {
        blocks.green().to_string()
    } else {
        blocks
    }
}

impl Engine {
    /// Timing rows for every stage body that ran, in invocation order.
    pub fn profile(&self) -> Profile {
        let mut rows: Vec<ProfileRow> = self
            .state
            .ran()
            .iter()
            .filter_map(|name| self.registry.get(name))
            .map(|stage| ProfileRow {
                stage: stage.name().to_string(),
                passed: self.state.is_completed(stage.name()),
                optional: stage.optional(),
                elapsed: stage.record().elapsed,
                percent: 0.0,
            })
            .collect();

        let total: Duration = rows.iter().map(|r| r.elapsed).sum();
        if !total.is_zero() {
            for row in &mut rows {
                row.percent = row.elapsed.as_secs_f64() / total.as_secs_f64() * 100.0;
            }
        }
        Profile {
            title: self.name().to_string(),
            rows,
            total,
        }
    }

    /// The walk trace, top-level requests first.
    pub fn dep_tree(&self) -> String {
        let mut text = String::from("Dependency Tree, request order:");
        for entry in self.state.trace().iter().rev() {
            let label = format!(
                "{}{}{}",
                "  ".repeat(entry.depth),
                entry.reason.marker(),
                entry.stage
            );
            let _ = write!(text, "\n{:<30} : {}", label, entry.description);
        }
        text
    }

    /// Stages that finished, in order.
    pub fn done_stages(&self) -> String {
        let mut text = String::from("Stages done, in order:");
        for (i, name) in self.state.done().iter().enumerate() {
            let description = self
                .registry
                .get(name)
                .map(|s| s.description())
                .unwrap_or_default();
            let _ = write!(text, "\n{:3}. {:<20} : {}", i + 1, name, description);
        }
        text
    }

    /// Every registered stage with its description, in declaration order.
    pub fn list_stages(&self) -> String {
        let mut text = String::from("Stages:");
        for stage in self.registry.iter() {
            let _ = write!(text, "\n{:<20} : {}", stage.name(), stage.description());
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(stage: &str, passed: bool, secs: u64, percent: f64) -> ProfileRow {
        ProfileRow {
            stage: stage.to_string(),
            passed,
            optional: false,
            elapsed: Duration::from_secs(secs),
            percent,
        }
    }

    #[test]
    fn test_format_hms() {
        assert_eq!(format_hms(Duration::ZERO), "0:00:00");
        assert_eq!(format_hms(Duration::from_millis(61_900)), "0:01:01");
        assert_eq!(format_hms(Duration::from_secs(3 * 3600 + 5)), "3:00:05");
    }

    #[test]
    fn test_plain_profile() {
        let profile = Profile {
            title: "demo".to_string(),
            rows: vec![row("load", true, 30, 75.0), row("plot", false, 10, 25.0)],
            total: Duration::from_secs(40),
        };
        let text = profile.render(false);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "demo profile:");
        assert_eq!(lines[1], "|-----------------------|--------|---------------|");
        assert_eq!(lines[2], "|         Stage         | Passed |     Time      |");
        assert_eq!(lines[4], "|                  load |   true |  0:00:30  75% |");
        assert_eq!(lines[5], "|                  plot |  false |  0:00:10  25% |");
        assert_eq!(lines[6], "|----------------------- Total Time: 0:00:40  ---|");
    }

    #[test]
    fn test_zero_total_profile() {
        let profile = Profile {
            title: "dry".to_string(),
            rows: vec![row("load", true, 0, 0.0)],
            total: Duration::ZERO,
        };
        let text = profile.render(false);
        assert!(text.contains("|                  load |   true |      0:00:00 |"));
    }

    #[test]
    fn test_styled_profile_has_rows() {
        let profile = Profile {
            title: "demo".to_string(),
            rows: vec![row("load", true, 30, 100.0)],
            total: Duration::from_secs(30),
        };
        let text = profile.render(true);
        assert!(text.contains("load"));
        assert!(text.contains("Total Time"));
    }
}
