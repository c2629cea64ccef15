// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::time::Duration;

use crossterm::style::Stylize;

use crate::result::Task;

const PROGRESS_WIDTH: usize = 6;
const ELAPSED_WIDTH: usize = 13;

/// Print the elapsed time of each task and its share of the batch
pub fn print_table(tasks: &[Task]) {
    let rows = tasks
        .iter()
        .map(|task| (format!("{} {}", task.unique_key, task.platform), task))
        .collect::<Vec<_>>();

    let max_prefix_length = rows
        .iter()
        .map(|(label, _)| label.len() + 2)
        .max()
        .unwrap_or_default()
        .max("Tasks".len());
    let total_elapsed = tasks.iter().map(|task| task.elapsed).sum::<Duration>();

    println!(
        "T{:<max_prefix_length$}  {:>ELAPSED_WIDTH$} {:>PROGRESS_WIDTH$}",
        "asks", "Elapsed", "%",
    );

    for (label, task) in &rows {
        let mark = if task.success { "✓".green() } else { "✗".red() };
        let gap = max_prefix_length - (label.len() + 2);

        println!(
            "│{mark} {label}{}  {} {}",
            " ".repeat(gap),
            fmt_elapsed(task.elapsed),
            fmt_progress(task.elapsed, total_elapsed),
        );
    }

    println!(
        "{}",
        "─".repeat(1 + max_prefix_length + 2 + ELAPSED_WIDTH + 1 + PROGRESS_WIDTH),
    );
    println!(
        "T{:<max_prefix_length$}  {} {}",
        "otal",
        fmt_elapsed(total_elapsed),
        fmt_progress(total_elapsed, total_elapsed)
    );
    println!();
}

/// Format a template of `000h00m00.00s`, removing
/// leading zeros for spaces if the duration is
/// too small
fn fmt_elapsed(duration: Duration) -> String {
    let total_seconds = duration.as_secs_f32();
    let total_minutes = total_seconds as u64 / 60;
    let total_hours = total_minutes / 60;

    // Only pad zeros if next unit exists
    let seconds = if total_minutes >= 1 {
        format!("{:0>5.2}s", total_seconds % 60.0)
    } else {
        format!("{:>5.2}s", total_seconds % 60.0)
    };

    let minutes = if total_minutes >= 1 {
        let minutes = total_minutes % 60;
        if total_hours >= 1 {
            format!("{minutes:0>2}m")
        } else {
            format!("{minutes:>2}m")
        }
    } else {
        " ".repeat(3)
    };

    let hours = if total_hours >= 1 {
        format!("{total_hours:>3}h")
    } else {
        " ".repeat(4)
    };

    format!("{hours}{minutes}{seconds}")
}

fn fmt_progress(elapsed: Duration, total: Duration) -> String {
    if total.is_zero() {
        return format!("{:>5.1}%", 0.0);
    }

    let pct = elapsed.as_secs_f32() / total.as_secs_f32() * 100.0;

    format!("{pct:>5.1}%")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn elapsed() {
        assert_eq!(fmt_elapsed(Duration::from_millis(1_500)), "        1.50s");
        assert_eq!(fmt_elapsed(Duration::from_secs(61)), "     1m01.00s");
        assert_eq!(fmt_elapsed(Duration::from_secs(3_725)), "  1h02m05.00s");
        assert_eq!(fmt_elapsed(Duration::ZERO).len(), ELAPSED_WIDTH);
    }

    #[test]
    fn progress() {
        assert_eq!(fmt_progress(Duration::from_secs(1), Duration::from_secs(4)), " 25.0%");
        assert_eq!(fmt_progress(Duration::ZERO, Duration::ZERO), "  0.0%");
    }
}
