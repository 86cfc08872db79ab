//! End of run summary.

use num_format::{Locale, ToFormattedString};
use prettytable::{Cell, Row, Table};

use crate::test::RstbTests;

fn grouped(n: u64) -> String {
    n.to_formatted_string(&Locale::en)
}

/// One row per session with verdict, cycles and simulation speed.
pub fn summary_table(tests: &RstbTests) -> Table {
    let mut table = Table::new();
    table.set_titles(Row::new(
        ["TEST", "RESULT", "CYCLES", "SIM TIME (ns)", "REAL TIME (s)", "SPEED (ns/s)"]
            .iter()
            .map(|t| Cell::new(t))
            .collect(),
    ));
    for t in tests.iter() {
        let result = match &t.result {
            Ok(_) => "passed".to_string(),
            Err(e) => format!("failed ({:?})", e.kind()),
        };
        let speed = if t.time_secs > 0.0 { t.sim_time_ns / t.time_secs } else { 0.0 };
        table.add_row(Row::new(vec![
            Cell::new(&t.name),
            Cell::new(&result),
            Cell::new(&grouped(t.cycles)),
            Cell::new(&grouped(t.sim_time_ns as u64)),
            Cell::new(&format!("{:.3}", t.time_secs)),
            Cell::new(&grouped(speed as u64)),
        ]));
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::test::Test;

    #[test]
    fn table_lists_every_test_with_grouped_counts() {
        let mut tests = RstbTests::new();
        tests.push(Test {
            name: "word".into(),
            result: Ok("passed 2000 cases".into()),
            time_secs: 2.0,
            sim_time_ns: 40_020.0,
            cycles: 4_002,
        });
        tests.push(Test {
            name: "frame".into(),
            result: Err(Error::Config("bus".into())),
            time_secs: 0.0,
            sim_time_ns: 0.0,
            cycles: 0,
        });
        let text = summary_table(&tests).to_string();
        assert!(text.contains("4,002"));
        assert!(text.contains("40,020"));
        assert!(text.contains("failed (Configuration)"));
    }
}
