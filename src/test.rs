use std::time::Instant;

use crate::error::{Error, Result};

/// Outcome of one named session, as shown in the summary and the JUnit report.
#[derive(Debug, Clone)]
pub struct Test {
    pub name: String,
    pub result: std::result::Result<String, Error>,
    pub time_secs: f64,
    pub sim_time_ns: f64,
    pub cycles: u64,
}

impl Test {
    pub fn passed(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Default)]
pub struct RstbTests(Vec<Test>);

impl RstbTests {
    pub fn new() -> Self {
        Self(Vec::new())
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn iter(&self) -> core::slice::Iter<'_, Test> {
        self.0.iter()
    }
    pub fn push(&mut self, test: Test) {
        self.0.push(test);
    }
    pub fn all_passed(&self) -> bool {
        self.0.iter().all(Test::passed)
    }

    /// Runs `f`, timing it in wall clock, and records what it returned.
    /// `f` reports simulated time and cycles alongside the verdict.
    pub fn run<F>(&mut self, name: &str, f: F) -> &Test
    where
        F: FnOnce() -> (Result<String>, f64, u64),
    {
        let start = Instant::now();
        let (result, sim_time_ns, cycles) = f();
        let time_secs = start.elapsed().as_secs_f64();
        match &result {
            Ok(msg) => tracing::info!(test = name, time_secs, "{msg}"),
            Err(e) => tracing::error!(test = name, time_secs, kind = ?e.kind(), "{e}"),
        }
        self.0.push(Test {
            name: name.to_string(),
            result,
            time_secs,
            sim_time_ns,
            cycles,
        });
        &self.0[self.0.len() - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_verdicts_in_order() {
        let mut tests = RstbTests::new();
        assert!(tests.run("ok", || (Ok("passed 3 cases".into()), 70.0, 7)).passed());
        let failed = tests.run("bad", || (Err(Error::Config("no".into())), 0.0, 0));
        assert!(!failed.passed());
        let names: Vec<&str> = tests.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["ok", "bad"]);
        assert!(!tests.all_passed());
    }
}
