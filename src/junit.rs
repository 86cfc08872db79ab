use junit_report::{Duration, ReportBuilder, TestCaseBuilder, TestSuiteBuilder};
use std::path::Path;

use crate::error::{Error, Result};
use crate::test::RstbTests;

pub fn create_junit_xml(suite: &str, tests: &RstbTests, path: &Path) -> Result<()> {
    let mut test_cases = Vec::new();

    for t in tests.iter() {
        let tc = match &t.result {
            Ok(_) => TestCaseBuilder::success(&t.name, Duration::seconds_f64(t.time_secs)),
            Err(e) => TestCaseBuilder::failure(
                &t.name,
                Duration::seconds_f64(t.time_secs),
                &format!("{:?}", e.kind()),
                &e.to_string(),
            ),
        }
        .build();
        test_cases.push(tc);
    }

    let test_suite = TestSuiteBuilder::new(suite).add_testcases(test_cases).build();
    let report = ReportBuilder::new().add_testsuite(test_suite).build();
    let file = std::fs::File::create(path).map_err(|e| Error::Report(format!("{}: {e}", path.display())))?;
    report.write_xml(file).map_err(|e| Error::Report(e.to_string()))
}
