//! Test case selection
use sdei_test_suite::sdei_tests::{self, TestMeta, TESTS};
use std::fmt;
use thiserror::Error;

/// One run of a test case. `watchdog` is `None` if the test case picks the
/// device by itself.
#[derive(Debug, Clone, Copy)]
pub struct TestRun {
    pub case: &'static TestMeta,
    pub watchdog: Option<usize>,
}

impl fmt::Display for TestRun {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "sdei_tests::{}", self.case.name)?;
        if let Some(index) = self.watchdog {
            write!(f, "@wd{index}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum TestFilter {
    Pass,
    CaseNameContains(String),
    CaseId(u32),
    Disjuction(Vec<TestFilter>),
}

impl TestFilter {
    fn matches(&self, case: &TestMeta) -> bool {
        match self {
            Self::Pass => true,
            Self::CaseNameContains(needle) => case.name.contains(&**needle),
            Self::CaseId(id) => case.id == *id,
            Self::Disjuction(subfilters) => {
                subfilters.iter().any(|subfilter| subfilter.matches(case))
            }
        }
    }

    pub fn all_matching_cases(&self) -> impl Iterator<Item = &'static TestMeta> + '_ {
        TESTS.iter().filter(move |case| self.matches(case))
    }
}

#[derive(Error, Debug)]
pub enum TestFilterParseError {
    #[error("Empty test filter")]
    Empty,
    #[error("Invalid test number: '{0}'")]
    BadId(String),
}

impl std::str::FromStr for TestFilter {
    type Err = TestFilterParseError;

    /// Parse a filter string.
    ///
    ///  - `#032` chooses the test case published under that number.
    ///  - The exact name of a test case chooses only that test case.
    ///  - Anything else chooses the test cases whose names contain it.
    ///
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            Err(TestFilterParseError::Empty)
        } else if let Some(id) = s.strip_prefix('#') {
            id.parse()
                .map(TestFilter::CaseId)
                .map_err(|_| TestFilterParseError::BadId(id.to_owned()))
        } else if let Some(case) = sdei_tests::find(s) {
            Ok(TestFilter::CaseId(case.id))
        } else {
            Ok(TestFilter::CaseNameContains(s.to_owned()))
        }
    }
}
