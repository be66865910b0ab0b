//! 2x2 tables: diagnostic statistics & Fisher's exact test

use statrs::function::factorial::ln_binomial;
use crate::error::{StatsError, Result};

/// counts of a 2x2 table
///
/// rows split on the exposure (or observed) flag, columns on the event (or
/// predicted) flag:
///
/// ```text
///              event   no event
/// exposed        a        b
/// unexposed      c        d
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContingencyTable {
    pub a: u64,
    pub b: u64,
    pub c: u64,
    pub d: u64,
}

impl ContingencyTable {
    pub fn new(a: u64, b: u64, c: u64, d: u64) -> Self {
        Self { a, b, c, d }
    }

    /// tally aligned (row flag, column flag) pairs
    pub fn from_pairs(pairs: impl IntoIterator<Item = (bool, bool)>) -> Self {
        pairs.into_iter().fold(Self::default(), |mut table, pair| {
            match pair {
                (true, true) => table.a += 1,
                (true, false) => table.b += 1,
                (false, true) => table.c += 1,
                (false, false) => table.d += 1,
            }
            table
        })
    }

    pub fn total(&self) -> u64 {
        self.a + self.b + self.c + self.d
    }
}

/// standard 2x2 summaries for a binary prediction against an observed outcome
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContingencyStats {
    pub table: ContingencyTable,
    pub sensitivity: f64,    // 1 - false-negative rate
    pub specificity: f64,    // 1 - false-positive rate
    pub ppv: f64,            // 1 - false-discovery rate
    pub npv: f64,
    pub nnt: f64,            // infinite when the risk difference is zero
    pub accuracy: f64,
    pub relative_rate: f64,  // event rate among predicted positives vs negatives
    pub odds_ratio: f64,
}

impl ContingencyStats {
    pub fn from_table(table: ContingencyTable) -> Result<Self> {
        let ContingencyTable { a, b, c, d } = table;

        let checks = [
            (table.total(), "no records"),
            (a + b, "a + b (observed positives) is zero"),
            (c + d, "c + d (observed negatives) is zero"),
            (a + c, "a + c (predicted positives) is zero"),
            (b + d, "b + d (predicted negatives) is zero"),
            (b, "b is zero"),
            (c, "c is zero"),
            (d, "d is zero"),
        ];
        if let Some((_, why)) = checks.iter().find(|(count, _)| *count == 0) {
            return Err(StatsError::division_undefined(*why));
        }

        let (a, b, c, d) = (a as f64, b as f64, c as f64, d as f64);
        let n = a + b + c + d;

        let risk_difference = a / (a + c) - b / (b + d);
        let nnt = if risk_difference == 0.0 { f64::INFINITY } else { 1.0 / risk_difference };

        Ok(Self {
            table,
            sensitivity: a / (a + b),
            specificity: d / (c + d),
            ppv: a / (a + c),
            npv: d / (b + d),
            nnt,
            accuracy: (a + d) / n,
            relative_rate: (a / (a + c)) / (b / (b + d)),
            odds_ratio: (a / b) / (c / d),
        })
    }

    /// labelled values in report order
    pub fn entries(&self) -> [(&'static str, f64); 8] {
        [
            ("Sensitivity", self.sensitivity),
            ("Specificity", self.specificity),
            ("PPV", self.ppv),
            ("NPV", self.npv),
            ("NNT", self.nnt),
            ("ACC", self.accuracy),
            ("RR", self.relative_rate),
            ("OR", self.odds_ratio),
        ]
    }

    pub fn print(&self) {
        println!("2x2 table statistics");
        println!("====================");
        println!("a = {}, b = {}, c = {}, d = {}", self.table.a, self.table.b, self.table.c, self.table.d);
        for (label, value) in self.entries() {
            println!("{:<12} {:>10.4}", label, value);
        }
    }
}

/// 2x2 statistics from aligned observed / predicted vectors (nonzero = positive)
pub fn roc_stats(observed: &[f64], predicted: &[f64]) -> Result<ContingencyStats> {
    if observed.len() != predicted.len() {
        return Err(StatsError::invalid_dimensions(format!(
            "observed len ({}) != predicted len ({})",
            observed.len(),
            predicted.len()
        )));
    }

    if observed.iter().chain(predicted).any(|v| v.is_nan()) {
        return Err(StatsError::invalid_data("NaN in observed/predicted vectors"));
    }

    let table = ContingencyTable::from_pairs(
        observed.iter().zip(predicted).map(|(&obs, &pred)| (obs != 0.0, pred != 0.0)),
    );

    ContingencyStats::from_table(table)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExactTestResult {
    pub odds_ratio: f64,
    pub p_value: f64, // two-sided
}

/// exact test of association on a 2x2 table
pub trait ExactTest {
    fn exact_test(&self, table: &ContingencyTable) -> Result<ExactTestResult>;
}

/// Fisher's exact test, conditioning on both margins
#[derive(Debug, Clone, Copy)]
pub struct FisherExact {
    relative_tolerance: f64,
}

impl Default for FisherExact {
    fn default() -> Self {
        Self { relative_tolerance: 1e-7 }
    }
}

impl FisherExact {
    pub fn new() -> Self {
        Self::default()
    }

    /// log P(cell a = x) under the hypergeometric null
    fn log_probability(x: u64, row1: u64, row2: u64, col1: u64, n: u64) -> f64 {
        ln_binomial(row1, x) + ln_binomial(row2, col1 - x) - ln_binomial(n, col1)
    }
}

impl ExactTest for FisherExact {
    fn exact_test(&self, table: &ContingencyTable) -> Result<ExactTestResult> {
        let ContingencyTable { a, b, c, d } = *table;

        let odds_ratio = if b * c == 0 {
            if a * d == 0 { f64::NAN } else { f64::INFINITY }
        } else {
            (a as f64 * d as f64) / (b as f64 * c as f64)
        };

        let (row1, row2, col1) = (a + b, c + d, a + c);
        let n = table.total();

        // a degenerate margin leaves a single possible table
        if row1 == 0 || row2 == 0 || col1 == 0 || col1 == n {
            return Ok(ExactTestResult { odds_ratio, p_value: 1.0 });
        }

        let lo = col1.saturating_sub(row2);
        let hi = row1.min(col1);

        let observed = Self::log_probability(a, row1, row2, col1, n);
        let threshold = observed + self.relative_tolerance.ln_1p();

        let p_value: f64 = (lo..=hi)
            .map(|x| Self::log_probability(x, row1, row2, col1, n))
            .filter(|&lp| lp <= threshold)
            .map(f64::exp)
            .sum();

        Ok(ExactTestResult {
            odds_ratio,
            p_value: p_value.min(1.0),
        })
    }
}
