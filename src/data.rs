use std::collections::HashSet;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use crate::error::{StatsError, Result};

/// stable identifier of a source row - survives filtering & resampling
pub type RowId = usize;

#[derive(Debug, Clone)]
struct Column {
    name: String,
    values: Vec<Option<f64>>,
}

/// a table of records: row ids plus named numeric columns (None = missing)
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    row_ids: Vec<RowId>,
    columns: Vec<Column>,
}

impl Dataset {
    /// empty table over the given row ids - ids must be unique
    pub fn new(row_ids: Vec<RowId>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(row_ids.len());
        if let Some(dup) = row_ids.iter().find(|&&id| !seen.insert(id)) {
            return Err(StatsError::invalid_data(format!("row id {} appears twice", dup)));
        }

        Ok(Self { row_ids, columns: Vec::new() })
    }

    /// empty table with ids 0..n
    pub fn with_rows(n_rows: usize) -> Self {
        Self { row_ids: (0..n_rows).collect(), columns: Vec::new() }
    }

    /// add a column, None marks a missing cell
    pub fn with_column(mut self, name: impl Into<String>, values: Vec<Option<f64>>) -> Result<Self> {
        let name = name.into();

        if values.len() != self.n_rows() {
            return Err(StatsError::invalid_dimensions(format!(
                "column `{}` has {} values, table has {} rows",
                name,
                values.len(),
                self.n_rows()
            )));
        }

        if self.columns.iter().any(|c| c.name == name) {
            return Err(StatsError::invalid_data(format!("column `{}` already exists", name)));
        }

        self.columns.push(Column { name, values });
        Ok(self)
    }

    /// add a fully observed column (NaN still counts as missing)
    pub fn with_values(self, name: impl Into<String>, values: Vec<f64>) -> Result<Self> {
        let values = values
            .into_iter()
            .map(|v| if v.is_nan() { None } else { Some(v) })
            .collect();
        self.with_column(name, values)
    }

    pub fn n_rows(&self) -> usize {
        self.row_ids.len()
    }

    pub fn row_ids(&self) -> &[RowId] {
        &self.row_ids
    }

    pub fn column(&self, name: &str) -> Result<&[Option<f64>]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
            .ok_or_else(|| StatsError::missing_column(name))
    }

    /// rows where every named column is present, in table order
    fn complete_rows(&self, names: &[&str]) -> Result<(Vec<usize>, Vec<&[Option<f64>]>)> {
        let columns = names
            .iter()
            .map(|name| self.column(name))
            .collect::<Result<Vec<_>>>()?;

        let rows = (0..self.n_rows())
            .filter(|&i| columns.iter().all(|col| col[i].is_some()))
            .collect();

        Ok((rows, columns))
    }

    /// drop incomplete rows & build the outcome vector / predictor matrix
    pub fn complete_cases<S: AsRef<str>>(&self, outcome: &str, predictors: &[S]) -> Result<DesignMatrix> {
        let mut names = vec![outcome];
        names.extend(predictors.iter().map(|p| p.as_ref()));

        let (rows, columns) = self.complete_rows(&names)?;
        let n_features = predictors.len();

        let mut outcome_values = Vec::with_capacity(rows.len());
        let mut predictor_values = Vec::with_capacity(rows.len() * n_features);

        for &i in &rows {
            let y = columns[0][i].unwrap_or(f64::NAN);
            binary_value(y, outcome)?;
            outcome_values.push(y);

            predictor_values.extend(columns[1..].iter().map(|col| col[i].unwrap_or(f64::NAN)));
        }

        let predictors_matrix = Array2::from_shape_vec((rows.len(), n_features), predictor_values)
            .map_err(|e| StatsError::invalid_dimensions(e.to_string()))?;

        Ok(DesignMatrix {
            row_ids: rows.iter().map(|&i| self.row_ids[i]).collect(),
            outcome_name: outcome.to_string(),
            outcome: Array1::from(outcome_values),
            predictors: predictors_matrix,
            predictor_names: predictors.iter().map(|p| p.as_ref().to_string()).collect(),
        })
    }

    /// complete rows of (duration, event, covariates...) as Cox input
    pub fn survival_data<S: AsRef<str>>(
        &self,
        duration: &str,
        event: &str,
        covariates: &[S],
    ) -> Result<SurvivalData> {
        let mut names = vec![duration, event];
        names.extend(covariates.iter().map(|c| c.as_ref()));

        let (rows, columns) = self.complete_rows(&names)?;

        let mut times = Vec::with_capacity(rows.len());
        let mut events = Vec::with_capacity(rows.len());
        let mut covariate_values = Vec::with_capacity(rows.len() * covariates.len());

        for &i in &rows {
            times.push(columns[0][i].unwrap_or(f64::NAN));
            events.push(binary_value(columns[1][i].unwrap_or(f64::NAN), event)?);
            covariate_values.extend(columns[2..].iter().map(|col| col[i].unwrap_or(f64::NAN)));
        }

        let covariates_matrix = Array2::from_shape_vec((rows.len(), covariates.len()), covariate_values)
            .map_err(|e| StatsError::invalid_dimensions(e.to_string()))?;

        SurvivalData::new(times, events, covariates_matrix)
    }
}

/// 0/1 check for outcome-like columns
pub(crate) fn binary_value(value: f64, column: &str) -> Result<bool> {
    if value == 1.0 {
        Ok(true)
    } else if value == 0.0 {
        Ok(false)
    } else {
        Err(StatsError::invalid_data(format!(
            "column `{}` must be binary (0/1), found {}",
            column, value
        )))
    }
}

/// complete-case outcome vector + predictor matrix, rows tagged by id
#[derive(Debug, Clone)]
pub struct DesignMatrix {
    row_ids: Vec<RowId>,
    outcome_name: String,
    outcome: Array1<f64>,
    predictors: Array2<f64>,
    predictor_names: Vec<String>,
}

impl DesignMatrix {
    /// build directly from arrays, ids 0..n
    pub fn new(outcome: Array1<f64>, predictors: Array2<f64>) -> Result<Self> {
        if outcome.len() != predictors.nrows() {
            return Err(StatsError::invalid_dimensions(format!(
                "outcome len ({}) != predictor rows ({})",
                outcome.len(),
                predictors.nrows()
            )));
        }

        for &y in outcome.iter() {
            binary_value(y, "outcome")?;
        }

        let predictor_names = (0..predictors.ncols()).map(|j| format!("x{}", j)).collect();

        Ok(Self {
            row_ids: (0..outcome.len()).collect(),
            outcome_name: "outcome".to_string(),
            outcome,
            predictors,
            predictor_names,
        })
    }

    pub fn n_samples(&self) -> usize {
        self.outcome.len()
    }

    pub fn n_features(&self) -> usize {
        self.predictors.ncols()
    }

    pub fn row_ids(&self) -> &[RowId] {
        &self.row_ids
    }

    pub fn outcome_name(&self) -> &str {
        &self.outcome_name
    }

    pub fn outcome(&self) -> ArrayView1<'_, f64> {
        self.outcome.view()
    }

    pub fn predictors(&self) -> ArrayView2<'_, f64> {
        self.predictors.view()
    }

    pub fn predictor_names(&self) -> &[String] {
        &self.predictor_names
    }

    /// grab a subset of rows by position, ids travel along
    pub fn subset(&self, indices: &[usize]) -> Result<Self> {
        if indices.iter().any(|&i| i >= self.n_samples()) {
            return Err(StatsError::invalid_dimensions("subset index out of bounds"));
        }

        Ok(Self {
            row_ids: indices.iter().map(|&i| self.row_ids[i]).collect(),
            outcome_name: self.outcome_name.clone(),
            outcome: self.outcome.select(Axis(0), indices),
            predictors: self.predictors.select(Axis(0), indices),
            predictor_names: self.predictor_names.clone(),
        })
    }
}

/// survival data - times, events, and covariates
#[derive(Debug, Clone)]
pub struct SurvivalData {
    times: Array1<f64>,                // time to event/censoring
    events: Vec<bool>,                 // true = event, false = censored
    covariates: Array2<f64>,           // n_samples x n_features
    risk_set_indices: Vec<Vec<usize>>, // one per distinct event time
    event_indices: Vec<Vec<usize>>,    // who had the event at that time
}

impl SurvivalData {
    pub fn new(times: Vec<f64>, events: Vec<bool>, covariates: Array2<f64>) -> Result<Self> {
        let n_samples = times.len();

        if events.len() != n_samples {
            return Err(StatsError::invalid_dimensions(format!(
                "times len ({}) != events len ({})",
                n_samples,
                events.len()
            )));
        }

        if covariates.nrows() != n_samples {
            return Err(StatsError::invalid_dimensions(format!(
                "covariates rows ({}) != n_samples ({})",
                covariates.nrows(),
                n_samples
            )));
        }

        if times.iter().any(|&t| t < 0.0 || !t.is_finite()) {
            return Err(StatsError::invalid_data("durations must be non-negative & finite"));
        }

        if covariates.iter().any(|v| !v.is_finite()) {
            return Err(StatsError::invalid_data("covariates must be finite"));
        }

        let mut data = Self {
            times: Array1::from(times),
            events,
            covariates,
            risk_set_indices: Vec::new(),
            event_indices: Vec::new(),
        };

        data.compute_risk_sets();
        Ok(data)
    }

    /// precompute who is at risk (and who fails) at each event time
    fn compute_risk_sets(&mut self) {
        let event_times = self.event_times();

        self.risk_set_indices.clear();
        self.event_indices.clear();

        for &event_time in &event_times {
            let risk_set = (0..self.n_samples())
                .filter(|&i| self.times[i] >= event_time)
                .collect();
            let failures = (0..self.n_samples())
                .filter(|&i| self.events[i] && self.times[i] == event_time)
                .collect();

            self.risk_set_indices.push(risk_set);
            self.event_indices.push(failures);
        }
    }

    pub fn n_samples(&self) -> usize {
        self.times.len()
    }

    pub fn n_features(&self) -> usize {
        self.covariates.ncols()
    }

    pub fn n_events(&self) -> usize {
        self.events.iter().filter(|&&e| e).count()
    }

    pub fn times(&self) -> ArrayView1<'_, f64> {
        self.times.view()
    }

    pub fn events(&self) -> &[bool] {
        &self.events
    }

    pub fn covariates(&self) -> ArrayView2<'_, f64> {
        self.covariates.view()
    }

    /// risk sets, aligned with `event_times()`
    pub fn risk_sets(&self) -> &[Vec<usize>] {
        &self.risk_set_indices
    }

    /// failures at each event time, aligned with `event_times()`
    pub fn failures(&self) -> &[Vec<usize>] {
        &self.event_indices
    }

    /// unique event times in order
    pub fn event_times(&self) -> Vec<f64> {
        let mut times: Vec<f64> = self
            .times
            .iter()
            .zip(self.events.iter())
            .filter_map(|(&time, &event)| if event { Some(time) } else { None })
            .collect();

        times.sort_by(f64::total_cmp);
        times.dedup();
        times
    }

    /// covariates shifted to column means of zero - same coefficients, tamer exp()
    pub fn centered_covariates(&self) -> Array2<f64> {
        match self.covariates.mean_axis(Axis(0)) {
            Some(means) => &self.covariates - &means.insert_axis(Axis(0)),
            None => self.covariates.clone(),
        }
    }
}
