use thiserror::Error;

pub type Result<T> = std::result::Result<T, StatsError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StatsError {
    #[error("dimensions don't match: {message}")]
    InvalidDimensions { message: String },

    #[error("no column named `{name}`")]
    MissingColumn { name: String },

    #[error("bad data: {message}")]
    InvalidData { message: String },

    /// a 2x2 table with an empty margin - relative risk is undefined
    #[error("degenerate 2x2 table: {message}")]
    InvalidTable { message: String },

    /// an empty cell sits under a division in the table statistics
    #[error("division undefined: {message}")]
    DivisionUndefined { message: String },

    /// outcome perfectly predicted by the predictors, likelihood unbounded
    #[error("perfect separation: {message}")]
    PerfectSeparation { message: String },

    #[error("model fit failed: {message}")]
    ModelFit { message: String },

    #[error("model not fitted yet - call fit() first")]
    ModelNotFitted,

    #[error("bad parameter: {parameter} = {value}")]
    InvalidParameter { parameter: String, value: String },

    #[error("numerical issues: {message}")]
    NumericalError { message: String },

    #[error("only one outcome class present: {message}")]
    SingleClass { message: String },
}

impl StatsError {
    pub fn invalid_dimensions(message: impl Into<String>) -> Self {
        Self::InvalidDimensions { message: message.into() }
    }

    pub fn missing_column(name: impl Into<String>) -> Self {
        Self::MissingColumn { name: name.into() }
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData { message: message.into() }
    }

    pub fn invalid_table(message: impl Into<String>) -> Self {
        Self::InvalidTable { message: message.into() }
    }

    pub fn division_undefined(message: impl Into<String>) -> Self {
        Self::DivisionUndefined { message: message.into() }
    }

    pub fn perfect_separation(message: impl Into<String>) -> Self {
        Self::PerfectSeparation { message: message.into() }
    }

    pub fn model_fit(message: impl Into<String>) -> Self {
        Self::ModelFit { message: message.into() }
    }

    pub fn invalid_parameter(parameter: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            value: value.into(),
        }
    }

    pub fn numerical_error(message: impl Into<String>) -> Self {
        Self::NumericalError { message: message.into() }
    }

    pub fn single_class(message: impl Into<String>) -> Self {
        Self::SingleClass { message: message.into() }
    }

    /// recoverable fit failure - callers fall back instead of bailing
    pub fn is_perfect_separation(&self) -> bool {
        matches!(self, Self::PerfectSeparation { .. })
    }
}
