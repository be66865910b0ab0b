//! # efficacy roc
//!
//! treatment efficacy & classifier ROC analysis for epidemiology work
//!
//! ## what you get
//!
//! - efficacy (1 - RR) from a 2x2 attack-rate table w/ Fisher's exact p-value
//! - efficacy (1 - HR) from a cox proportional hazards fit
//! - ROC curve / AUC / accuracy for any binary classifier
//! - k-fold & leave-one-out cross-validated ROC that degrades gracefully
//!   when a fold separates perfectly
//! - lasso predictor selection
//! - the usual 2x2 stats (sensitivity, specificity, PPV, NPV, NNT, ...)
//!
//! ## quick start
//!
//! ```rust
//! use efficacy_roc::{compute_cv_roc, estimate_efficacy_ci, Dataset, LogisticRegression};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // 40 participants, half vaccinated
//! let treated: Vec<f64> = (0..40).map(|i| (i % 2) as f64).collect();
//! let infected: Vec<f64> = (0..40).map(|i| if i % 2 == 1 { (i % 10 == 1) as u8 as f64 } else { (i % 4 == 0) as u8 as f64 }).collect();
//! let titer: Vec<f64> = (0..40).map(|i| (i % 7) as f64 + (i % 2) as f64).collect();
//!
//! let data = Dataset::with_rows(40)
//!     .with_values("vaccinated", treated)?
//!     .with_values("infected", infected)?
//!     .with_values("titer", titer)?;
//!
//! let efficacy = estimate_efficacy_ci(&data, "vaccinated", "infected")?;
//! println!("TE = {:.2} {:?}", efficacy.point_estimate, efficacy.confidence_interval);
//!
//! // 5-fold cross-validated ROC of a logistic model
//! let roc = compute_cv_roc(&data, &LogisticRegression::new(), "infected", &["titer"], 5)?;
//! println!("AUC = {:.2}, cross-validated: {}", roc.curve.auc, roc.success);
//! # Ok(())
//! # }
//! ```

pub mod classifier;
pub mod contingency;
pub mod data;
pub mod efficacy;
pub mod error;
pub mod lasso;
pub mod metrics;
pub mod model;
pub mod optimization;
pub mod resampling;
pub mod roc;

pub use classifier::{Classifier, FittedClassifier, FittedModel, LogisticRegression};
pub use contingency::{roc_stats, ContingencyStats, ContingencyTable, ExactTest, FisherExact};
pub use data::{Dataset, DesignMatrix, RowId, SurvivalData};
pub use efficacy::{estimate_efficacy_ci, estimate_efficacy_ph, EfficacyEstimate};
pub use error::{StatsError, Result};
pub use lasso::{lasso_var_select, LassoCv, LassoRegression, LassoSelection, LassoSelector};
pub use model::{CoxModel, HazardsModel};
pub use resampling::{compute_cv_roc, compute_loo_roc, CrossValidator, ResampledRoc};
pub use roc::{compare_predictor_sets, compute_roc, PredictedProbabilities, RocCurve, RocSummary, SingleFitRoc};
