//! model::models — assembled behavioral models.
//!
//! [`behavioral`] owns the user-facing [`behavioral::BehavioralModel`]
//! with its fit/simulate entry points and compiled-form cache;
//! [`model_internals`] owns the θ-vector layout and the composed log
//! density those entry points hand to the estimation layer.

pub mod behavioral;
pub mod model_internals;

pub use self::behavioral::{BehavioralModel, CacheKey, FitResult};
pub use self::model_internals::{ModelDensity, ParamEstimate, ThetaLayout, TrialData};
