pub mod bootstrap;
pub mod convolution;
pub mod data;
pub mod error;
pub mod fit;
pub mod model;

pub use crate::bootstrap::{BootstrapOptions, BootstrapResult, Estimates, IntervalMethod};
pub use crate::convolution::{
    convolve_with_exponential, running_integral, ConvolutionError, ConvolutionMethod,
};
pub use crate::data::DataError;
pub use crate::fit::{akaike, FitOptions, FitReport};
pub use crate::model::{
    Bounds, Compartmental, Model, OneCompartment, ParameterReport, PhysiologicalParameters,
    TwoCompartmentExchange, TwoCompartmentUptake,
};
pub use error::CompartmentError;

pub mod prelude {
    pub mod data {
        pub use crate::data::{
            read_columns, subtract_baseline, synthetic, validate, write_columns, Columns,
        };
    }
    pub mod models {
        pub use crate::model::{OneCompartment, TwoCompartmentExchange, TwoCompartmentUptake};
    }

    pub use crate::bootstrap::{BootstrapOptions, BootstrapResult, IntervalMethod};
    pub use crate::convolution::ConvolutionMethod;
    pub use crate::fit::FitOptions;
    pub use crate::model::*;
    pub use crate::CompartmentError;

    /// Build [`PhysiologicalParameters`](crate::model::PhysiologicalParameters) from
    /// `name => value` pairs.
    ///
    /// ```rust
    /// use perfusion::parameters;
    ///
    /// let start = parameters! { "F" => 51.0, "v" => 11.2 };
    /// assert_eq!(start.get("v"), Some(11.2));
    /// ```
    #[macro_export]
    macro_rules! parameters {
        ($($k:expr => $v:expr),* $(,)?) => {{
            <$crate::model::PhysiologicalParameters as core::iter::FromIterator<(&str, f64)>>::from_iter(
                [$(($k, $v),)*]
            )
        }};
    }
}
