pub mod forecast;

pub use forecast::{ForecastEngine, ModelReport};
