mod common;

mod metrics_tests;
mod model_tests;
