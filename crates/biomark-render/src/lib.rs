//! # biomark-render — Chart Rendering
//!
//! Deterministic SVG rendering for the chart action groups: grouped bar
//! charts and stepped survival curves with confidence bands. Pure string
//! building; the caller decides where the bytes go.

pub mod bar;
pub mod survival;
mod svg;

pub use bar::BarChart;
pub use survival::{StepPoint, StepSeries, SurvivalPlot};

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("chart has no data to draw")]
    Empty,
    #[error("{left} has {left_len} entries but {right} has {right_len}")]
    Mismatch {
        left: &'static str,
        left_len: usize,
        right: &'static str,
        right_len: usize,
    },
}
