//! Stepped survival plots with confidence bands.

use crate::RenderError;
use crate::svg::{LinearScale, escape, tick_label};

const WIDTH: f64 = 800.0;
const HEIGHT: f64 = 520.0;
const MARGIN_LEFT: f64 = 70.0;
const MARGIN_RIGHT: f64 = 40.0;
const MARGIN_TOP: f64 = 50.0;
const MARGIN_BOTTOM: f64 = 60.0;
const Y_TICKS: usize = 5;

/// Default line/band colors for the first two series, matching the usual
/// baseline-vs-condition presentation.
pub const DEFAULT_PALETTE: [(&str, &str); 2] = [
    ("rgb(0,0,255)", "rgba(0,0,255,0.2)"),
    ("rgb(255,140,0)", "rgba(255,140,0,0.2)"),
];

/// One point of a survival step function with its confidence interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepPoint {
    pub time: f64,
    pub value: f64,
    pub lower: f64,
    pub upper: f64,
}

/// One survival curve.
#[derive(Debug, Clone, PartialEq)]
pub struct StepSeries {
    pub label: String,
    pub line_color: String,
    pub band_color: String,
    pub points: Vec<StepPoint>,
}

impl StepSeries {
    /// Series colored by position, using the default palette.
    pub fn indexed(label: impl Into<String>, index: usize, points: Vec<StepPoint>) -> Self {
        let (line, band) = DEFAULT_PALETTE[index % DEFAULT_PALETTE.len()];
        Self {
            label: label.into(),
            line_color: line.to_owned(),
            band_color: band.to_owned(),
            points,
        }
    }
}

/// A comparison plot of one or more survival curves on a common time axis.
#[derive(Debug, Clone, PartialEq)]
pub struct SurvivalPlot {
    pub title: String,
    pub x_axis_label: String,
    pub y_axis_label: String,
    pub series: Vec<StepSeries>,
}

impl SurvivalPlot {
    pub fn render_svg(&self) -> Result<String, RenderError> {
        if self.series.is_empty() || self.series.iter().all(|s| s.points.is_empty()) {
            return Err(RenderError::Empty);
        }

        let max_time = self
            .series
            .iter()
            .flat_map(|series| series.points.iter())
            .map(|point| point.time)
            .fold(0.0_f64, f64::max);
        let x_scale = LinearScale::new(
            (0.0, if max_time > 0.0 { max_time * 1.05 } else { 1.0 }),
            (MARGIN_LEFT, WIDTH - MARGIN_RIGHT),
        );
        let y_scale = LinearScale::new((0.0, 1.0), (HEIGHT - MARGIN_BOTTOM, MARGIN_TOP));

        let mut out = String::new();
        out.push_str(&format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{WIDTH}\" height=\"{HEIGHT}\" \
             viewBox=\"0 0 {WIDTH} {HEIGHT}\">\n"
        ));
        out.push_str(&format!(
            "  <rect width=\"{WIDTH}\" height=\"{HEIGHT}\" fill=\"white\"/>\n"
        ));
        out.push_str(&format!(
            "  <text x=\"{:.1}\" y=\"28\" text-anchor=\"middle\" font-size=\"18\" \
             font-family=\"sans-serif\">{}</text>\n",
            WIDTH / 2.0,
            escape(&self.title)
        ));

        for tick in 0..=Y_TICKS {
            let value = tick as f64 / Y_TICKS as f64;
            let y = y_scale.apply(value);
            out.push_str(&format!(
                "  <line x1=\"{MARGIN_LEFT}\" y1=\"{y:.1}\" x2=\"{:.1}\" y2=\"{y:.1}\" \
                 stroke=\"#dddddd\"/>\n",
                WIDTH - MARGIN_RIGHT
            ));
            out.push_str(&format!(
                "  <text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"end\" font-size=\"12\" \
                 font-family=\"sans-serif\">{}</text>\n",
                MARGIN_LEFT - 8.0,
                y + 4.0,
                tick_label(value)
            ));
        }

        for series in &self.series {
            if series.points.is_empty() {
                continue;
            }
            out.push_str(&band_path(series, &x_scale, &y_scale));
            out.push_str(&line_path(series, &x_scale, &y_scale));
        }

        // Legend in the upper right, one row per series.
        for (index, series) in self.series.iter().enumerate() {
            let y = MARGIN_TOP + 16.0 + 20.0 * index as f64;
            let x = WIDTH - MARGIN_RIGHT - 150.0;
            out.push_str(&format!(
                "  <line x1=\"{x:.1}\" y1=\"{y:.1}\" x2=\"{:.1}\" y2=\"{y:.1}\" \
                 stroke=\"{}\" stroke-width=\"2\"/>\n",
                x + 24.0,
                series.line_color
            ));
            out.push_str(&format!(
                "  <text x=\"{:.1}\" y=\"{:.1}\" font-size=\"12\" \
                 font-family=\"sans-serif\">{}</text>\n",
                x + 30.0,
                y + 4.0,
                escape(&series.label)
            ));
        }

        out.push_str(&format!(
            "  <text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"middle\" font-size=\"14\" \
             font-family=\"sans-serif\">{}</text>\n",
            MARGIN_LEFT + (WIDTH - MARGIN_LEFT - MARGIN_RIGHT) / 2.0,
            HEIGHT - 16.0,
            escape(&self.x_axis_label)
        ));
        out.push_str(&format!(
            "  <text x=\"20\" y=\"{:.1}\" text-anchor=\"middle\" font-size=\"14\" \
             font-family=\"sans-serif\" transform=\"rotate(-90 20 {:.1})\">{}</text>\n",
            HEIGHT / 2.0,
            HEIGHT / 2.0,
            escape(&self.y_axis_label)
        ));

        out.push_str("</svg>\n");
        Ok(out)
    }
}

/// Stepped polyline through the survival estimates.
fn line_path(series: &StepSeries, x_scale: &LinearScale, y_scale: &LinearScale) -> String {
    let mut d = String::new();
    for (index, point) in series.points.iter().enumerate() {
        let x = x_scale.apply(point.time);
        let y = y_scale.apply(point.value.clamp(0.0, 1.0));
        if index == 0 {
            d.push_str(&format!("M {x:.1} {y:.1}"));
        } else {
            // Horizontal-then-vertical: survival stays flat until the next
            // event time.
            d.push_str(&format!(" H {x:.1} V {y:.1}"));
        }
    }
    format!(
        "  <path d=\"{d}\" fill=\"none\" stroke=\"{}\" stroke-width=\"2\"/>\n",
        series.line_color
    )
}

/// Closed region between the stepped upper and lower confidence bounds.
fn band_path(series: &StepSeries, x_scale: &LinearScale, y_scale: &LinearScale) -> String {
    let mut d = String::new();
    for (index, point) in series.points.iter().enumerate() {
        let x = x_scale.apply(point.time);
        let y = y_scale.apply(point.upper.clamp(0.0, 1.0));
        if index == 0 {
            d.push_str(&format!("M {x:.1} {y:.1}"));
        } else {
            d.push_str(&format!(" H {x:.1} V {y:.1}"));
        }
    }
    for point in series.points.iter().rev() {
        let x = x_scale.apply(point.time);
        let y = y_scale.apply(point.lower.clamp(0.0, 1.0));
        d.push_str(&format!(" H {x:.1} V {y:.1}"));
    }
    d.push_str(" Z");
    format!(
        "  <path d=\"{d}\" fill=\"{}\" stroke=\"none\"/>\n",
        series.band_color
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points() -> Vec<StepPoint> {
        vec![
            StepPoint {
                time: 0.0,
                value: 1.0,
                lower: 1.0,
                upper: 1.0,
            },
            StepPoint {
                time: 4.0,
                value: 0.75,
                lower: 0.55,
                upper: 0.95,
            },
            StepPoint {
                time: 9.0,
                value: 0.5,
                lower: 0.3,
                upper: 0.7,
            },
        ]
    }

    fn plot() -> SurvivalPlot {
        SurvivalPlot {
            title: "EGFR expression".to_owned(),
            x_axis_label: "Months".to_owned(),
            y_axis_label: "Survival probability".to_owned(),
            series: vec![
                StepSeries::indexed("<=10", 0, points()),
                StepSeries::indexed(">10", 1, points()),
            ],
        }
    }

    #[test]
    fn renders_line_and_band_per_series() {
        let svg = plot().render_svg().unwrap();
        assert_eq!(svg.matches("<path").count(), 4);
        assert!(svg.contains("rgb(0,0,255)"));
        assert!(svg.contains("rgb(255,140,0)"));
        // Legend labels are escaped.
        assert!(svg.contains("&lt;=10"));
        assert!(svg.contains("&gt;10"));
    }

    #[test]
    fn steps_are_horizontal_then_vertical() {
        let svg = plot().render_svg().unwrap();
        assert!(svg.contains(" H "));
        assert!(svg.contains(" V "));
    }

    #[test]
    fn empty_plot_is_rejected() {
        let plot = SurvivalPlot {
            title: String::new(),
            x_axis_label: String::new(),
            y_axis_label: String::new(),
            series: vec![],
        };
        assert_eq!(plot.render_svg().unwrap_err(), RenderError::Empty);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let mut plot = plot();
        plot.series[0].points[1].upper = 1.4;
        plot.series[0].points[1].lower = -0.2;
        let svg = plot.render_svg().unwrap();
        // Clamping keeps every coordinate inside the viewport; an unclamped
        // upper bound of 1.4 would put the band above y=0.
        assert!(!svg.contains(" -"));
    }
}
