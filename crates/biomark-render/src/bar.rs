//! Bar chart rendering.

use crate::RenderError;
use crate::svg::{LinearScale, escape, tick_label};

const WIDTH: f64 = 800.0;
const HEIGHT: f64 = 500.0;
const MARGIN_LEFT: f64 = 70.0;
const MARGIN_RIGHT: f64 = 30.0;
const MARGIN_TOP: f64 = 50.0;
const MARGIN_BOTTOM: f64 = 70.0;
const BAR_FILL: &str = "#2a6fb0";
const Y_TICKS: usize = 5;

/// A single-series bar chart.
#[derive(Debug, Clone, PartialEq)]
pub struct BarChart {
    pub title: String,
    pub x_labels: Vec<String>,
    pub values: Vec<f64>,
    pub x_axis_label: String,
    pub y_axis_label: String,
}

impl BarChart {
    pub fn render_svg(&self) -> Result<String, RenderError> {
        if self.values.is_empty() {
            return Err(RenderError::Empty);
        }
        if self.x_labels.len() != self.values.len() {
            return Err(RenderError::Mismatch {
                left: "x_values",
                left_len: self.x_labels.len(),
                right: "y_values",
                right_len: self.values.len(),
            });
        }

        let plot_width = WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
        let plot_height = HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;

        let max_value = self.values.iter().copied().fold(0.0_f64, f64::max);
        let min_value = self.values.iter().copied().fold(0.0_f64, f64::min);
        let y_top = if max_value > 0.0 { max_value * 1.05 } else { 1.0 };
        let y_bottom = min_value.min(0.0);
        let y_scale = LinearScale::new(
            (y_bottom, y_top),
            (HEIGHT - MARGIN_BOTTOM, MARGIN_TOP),
        );

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

        // Y axis with tick lines and labels.
        for tick in 0..=Y_TICKS {
            let value = y_bottom + (y_top - y_bottom) * tick as f64 / Y_TICKS as f64;
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

        // Bars and their category labels.
        let slot = plot_width / self.values.len() as f64;
        let bar_width = slot * 0.8;
        let zero_y = y_scale.apply(0.0_f64.clamp(y_bottom, y_top));
        for (index, (label, value)) in self.x_labels.iter().zip(&self.values).enumerate() {
            let x = MARGIN_LEFT + slot * index as f64 + (slot - bar_width) / 2.0;
            let value_y = y_scale.apply(*value);
            let (bar_y, bar_height) = if value_y <= zero_y {
                (value_y, zero_y - value_y)
            } else {
                (zero_y, value_y - zero_y)
            };
            out.push_str(&format!(
                "  <rect x=\"{x:.1}\" y=\"{bar_y:.1}\" width=\"{bar_width:.1}\" \
                 height=\"{bar_height:.1}\" fill=\"{BAR_FILL}\"/>\n"
            ));
            out.push_str(&format!(
                "  <text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"middle\" font-size=\"12\" \
                 font-family=\"sans-serif\">{}</text>\n",
                x + bar_width / 2.0,
                HEIGHT - MARGIN_BOTTOM + 18.0,
                escape(label)
            ));
        }

        // Axis lines and axis titles.
        out.push_str(&format!(
            "  <line x1=\"{MARGIN_LEFT}\" y1=\"{MARGIN_TOP}\" x2=\"{MARGIN_LEFT}\" \
             y2=\"{:.1}\" stroke=\"black\"/>\n",
            HEIGHT - MARGIN_BOTTOM
        ));
        out.push_str(&format!(
            "  <line x1=\"{MARGIN_LEFT}\" y1=\"{:.1}\" x2=\"{:.1}\" y2=\"{:.1}\" \
             stroke=\"black\"/>\n",
            HEIGHT - MARGIN_BOTTOM,
            WIDTH - MARGIN_RIGHT,
            HEIGHT - MARGIN_BOTTOM
        ));
        out.push_str(&format!(
            "  <text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"middle\" font-size=\"14\" \
             font-family=\"sans-serif\">{}</text>\n",
            MARGIN_LEFT + plot_width / 2.0,
            HEIGHT - 20.0,
            escape(&self.x_axis_label)
        ));
        out.push_str(&format!(
            "  <text x=\"20\" y=\"{:.1}\" text-anchor=\"middle\" font-size=\"14\" \
             font-family=\"sans-serif\" transform=\"rotate(-90 20 {:.1})\">{}</text>\n",
            MARGIN_TOP + plot_height / 2.0,
            MARGIN_TOP + plot_height / 2.0,
            escape(&self.y_axis_label)
        ));

        out.push_str("</svg>\n");
        Ok(out)
    }
}
