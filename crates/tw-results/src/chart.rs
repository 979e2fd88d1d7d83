//! Minimal SVG line and scatter charts.

use crate::ResultsResult;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

const WIDTH: f64 = 800.0;
const HEIGHT: f64 = 500.0;
const MARGIN: f64 = 60.0;
const PALETTE: [&str; 8] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    pub label: String,
    pub points: Vec<(f64, f64)>,
    /// Per-point marker colors; when empty the series gets a palette color.
    pub colors: Vec<String>,
}

impl Series {
    pub fn new(label: impl Into<String>, points: Vec<(f64, f64)>) -> Self {
        Self {
            label: label.into(),
            points,
            colors: Vec::new(),
        }
    }

    pub fn from_columns(label: impl Into<String>, x: &[f64], y: &[f64]) -> Self {
        Self::new(label, x.iter().copied().zip(y.iter().copied()).collect())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Chart {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub series: Vec<Series>,
    pub log_y: bool,
    /// Draw markers instead of connecting lines.
    pub markers: bool,
}

struct Frame {
    x: (f64, f64),
    y: (f64, f64),
    log_y: bool,
}

impl Frame {
    fn y_value(&self, y: f64) -> Option<f64> {
        if self.log_y {
            (y > 0.0).then(|| y.log10())
        } else {
            Some(y)
        }
    }

    fn map(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        let y = self.y_value(y)?;
        let span = |(lo, hi): (f64, f64)| if hi > lo { hi - lo } else { 1.0 };
        let px = MARGIN + (x - self.x.0) / span(self.x) * (WIDTH - 2.0 * MARGIN);
        let py = HEIGHT - MARGIN - (y - self.y.0) / span(self.y) * (HEIGHT - 2.0 * MARGIN);
        Some((px, py))
    }
}

fn bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<(f64, f64)>, v| {
            Some(acc.map_or((v, v), |(lo, hi)| (lo.min(v), hi.max(v))))
        })
        .unwrap_or((0.0, 1.0))
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

impl Chart {
    pub fn new(title: impl Into<String>, x_label: impl Into<String>, y_label: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            x_label: x_label.into(),
            y_label: y_label.into(),
            ..Self::default()
        }
    }

    pub fn with_series(mut self, series: Series) -> Self {
        self.series.push(series);
        self
    }

    fn frame(&self) -> Frame {
        let points = || self.series.iter().flat_map(|s| s.points.iter());
        let frame = Frame {
            x: bounds(points().map(|p| p.0)),
            y: (0.0, 1.0),
            log_y: self.log_y,
        };
        let y = bounds(points().filter_map(|p| frame.y_value(p.1)));
        Frame { y, ..frame }
    }

    pub fn render(&self) -> String {
        let frame = self.frame();
        let mut svg = String::new();
        let _ = writeln!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{HEIGHT}" viewBox="0 0 {WIDTH} {HEIGHT}">"#
        );
        let _ = writeln!(svg, r#"<rect width="100%" height="100%" fill="white"/>"#);
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="{}" text-anchor="middle" font-size="16">{}</text>"#,
            WIDTH / 2.0,
            MARGIN / 2.0,
            escape(&self.title)
        );
        let (x0, y0, x1, y1) = (MARGIN, HEIGHT - MARGIN, WIDTH - MARGIN, MARGIN);
        let _ = writeln!(
            svg,
            r#"<path d="M{x0},{y1} L{x0},{y0} L{x1},{y0}" fill="none" stroke="black"/>"#
        );
        let y_axis = if self.log_y {
            format!("log10({})", self.y_label)
        } else {
            self.y_label.clone()
        };
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="{}" text-anchor="middle" font-size="12">{}</text>"#,
            WIDTH / 2.0,
            HEIGHT - MARGIN / 4.0,
            escape(&self.x_label)
        );
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="{}" text-anchor="middle" font-size="12" transform="rotate(-90 {} {})">{}</text>"#,
            MARGIN / 3.0,
            HEIGHT / 2.0,
            MARGIN / 3.0,
            HEIGHT / 2.0,
            escape(&y_axis)
        );
        for (label, value, anchor_y) in [("min", frame.y.0, y0), ("max", frame.y.1, y1)] {
            let _ = writeln!(
                svg,
                r#"<text x="{}" y="{anchor_y}" text-anchor="end" font-size="10" class="{label}">{value:.4e}</text>"#,
                x0 - 4.0
            );
        }

        for (index, series) in self.series.iter().enumerate() {
            let color = PALETTE[index % PALETTE.len()];
            let mapped: Vec<(usize, (f64, f64))> = series
                .points
                .iter()
                .enumerate()
                .filter_map(|(i, (x, y))| frame.map(*x, *y).map(|p| (i, p)))
                .collect();
            if self.markers {
                for (i, (px, py)) in &mapped {
                    let fill = series.colors.get(*i).map(String::as_str).unwrap_or(color);
                    let _ = writeln!(
                        svg,
                        r#"<circle cx="{px:.2}" cy="{py:.2}" r="5" fill="{fill}" stroke="black"/>"#
                    );
                }
            } else if !mapped.is_empty() {
                let path: Vec<String> = mapped
                    .iter()
                    .map(|(_, (px, py))| format!("{px:.2},{py:.2}"))
                    .collect();
                let _ = writeln!(
                    svg,
                    r#"<polyline points="{}" fill="none" stroke="{color}" stroke-width="1.5"/>"#,
                    path.join(" ")
                );
            }
            let _ = writeln!(
                svg,
                r#"<text x="{}" y="{}" font-size="11" fill="{color}">{}</text>"#,
                x1 - 150.0,
                y1 + 14.0 * (index as f64 + 1.0),
                escape(&series.label)
            );
        }
        svg.push_str("</svg>\n");
        svg
    }

    pub fn write(&self, path: &Path) -> ResultsResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.render())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_chart_has_one_polyline_per_series() {
        let chart = Chart::new("rep-mp-prt", "Iteration", "value")
            .with_series(Series::new("a", vec![(1.0, 1.0), (2.0, 2.0)]))
            .with_series(Series::new("b", vec![(1.0, 3.0), (2.0, 1.0)]));
        let svg = chart.render();
        assert_eq!(svg.matches("<polyline").count(), 2);
        assert!(svg.starts_with("<svg"));
    }

    #[test]
    fn markers_take_point_colors() {
        let mut series = Series::new("map", vec![(1.0, 1.0), (2.0, 2.0)]);
        series.colors = vec!["green".into(), "red".into()];
        let chart = Chart {
            markers: true,
            ..Chart::new("map", "x", "y").with_series(series)
        };
        let svg = chart.render();
        assert!(svg.contains(r#"fill="green""#));
        assert!(svg.contains(r#"fill="red""#));
    }

    #[test]
    fn log_axis_skips_non_positive_values() {
        let chart = Chart {
            log_y: true,
            ..Chart::new("res", "Iteration", "residual")
                .with_series(Series::new("continuity", vec![(1.0, 0.0), (2.0, 1e-3), (3.0, 1e-4)]))
        };
        let svg = chart.render();
        let polyline = svg.lines().find(|l| l.starts_with("<polyline")).unwrap();
        assert_eq!(polyline.matches(',').count(), 2);
    }
}
