//! SVG chart rendering
//!
//! Charts are rendered straight to SVG text with a fixed canvas and a
//! small palette, then wrapped as base64 data URIs for JSON responses.

use base64::Engine as _;
use std::fmt::Write as _;
use txdata_common::frame::html_escape;

use crate::stats;

const WIDTH: f64 = 720.0;
const HEIGHT: f64 = 480.0;
const MARGIN_LEFT: f64 = 80.0;
const MARGIN_RIGHT: f64 = 30.0;
const MARGIN_BOTTOM: f64 = 70.0;
const TITLE_WRAP: usize = 60;
const TITLE_LINE_HEIGHT: f64 = 20.0;

const PALETTE: [&str; 10] = [
    "#4c72b0", "#dd8452", "#55a868", "#c44e52", "#8172b3", "#937860", "#da8bc3", "#8c8c8c",
    "#ccb974", "#64b5cd",
];

/// Bar orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Horizontal,
    Vertical,
}

/// Wrap a title into lines of at most `width` characters on word boundaries
pub fn wrap_title(title: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in title.split_whitespace() {
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// `data:image/svg+xml;base64,...`
pub fn to_data_uri(svg: &str) -> String {
    format!(
        "data:image/svg+xml;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(svg)
    )
}

fn color(i: usize) -> &'static str {
    PALETTE[i % PALETTE.len()]
}

fn fmt_tick(v: f64) -> String {
    if v.abs() >= 1000.0 || (v.fract() == 0.0 && v.abs() < 1e15) {
        format!("{:.0}", v)
    } else if v.abs() >= 1.0 {
        format!("{:.1}", v)
    } else {
        format!("{:.2}", v)
    }
}

/// Plot-area rectangle and the SVG text being built
struct Canvas {
    svg: String,
    top: f64,
    left: f64,
    right: f64,
    bottom: f64,
}

impl Canvas {
    fn new(title: &str) -> Self {
        let lines = wrap_title(title, TITLE_WRAP);
        let mut svg = String::new();
        let _ = write!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" font-family="sans-serif" font-size="12">"#,
            w = WIDTH,
            h = HEIGHT
        );
        svg.push_str(r#"<rect width="100%" height="100%" fill="white"/>"#);
        for (i, line) in lines.iter().enumerate() {
            let _ = write!(
                svg,
                r#"<text x="{}" y="{}" text-anchor="middle" font-size="15" font-weight="bold">{}</text>"#,
                WIDTH / 2.0,
                24.0 + i as f64 * TITLE_LINE_HEIGHT,
                html_escape(line)
            );
        }
        let top = 30.0 + lines.len().max(1) as f64 * TITLE_LINE_HEIGHT;
        Self {
            svg,
            top,
            left: MARGIN_LEFT,
            right: WIDTH - MARGIN_RIGHT,
            bottom: HEIGHT - MARGIN_BOTTOM,
        }
    }

    fn width(&self) -> f64 {
        self.right - self.left
    }

    fn height(&self) -> f64 {
        self.bottom - self.top
    }

    fn text(&mut self, x: f64, y: f64, anchor: &str, content: &str) {
        let _ = write!(
            self.svg,
            r#"<text x="{:.1}" y="{:.1}" text-anchor="{}">{}</text>"#,
            x,
            y,
            anchor,
            html_escape(content)
        );
    }

    fn rect(&mut self, x: f64, y: f64, w: f64, h: f64, fill: &str) {
        let _ = write!(
            self.svg,
            r#"<rect x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" fill="{}" stroke="white" stroke-width="0.5"/>"#,
            x,
            y,
            w.max(0.0),
            h.max(0.0),
            fill
        );
    }

    fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, stroke: &str, width: f64) {
        let _ = write!(
            self.svg,
            r#"<line x1="{:.1}" y1="{:.1}" x2="{:.1}" y2="{:.1}" stroke="{}" stroke-width="{}"/>"#,
            x1, y1, x2, y2, stroke, width
        );
    }

    fn polyline(&mut self, points: &[(f64, f64)], stroke: &str) {
        let pts: Vec<String> = points.iter().map(|(x, y)| format!("{:.1},{:.1}", x, y)).collect();
        let _ = write!(
            self.svg,
            r#"<polyline points="{}" fill="none" stroke="{}" stroke-width="2"/>"#,
            pts.join(" "),
            stroke
        );
    }

    fn axes(&mut self, x_label: &str, y_label: &str) {
        let (l, r, t, b) = (self.left, self.right, self.top, self.bottom);
        self.line(l, b, r, b, "#333", 1.0);
        self.line(l, t, l, b, "#333", 1.0);
        if !x_label.is_empty() {
            self.text((l + r) / 2.0, HEIGHT - 20.0, "middle", x_label);
        }
        if !y_label.is_empty() {
            let _ = write!(
                self.svg,
                r#"<text x="20" y="{:.1}" text-anchor="middle" transform="rotate(-90 20 {:.1})">{}</text>"#,
                (t + b) / 2.0,
                (t + b) / 2.0,
                html_escape(y_label)
            );
        }
    }

    fn y_ticks(&mut self, scale: &Scale) {
        for v in scale.ticks(5) {
            let y = self.bottom - scale.frac(v) * self.height();
            self.line(self.left - 4.0, y, self.left, y, "#333", 1.0);
            self.text(self.left - 8.0, y + 4.0, "end", &fmt_tick(v));
        }
    }

    fn x_ticks(&mut self, scale: &Scale) {
        for v in scale.ticks(6) {
            let x = self.left + scale.frac(v) * self.width();
            self.line(x, self.bottom, x, self.bottom + 4.0, "#333", 1.0);
            self.text(x, self.bottom + 18.0, "middle", &fmt_tick(v));
        }
    }

    fn legend(&mut self, labels: &[String]) {
        for (i, label) in labels.iter().enumerate() {
            let y = self.top + 10.0 + i as f64 * 18.0;
            self.rect(self.right - 150.0, y - 10.0, 12.0, 12.0, color(i));
            self.text(self.right - 132.0, y, "start", label);
        }
    }

    fn finish(mut self) -> String {
        self.svg.push_str("</svg>");
        self.svg
    }
}

/// Linear value range mapped to [0, 1]
struct Scale {
    min: f64,
    max: f64,
}

impl Scale {
    fn new(min: f64, max: f64) -> Self {
        if !min.is_finite() || !max.is_finite() {
            return Self { min: 0.0, max: 1.0 };
        }
        if (max - min).abs() < f64::EPSILON {
            Self {
                min: min - 0.5,
                max: max + 0.5,
            }
        } else {
            Self { min, max }
        }
    }

    fn from_values<'a>(values: impl IntoIterator<Item = &'a f64>) -> Self {
        let (lo, hi) = values
            .into_iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
        Self::new(lo, hi)
    }

    /// Extend the top by 5% so the largest mark does not touch the frame
    fn padded(self) -> Self {
        let pad = (self.max - self.min) * 0.05;
        Self {
            min: self.min,
            max: self.max + pad,
        }
    }

    fn frac(&self, v: f64) -> f64 {
        ((v - self.min) / (self.max - self.min)).clamp(0.0, 1.0)
    }

    fn ticks(&self, n: usize) -> Vec<f64> {
        stats::linspace(self.min, self.max, n)
    }
}

/// Histogram with an optional KDE curve scaled to counts
pub fn histogram(values: &[f64], bins: usize, title: &str, x_label: &str) -> String {
    let mut canvas = Canvas::new(title);
    let bins = bins.max(1);
    let x_scale = Scale::from_values(values);
    let width = (x_scale.max - x_scale.min) / bins as f64;

    let mut counts = vec![0usize; bins];
    for v in values {
        let idx = (((v - x_scale.min) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }
    let max_count = counts.iter().copied().max().unwrap_or(0) as f64;
    let y_scale = Scale::new(0.0, max_count.max(1.0)).padded();

    let bar_w = canvas.width() / bins as f64;
    for (i, count) in counts.iter().enumerate() {
        let h = y_scale.frac(*count as f64) * canvas.height();
        let x = canvas.left + i as f64 * bar_w;
        let y = canvas.bottom - h;
        canvas.rect(x, y, bar_w, h, color(0));
    }

    let grid = stats::linspace(x_scale.min, x_scale.max, 100);
    if let Some(density) = stats::kde(values, &grid) {
        let scale_to_counts = values.len() as f64 * width;
        let points: Vec<(f64, f64)> = grid
            .iter()
            .zip(&density)
            .map(|(x, d)| {
                (
                    canvas.left + x_scale.frac(*x) * canvas.width(),
                    canvas.bottom - y_scale.frac(d * scale_to_counts) * canvas.height(),
                )
            })
            .collect();
        canvas.polyline(&points, color(3));
    }

    canvas.x_ticks(&x_scale);
    canvas.y_ticks(&y_scale);
    canvas.axes(x_label, "Frequency");
    canvas.finish()
}

/// Bar chart of labelled values
pub fn bar_chart(
    labels: &[String],
    values: &[f64],
    orientation: Orientation,
    title: &str,
    x_label: &str,
    y_label: &str,
) -> String {
    let mut canvas = Canvas::new(title);
    let max = values.iter().copied().fold(0.0, f64::max);
    let scale = Scale::new(0.0, if max > 0.0 { max } else { 1.0 }).padded();
    let n = labels.len().max(1) as f64;

    match orientation {
        Orientation::Vertical => {
            let slot = canvas.width() / n;
            for (i, (label, v)) in labels.iter().zip(values).enumerate() {
                let h = scale.frac(*v) * canvas.height();
                let x = canvas.left + i as f64 * slot + slot * 0.1;
                canvas.rect(x, canvas.bottom - h, slot * 0.8, h, color(i));
                canvas.text(x + slot * 0.4, canvas.bottom - h - 4.0, "middle", &fmt_tick(*v));
                canvas.text(x + slot * 0.4, canvas.bottom + 16.0, "middle", label);
            }
            canvas.y_ticks(&scale);
            canvas.axes(x_label, y_label);
        }
        Orientation::Horizontal => {
            let slot = canvas.height() / n;
            canvas.left = 180.0;
            for (i, (label, v)) in labels.iter().zip(values).enumerate() {
                let w = scale.frac(*v) * canvas.width();
                let y = canvas.top + i as f64 * slot + slot * 0.1;
                canvas.rect(canvas.left, y, w, slot * 0.8, color(i));
                canvas.text(canvas.left + w + 4.0, y + slot * 0.4 + 4.0, "start", &fmt_tick(*v));
                canvas.text(canvas.left - 6.0, y + slot * 0.4 + 4.0, "end", label);
            }
            canvas.x_ticks(&scale);
            canvas.axes(y_label, x_label);
        }
    }
    canvas.finish()
}

/// Pie (or donut) chart with percentage labels
pub fn pie_chart(labels: &[String], values: &[f64], donut: bool, title: &str) -> String {
    let mut canvas = Canvas::new(title);
    let total: f64 = values.iter().filter(|v| **v > 0.0).sum();
    let cx = WIDTH / 2.0 - 80.0;
    let cy = (canvas.top + canvas.bottom) / 2.0 + 20.0;
    let radius = (canvas.height() / 2.0).min(170.0);

    if total > 0.0 {
        let mut angle = -std::f64::consts::FRAC_PI_2;
        for (i, v) in values.iter().enumerate() {
            if *v <= 0.0 {
                continue;
            }
            let share = v / total;
            let sweep = share * std::f64::consts::TAU;
            let end = angle + sweep;
            if share >= 0.9999 {
                let _ = write!(
                    canvas.svg,
                    r#"<circle cx="{:.1}" cy="{:.1}" r="{:.1}" fill="{}"/>"#,
                    cx,
                    cy,
                    radius,
                    color(i)
                );
            } else {
                let (x1, y1) = (cx + radius * angle.cos(), cy + radius * angle.sin());
                let (x2, y2) = (cx + radius * end.cos(), cy + radius * end.sin());
                let large = if sweep > std::f64::consts::PI { 1 } else { 0 };
                let _ = write!(
                    canvas.svg,
                    r#"<path d="M{:.1},{:.1} L{:.1},{:.1} A{:.1},{:.1} 0 {} 1 {:.1},{:.1} Z" fill="{}" stroke="white"/>"#,
                    cx, cy, x1, y1, radius, radius, large, x2, y2, color(i)
                );
            }
            let mid = angle + sweep / 2.0;
            let label_r = if donut { radius * 0.85 } else { radius * 0.65 };
            canvas.text(
                cx + label_r * mid.cos(),
                cy + label_r * mid.sin() + 4.0,
                "middle",
                &format!("{:.1}%", share * 100.0),
            );
            angle = end;
        }
        if donut {
            let _ = write!(
                canvas.svg,
                r#"<circle cx="{:.1}" cy="{:.1}" r="{:.1}" fill="white"/>"#,
                cx,
                cy,
                radius * 0.55
            );
        }
    }

    canvas.legend(labels);
    canvas.finish()
}

/// Box plot per group (whiskers at 1.5 IQR)
pub fn boxplot(groups: &[(String, Vec<f64>)], title: &str, x_label: &str, y_label: &str) -> String {
    let mut canvas = Canvas::new(title);
    let scale = Scale::from_values(groups.iter().flat_map(|(_, v)| v.iter()));
    let slot = canvas.width() / groups.len().max(1) as f64;
    let to_y = |c: &Canvas, v: f64| c.bottom - scale.frac(v) * c.height();

    for (i, (label, values)) in groups.iter().enumerate() {
        let x_mid = canvas.left + (i as f64 + 0.5) * slot;
        canvas.text(x_mid, canvas.bottom + 16.0, "middle", label);
        let (Some(q1), Some(q2), Some(q3)) = (
            stats::quantile(values, 0.25),
            stats::quantile(values, 0.5),
            stats::quantile(values, 0.75),
        ) else {
            continue;
        };
        let iqr = q3 - q1;
        let lo = values
            .iter()
            .copied()
            .filter(|v| *v >= q1 - 1.5 * iqr)
            .fold(f64::INFINITY, f64::min);
        let hi = values
            .iter()
            .copied()
            .filter(|v| *v <= q3 + 1.5 * iqr)
            .fold(f64::NEG_INFINITY, f64::max);
        let half = slot * 0.25;

        let (y_lo, y_hi) = (to_y(&canvas, lo), to_y(&canvas, hi));
        let (y_q1, y_q2, y_q3) = (to_y(&canvas, q1), to_y(&canvas, q2), to_y(&canvas, q3));
        canvas.line(x_mid, y_lo, x_mid, y_q1, "#333", 1.0);
        canvas.line(x_mid, y_q3, x_mid, y_hi, "#333", 1.0);
        canvas.line(x_mid - half / 2.0, y_lo, x_mid + half / 2.0, y_lo, "#333", 1.0);
        canvas.line(x_mid - half / 2.0, y_hi, x_mid + half / 2.0, y_hi, "#333", 1.0);
        canvas.rect(x_mid - half, y_q3, half * 2.0, y_q1 - y_q3, color(i));
        canvas.line(x_mid - half, y_q2, x_mid + half, y_q2, "#111", 2.0);

        for v in values.iter().filter(|v| **v < lo || **v > hi) {
            let cy = to_y(&canvas, *v);
            let _ = write!(
                canvas.svg,
                r##"<circle cx="{:.1}" cy="{:.1}" r="3" fill="none" stroke="#333"/>"##,
                x_mid,
                cy
            );
        }
    }

    canvas.y_ticks(&scale);
    canvas.axes(x_label, y_label);
    canvas.finish()
}

/// Scatter plot with an optional fitted line `(intercept, slope)`
pub fn scatter(
    x: &[f64],
    y: &[f64],
    fit: Option<(f64, f64)>,
    title: &str,
    x_label: &str,
    y_label: &str,
) -> String {
    let mut canvas = Canvas::new(title);
    let xs = Scale::from_values(x);
    let ys = Scale::from_values(y);

    for (a, b) in x.iter().zip(y) {
        let cx = canvas.left + xs.frac(*a) * canvas.width();
        let cy = canvas.bottom - ys.frac(*b) * canvas.height();
        let _ = write!(
            canvas.svg,
            r#"<circle cx="{:.1}" cy="{:.1}" r="3.5" fill="{}" fill-opacity="0.6"/>"#,
            cx,
            cy,
            color(0)
        );
    }

    if let Some((intercept, slope)) = fit {
        let points: Vec<(f64, f64)> = [xs.min, xs.max]
            .iter()
            .map(|xv| {
                (
                    canvas.left + xs.frac(*xv) * canvas.width(),
                    canvas.bottom - ys.frac(intercept + slope * xv) * canvas.height(),
                )
            })
            .collect();
        canvas.polyline(&points, color(3));
    }

    canvas.x_ticks(&xs);
    canvas.y_ticks(&ys);
    canvas.axes(x_label, y_label);
    canvas.finish()
}

/// Annotated heatmap; `values` is row-major and drives the colour
pub fn heatmap(
    row_labels: &[String],
    col_labels: &[String],
    values: &[Vec<f64>],
    annotations: &[Vec<String>],
    title: &str,
) -> String {
    let mut canvas = Canvas::new(title);
    canvas.left = 170.0;
    canvas.bottom = HEIGHT - 90.0;
    let scale = Scale::from_values(values.iter().flatten().filter(|v| v.is_finite()));
    let cell_w = canvas.width() / col_labels.len().max(1) as f64;
    let cell_h = canvas.height() / row_labels.len().max(1) as f64;

    for (i, row) in values.iter().enumerate() {
        for (j, v) in row.iter().enumerate() {
            let t = if v.is_finite() { scale.frac(*v) } else { 0.0 };
            // White to dark blue.
            let shade = |c: f64| (255.0 - t * (255.0 - c)).round() as u8;
            let fill = format!("#{:02x}{:02x}{:02x}", shade(33.0), shade(102.0), shade(172.0));
            let x = canvas.left + j as f64 * cell_w;
            let y = canvas.top + i as f64 * cell_h;
            canvas.rect(x, y, cell_w, cell_h, &fill);
            if let Some(label) = annotations.get(i).and_then(|r| r.get(j)) {
                let text_color = if t > 0.6 { "white" } else { "black" };
                let _ = write!(
                    canvas.svg,
                    r#"<text x="{:.1}" y="{:.1}" text-anchor="middle" fill="{}">{}</text>"#,
                    x + cell_w / 2.0,
                    y + cell_h / 2.0 + 4.0,
                    text_color,
                    html_escape(label)
                );
            }
        }
    }

    for (i, label) in row_labels.iter().enumerate() {
        let y = canvas.top + (i as f64 + 0.5) * cell_h + 4.0;
        canvas.text(canvas.left - 6.0, y, "end", label);
    }
    for (j, label) in col_labels.iter().enumerate() {
        let x = canvas.left + (j as f64 + 0.5) * cell_w;
        canvas.text(x, canvas.bottom + 16.0, "middle", label);
    }
    canvas.finish()
}

/// Overlaid KDE curves, one per named series
pub fn kde_comparison(series: &[(String, Vec<f64>)], title: &str, x_label: &str) -> String {
    let mut canvas = Canvas::new(title);
    let xs = Scale::from_values(series.iter().flat_map(|(_, v)| v.iter()));
    let spread = xs.max - xs.min;
    let grid = stats::linspace(xs.min - spread * 0.1, xs.max + spread * 0.1, 150);
    let x_scale = Scale::new(grid[0], grid[grid.len() - 1]);

    let curves: Vec<Option<Vec<f64>>> = series.iter().map(|(_, v)| stats::kde(v, &grid)).collect();
    let peak = curves
        .iter()
        .flatten()
        .flat_map(|c| c.iter())
        .copied()
        .fold(0.0, f64::max);
    let y_scale = Scale::new(0.0, if peak > 0.0 { peak } else { 1.0 }).padded();

    for (i, curve) in curves.iter().enumerate() {
        let Some(curve) = curve else {
            continue;
        };
        let points: Vec<(f64, f64)> = grid
            .iter()
            .zip(curve)
            .map(|(x, d)| {
                (
                    canvas.left + x_scale.frac(*x) * canvas.width(),
                    canvas.bottom - y_scale.frac(*d) * canvas.height(),
                )
            })
            .collect();
        canvas.polyline(&points, color(i));
    }

    let labels: Vec<String> = series.iter().map(|(name, _)| name.clone()).collect();
    canvas.legend(&labels);
    canvas.x_ticks(&x_scale);
    canvas.y_ticks(&y_scale);
    canvas.axes(x_label, "Density");
    canvas.finish()
}

/// Horizontal 100% stacked bars; `percents[item][category]`
pub fn stacked_percent_bars(
    items: &[String],
    categories: &[String],
    percents: &[Vec<f64>],
    title: &str,
) -> String {
    let mut canvas = Canvas::new(title);
    canvas.left = 170.0;
    canvas.right = WIDTH - 170.0;
    let slot = canvas.height() / items.len().max(1) as f64;

    for (i, item) in items.iter().enumerate() {
        let y = canvas.top + i as f64 * slot + slot * 0.15;
        let mut x = canvas.left;
        for (j, pct) in percents.get(i).map(Vec::as_slice).unwrap_or(&[]).iter().enumerate() {
            let w = pct / 100.0 * canvas.width();
            canvas.rect(x, y, w, slot * 0.7, color(j));
            if *pct >= 5.0 {
                canvas.text(x + w / 2.0, y + slot * 0.35 + 4.0, "middle", &format!("{:.0}%", pct));
            }
            x += w;
        }
        canvas.text(canvas.left - 6.0, y + slot * 0.35 + 4.0, "end", item);
    }

    canvas.right = WIDTH - 10.0;
    canvas.legend(categories);
    canvas.finish()
}
