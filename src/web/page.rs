use html_escape::{encode_double_quoted_attribute, encode_text};
use serde::Deserialize;
use std::f64::consts::PI;
use std::fmt::Write;
use strum::IntoEnumIterator;

use super::chart::{
    self, ChartOptions, PieChart, DEFAULT_LEGEND_ENTRIES, DEFAULT_THRESHOLD_PCT,
    MAX_LEGEND_ENTRIES, MAX_THRESHOLD_PCT, MIN_LEGEND_ENTRIES, MIN_THRESHOLD_PCT,
    THRESHOLD_STEP_PCT,
};
use super::session::SessionHoldings;
use super::table::{filter_by_title, sort_rows, SortColumn, SortOrder};
use crate::edgar::ReportType;

pub const PAGE_TITLE: &str = "Fund Holdings Viewer";
pub const CHART_TITLE: &str = "Holdings by Total USD Value";

const PALETTE: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];
const OTHER_COLOR: &str = "#c7c7c7";

/// Everything the page carries between requests. All fields are raw text so
/// a half-filled form never turns into a rejected request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ViewQuery {
    pub cik: String,
    pub filter: String,
    pub threshold: String,
    pub top_n: String,
    pub sort: String,
    pub order: String,
}

impl ViewQuery {
    pub fn chart_options(&self) -> ChartOptions {
        ChartOptions::new(
            self.threshold.trim().parse().unwrap_or(DEFAULT_THRESHOLD_PCT),
            self.top_n.trim().parse().unwrap_or(DEFAULT_LEGEND_ENTRIES),
        )
    }

    pub fn sort_column(&self) -> Option<SortColumn> {
        self.sort.trim().parse().ok()
    }

    pub fn sort_order(&self) -> SortOrder {
        self.order.trim().parse().unwrap_or_default()
    }

    /// Query string for a link back to `/` with the given sort applied.
    fn sorted_by(&self, column: SortColumn, order: SortOrder) -> String {
        let options = self.chart_options();
        url::form_urlencoded::Serializer::new(String::new())
            .append_pair("cik", self.cik.trim())
            .append_pair("filter", &self.filter)
            .append_pair("threshold", &format!("{:.1}", options.threshold_pct))
            .append_pair("top_n", &options.legend_entries.to_string())
            .append_pair("sort", &column.to_string())
            .append_pair("order", &order.to_string())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Info,
    Warning,
    Error,
}

impl NoticeLevel {
    fn class(self) -> &'static str {
        match self {
            NoticeLevel::Success => "success",
            NoticeLevel::Info => "info",
            NoticeLevel::Warning => "warning",
            NoticeLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

pub struct Page<'a> {
    pub form_type: &'a ReportType,
    pub query: &'a ViewQuery,
    pub notices: &'a [Notice],
    /// `None` hides the data section entirely (e.g. after a validation error).
    pub data: Option<&'a SessionHoldings>,
}

impl Page<'_> {
    pub fn render(&self) -> String {
        let mut html = String::with_capacity(16 * 1024);
        let _ = write!(
            html,
            r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{title}</title>
<style>{style}</style>
</head>
<body>
<h1>{title}</h1>
<p class="meta">Shows the most recent {form} filing for a CIK.</p>
"#,
            title = PAGE_TITLE,
            style = STYLE,
            form = encode_text(&self.form_type.to_string())
        );

        self.render_form(&mut html);
        for notice in self.notices {
            let _ = writeln!(
                html,
                r#"<div class="notice {}">{}</div>"#,
                notice.level.class(),
                encode_text(&notice.message)
            );
        }
        if let Some(data) = self.data {
            self.render_data(&mut html, data);
        }

        html.push_str("</body>\n</html>\n");
        html
    }

    fn render_form(&self, html: &mut String) {
        let options = self.query.chart_options();
        let _ = write!(
            html,
            r#"<form method="get" action="/">
<label>Enter CIK <input type="text" name="cik" value="{cik}" inputmode="numeric" maxlength="20"></label>
<label>Filter by Title <input type="text" name="filter" value="{filter}"></label>
<details>
<summary>Pie Chart Options</summary>
<label title="Holdings below this percentage will be grouped as 'Other'">Minimum % for individual slice
<input type="range" name="threshold" min="{tmin}" max="{tmax}" step="{tstep}" value="{threshold:.1}"
 oninput="this.nextElementSibling.value=Number(this.value).toFixed(1)"><output>{threshold:.1}</output></label>
<label title="Maximum number of individual holdings to display in the legend">Number of holdings in legend
<input type="range" name="top_n" min="{lmin}" max="{lmax}" step="1" value="{top_n}"
 oninput="this.nextElementSibling.value=this.value"><output>{top_n}</output></label>
</details>
"#,
            cik = encode_double_quoted_attribute(&self.query.cik),
            filter = encode_double_quoted_attribute(&self.query.filter),
            tmin = MIN_THRESHOLD_PCT,
            tmax = MAX_THRESHOLD_PCT,
            tstep = THRESHOLD_STEP_PCT,
            threshold = options.threshold_pct,
            lmin = MIN_LEGEND_ENTRIES,
            lmax = MAX_LEGEND_ENTRIES,
            top_n = options.legend_entries,
        );
        if let Some(column) = self.query.sort_column() {
            let _ = writeln!(
                html,
                r#"<input type="hidden" name="sort" value="{}"><input type="hidden" name="order" value="{}">"#,
                column,
                self.query.sort_order()
            );
        }
        html.push_str(
            r#"<button type="submit" formmethod="post" formaction="/fetch">Fetch Holdings</button>
<button type="submit">Apply</button>
<button type="submit" formmethod="post" formaction="/cache/clear" class="secondary">Clear cache</button>
</form>
"#,
        );
    }

    fn render_data(&self, html: &mut String, data: &SessionHoldings) {
        let filing = &data.filing;
        let _ = writeln!(
            html,
            r#"<p class="meta">CIK {} &middot; Form {} &middot; Accession {} &middot; {} holdings</p>"#,
            encode_text(&data.cik.padded()),
            encode_text(&filing.location.filing.report_type.to_string()),
            encode_text(&filing.location.filing.accession_number),
            filing.holdings.len()
        );
        if !filing.diagnostics.is_empty() {
            let _ = writeln!(
                html,
                r#"<details class="diagnostics"><summary>Recovered from {} markup problem(s) while parsing</summary><ul>"#,
                filing.diagnostics.len()
            );
            for diagnostic in &filing.diagnostics {
                let _ = writeln!(html, "<li>{}</li>", encode_text(&diagnostic.to_string()));
            }
            html.push_str("</ul></details>\n");
        }

        self.render_table(html, data);

        match chart::build_pie(&filing.holdings, &self.query.chart_options()) {
            Ok(Some(pie)) => render_pie(html, &pie, &self.query.chart_options()),
            Ok(None) => {}
            Err(e) => {
                let _ = writeln!(
                    html,
                    r#"<div class="notice error">{}</div>"#,
                    encode_text(&e.to_string())
                );
            }
        }
    }

    fn render_table(&self, html: &mut String, data: &SessionHoldings) {
        let mut rows = filter_by_title(&data.filing.holdings, &self.query.filter);
        let active = self.query.sort_column();
        let order = self.query.sort_order();
        if let Some(column) = active {
            sort_rows(&mut rows, column, order);
        }

        html.push_str("<table>\n<thead><tr>");
        for column in SortColumn::iter() {
            let (next, marker) = match active {
                Some(current) if current == column => (
                    order.flipped(),
                    if order == SortOrder::Asc { " &#9650;" } else { " &#9660;" },
                ),
                _ => (SortOrder::Asc, ""),
            };
            let _ = write!(
                html,
                r#"<th><a href="/?{}">{}</a>{}</th>"#,
                encode_double_quoted_attribute(&self.query.sorted_by(column, next)),
                column.header(),
                marker
            );
        }
        html.push_str("</tr></thead>\n<tbody>\n");

        for holding in &rows {
            html.push_str("<tr>");
            for cell in [&holding.title, &holding.cusip, &holding.balance, &holding.value] {
                match cell {
                    Some(text) => {
                        let _ = write!(html, "<td>{}</td>", encode_text(text));
                    }
                    None => html.push_str(r#"<td class="missing">None</td>"#),
                }
            }
            html.push_str("</tr>\n");
        }
        let _ = writeln!(
            html,
            r#"</tbody>
</table>
<p class="meta">{} of {} rows</p>"#,
            rows.len(),
            data.filing.holdings.len()
        );
    }
}

fn slice_color(index: usize, grouped: bool) -> &'static str {
    if grouped {
        OTHER_COLOR
    } else {
        PALETTE[index % PALETTE.len()]
    }
}

fn truncate(label: &str, max: usize) -> String {
    if label.chars().count() <= max {
        label.to_string()
    } else {
        let mut short: String = label.chars().take(max.saturating_sub(1)).collect();
        short.push('\u{2026}');
        short
    }
}

/// Point on the circle at `angle` radians, counter-clockwise from 3 o'clock.
fn polar(cx: f64, cy: f64, r: f64, angle: f64) -> (f64, f64) {
    (cx + r * angle.cos(), cy - r * angle.sin())
}

/// Inline SVG pie. Wedges start at 12 o'clock and run counter-clockwise.
/// Non-positive slices have no area and are skipped.
pub fn render_pie(html: &mut String, pie: &PieChart, options: &ChartOptions) {
    const WIDTH: f64 = 900.0;
    const HEIGHT: f64 = 560.0;
    const CX: f64 = 280.0;
    const CY: f64 = 290.0;
    const R: f64 = 190.0;

    let drawn: f64 = pie.slices.iter().map(|s| s.value.max(0.0)).sum();

    let _ = writeln!(
        html,
        r#"<figure class="chart">
<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {w} {h}" role="img" aria-label="{title}">
<text x="{tx}" y="36" class="chart-title" text-anchor="middle">{title}</text>"#,
        w = WIDTH,
        h = HEIGHT,
        tx = CX,
        title = CHART_TITLE
    );

    let mut angle = PI / 2.0;
    for (index, slice) in pie.slices.iter().enumerate() {
        if slice.value <= 0.0 || drawn <= 0.0 {
            continue;
        }
        let sweep = slice.value / drawn * 2.0 * PI;
        let color = slice_color(index, slice.grouped > 0);
        let label = encode_text(&truncate(&slice.label, 28)).into_owned();

        if sweep >= 2.0 * PI - 1e-9 {
            let _ = writeln!(
                html,
                r##"<circle cx="{CX}" cy="{CY}" r="{R}" fill="{color}" stroke="#fff"><title>{label}</title></circle>"##
            );
        } else {
            let (x0, y0) = polar(CX, CY, R, angle);
            let (x1, y1) = polar(CX, CY, R, angle + sweep);
            let large_arc = u8::from(sweep > PI);
            let _ = writeln!(
                html,
                r##"<path d="M {CX} {CY} L {x0:.2} {y0:.2} A {R} {R} 0 {large_arc} 0 {x1:.2} {y1:.2} Z" fill="{color}" stroke="#fff"><title>{label}</title></path>"##
            );
        }

        let mid = angle + sweep / 2.0;
        let (px, py) = polar(CX, CY, R * 0.85, mid);
        let _ = writeln!(
            html,
            r#"<text x="{px:.2}" y="{py:.2}" class="pct" text-anchor="middle" dominant-baseline="middle">{:.1}%</text>"#,
            slice.share_pct
        );
        let (lx, ly) = polar(CX, CY, R * 1.1, mid);
        let anchor = if mid.cos() >= 0.0 { "start" } else { "end" };
        let _ = writeln!(
            html,
            r#"<text x="{lx:.2}" y="{ly:.2}" class="label" text-anchor="{anchor}" dominant-baseline="middle">{label}</text>"#
        );

        angle += sweep;
    }

    let individual = pie.individual().count();
    let legend_x = 560.0;
    let _ = writeln!(
        html,
        r#"<text x="{legend_x}" y="80" class="legend-title">Holdings Detail</text>"#
    );
    for (row, item) in pie.legend.iter().enumerate() {
        let y = 100.0 + row as f64 * 14.0;
        let color = if row < individual {
            slice_color(row, false)
        } else {
            OTHER_COLOR
        };
        let _ = writeln!(
            html,
            r#"<rect x="{legend_x}" y="{:.1}" width="10" height="10" fill="{color}"/><text x="{:.1}" y="{:.1}" class="legend">{}</text>"#,
            y - 9.0,
            legend_x + 16.0,
            y,
            encode_text(&truncate(item, 40))
        );
    }

    let _ = writeln!(
        html,
        r#"<text x="{}" y="{}" class="footnote" text-anchor="middle">{}</text>
</svg>
</figure>"#,
        WIDTH / 2.0,
        HEIGHT - 10.0,
        encode_text(&options.footnote())
    );
}

const STYLE: &str = r#"
body { font-family: system-ui, sans-serif; margin: 2rem auto; max-width: 1100px; color: #222; }
form { display: flex; flex-wrap: wrap; gap: 0.75rem 1.5rem; align-items: end; margin-bottom: 1rem; }
form label { display: flex; flex-direction: column; font-size: 0.9rem; }
details { flex-basis: 100%; }
details label { margin: 0.5rem 0; }
button { padding: 0.4rem 1rem; }
button.secondary { background: none; border: 1px solid #aaa; }
.notice { padding: 0.6rem 1rem; border-radius: 4px; margin: 0.5rem 0; }
.notice.success { background: #e6f4ea; color: #1e4620; }
.notice.info { background: #e8f0fe; color: #174ea6; }
.notice.warning { background: #fef7e0; color: #7a4f01; }
.notice.error { background: #fce8e6; color: #a50e0e; }
.meta { color: #666; font-size: 0.85rem; }
table { border-collapse: collapse; width: 100%; font-size: 0.85rem; }
th, td { border-bottom: 1px solid #ddd; padding: 0.3rem 0.5rem; text-align: left; }
th a { color: inherit; }
td.missing { color: #aaa; font-style: italic; }
.chart svg { width: 100%; height: auto; }
.chart-title { font-size: 16px; }
.pct { font-size: 10px; font-weight: bold; fill: #fff; }
.label { font-size: 11px; }
.legend-title { font-size: 12px; font-weight: bold; }
.legend { font-size: 11px; }
.footnote { font-size: 10px; font-style: italic; }
"#;
