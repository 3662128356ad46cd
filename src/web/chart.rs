use thiserror::Error;

use crate::edgar::Holding;

pub const OTHER_LABEL: &str = "Other";
pub const UNTITLED_LABEL: &str = "Untitled";

pub const MIN_THRESHOLD_PCT: f64 = 0.5;
pub const MAX_THRESHOLD_PCT: f64 = 10.0;
pub const THRESHOLD_STEP_PCT: f64 = 0.5;
pub const DEFAULT_THRESHOLD_PCT: f64 = 3.0;

pub const MIN_LEGEND_ENTRIES: usize = 5;
pub const MAX_LEGEND_ENTRIES: usize = 30;
pub const DEFAULT_LEGEND_ENTRIES: usize = 15;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChartError {
    #[error("The data does not contain 'Value' information required for visualization.")]
    MissingValues,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartOptions {
    pub threshold_pct: f64,
    pub legend_entries: usize,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            threshold_pct: DEFAULT_THRESHOLD_PCT,
            legend_entries: DEFAULT_LEGEND_ENTRIES,
        }
    }
}

impl ChartOptions {
    /// Clamps both knobs into the slider ranges, snapping the threshold to the
    /// slider step.
    pub fn new(threshold_pct: f64, legend_entries: usize) -> Self {
        let threshold_pct = if threshold_pct.is_finite() {
            let snapped = (threshold_pct / THRESHOLD_STEP_PCT).round() * THRESHOLD_STEP_PCT;
            snapped.clamp(MIN_THRESHOLD_PCT, MAX_THRESHOLD_PCT)
        } else {
            DEFAULT_THRESHOLD_PCT
        };
        Self {
            threshold_pct,
            legend_entries: legend_entries.clamp(MIN_LEGEND_ENTRIES, MAX_LEGEND_ENTRIES),
        }
    }

    pub fn footnote(&self) -> String {
        format!("Note: Holdings below {:.1}% shown as '{}'", self.threshold_pct, OTHER_LABEL)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Slice {
    pub label: String,
    pub value: f64,
    pub share_pct: f64,
    /// Set on the aggregated slice only.
    pub grouped: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PieChart {
    pub total: f64,
    /// Individual slices sorted by value descending, then "Other" if anything
    /// fell under the threshold.
    pub slices: Vec<Slice>,
    pub legend: Vec<String>,
    pub threshold_pct: f64,
}

impl PieChart {
    pub fn individual(&self) -> impl Iterator<Item = &Slice> {
        self.slices.iter().filter(|s| s.grouped == 0)
    }

    pub fn other(&self) -> Option<&Slice> {
        self.slices.iter().find(|s| s.grouped > 0)
    }
}

/// Groups holdings into pie slices by value.
///
/// Holdings whose value does not read as a number are left out of the total
/// and of the chart. `Ok(None)` means there is nothing to plot.
pub fn build_pie(holdings: &[Holding], options: &ChartOptions) -> Result<Option<PieChart>, ChartError> {
    if holdings.is_empty() {
        return Err(ChartError::MissingValues);
    }

    let mut entries: Vec<(String, f64)> = holdings
        .iter()
        .filter_map(|h| {
            let value = h.value_usd()?;
            let label = h
                .title
                .as_deref()
                .filter(|t| !t.trim().is_empty())
                .unwrap_or(UNTITLED_LABEL)
                .to_string();
            Some((label, value))
        })
        .collect();

    if entries.is_empty() {
        return Ok(None);
    }

    entries.sort_by(|a, b| b.1.total_cmp(&a.1));
    let total: f64 = entries.iter().map(|(_, v)| v).sum();
    if total <= 0.0 {
        return Ok(None);
    }

    let share = |value: f64| value / total * 100.0;
    let (main, small): (Vec<_>, Vec<_>) = entries
        .iter()
        .partition(|(_, value)| share(*value) >= options.threshold_pct);

    let mut slices: Vec<Slice> = main
        .iter()
        .map(|(label, value)| Slice {
            label: label.clone(),
            value: *value,
            share_pct: share(*value),
            grouped: 0,
        })
        .collect();

    if !small.is_empty() {
        let other: f64 = small.iter().map(|(_, v)| v).sum();
        slices.push(Slice {
            label: OTHER_LABEL.to_string(),
            value: other,
            share_pct: share(other),
            grouped: small.len(),
        });
    }

    let mut legend: Vec<String> = entries
        .iter()
        .take(options.legend_entries)
        .map(|(label, _)| label.clone())
        .collect();
    if entries.len() > options.legend_entries {
        legend.push(format!(
            "Others ({} holdings)",
            entries.len() - options.legend_entries
        ));
    }

    Ok(Some(PieChart {
        total,
        slices,
        legend,
        threshold_pct: options.threshold_pct,
    }))
}
