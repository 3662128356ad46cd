use std::cmp::Ordering;
use strum::{Display, EnumIter, EnumString};

use crate::edgar::parsing::types::parse_number;
use crate::edgar::Holding;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SortColumn {
    Title,
    Cusip,
    Balance,
    Value,
}

impl SortColumn {
    pub fn header(self) -> &'static str {
        match self {
            SortColumn::Title => "Title",
            SortColumn::Cusip => "CUSIP",
            SortColumn::Balance => "Balance",
            SortColumn::Value => "Value",
        }
    }

    fn cell(self, holding: &Holding) -> Option<&str> {
        match self {
            SortColumn::Title => holding.title.as_deref(),
            SortColumn::Cusip => holding.cusip.as_deref(),
            SortColumn::Balance => holding.balance.as_deref(),
            SortColumn::Value => holding.value.as_deref(),
        }
    }

    fn is_numeric(self) -> bool {
        matches!(self, SortColumn::Balance | SortColumn::Value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn flipped(self) -> Self {
        match self {
            SortOrder::Asc => SortOrder::Desc,
            SortOrder::Desc => SortOrder::Asc,
        }
    }
}

/// Case-insensitive substring match on the title. Holdings without a title
/// never match a non-empty keyword.
pub fn filter_by_title<'a>(holdings: &'a [Holding], keyword: &str) -> Vec<&'a Holding> {
    let keyword = keyword.trim().to_lowercase();
    if keyword.is_empty() {
        return holdings.iter().collect();
    }
    holdings
        .iter()
        .filter(|h| {
            h.title
                .as_deref()
                .is_some_and(|title| title.to_lowercase().contains(&keyword))
        })
        .collect()
}

/// Stable sort. Missing cells, and non-numeric cells in numeric columns, sort
/// last in either direction.
pub fn sort_rows(rows: &mut [&Holding], column: SortColumn, order: SortOrder) {
    let directed = |ordering: Ordering| match order {
        SortOrder::Asc => ordering,
        SortOrder::Desc => ordering.reverse(),
    };

    if column.is_numeric() {
        rows.sort_by(|a, b| {
            match (
                column.cell(a).and_then(parse_number),
                column.cell(b).and_then(parse_number),
            ) {
                (Some(x), Some(y)) => directed(x.total_cmp(&y)),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
        });
    } else {
        rows.sort_by(|a, b| match (column.cell(a), column.cell(b)) {
            (Some(x), Some(y)) => directed(x.to_lowercase().cmp(&y.to_lowercase())),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
    }
}
