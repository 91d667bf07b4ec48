//! Extraction of leads from the CRM lead list page.
//!
//! The CRM renders leads as rows of `#domainTable`. The first cell of each row
//! holds the lead identifier and an `input.duplicate_id` checkbox carries the
//! allocation token. This coupling to the page layout is inherent: if the CRM
//! changes its markup, only this module has to follow.

use std::sync::OnceLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::errors::AppError;
use crate::models::Lead;

const ROW_SELECTOR: &str = "#domainTable tbody tr";
const CELL_SELECTOR: &str = "td";
const TOKEN_SELECTOR: &str = "input.duplicate_id";

/// Placeholder row text the CRM shows when the table is empty.
fn empty_table_sentinel() -> &'static Regex {
    static SENTINEL: OnceLock<Regex> = OnceLock::new();
    SENTINEL.get_or_init(|| {
        Regex::new(r"(?i)^no\s+records?\s+found\.*$").expect("sentinel pattern is valid")
    })
}

/// Returns true if `text` is the CRM's "no records" placeholder.
pub fn is_empty_table_sentinel(text: &str) -> bool {
    empty_table_sentinel().is_match(text.trim())
}

/// Parser for the lead list table.
pub struct LeadParser {
    rows: Selector,
    cell: Selector,
    token: Selector,
}

impl LeadParser {
    pub fn new() -> Result<Self, AppError> {
        Ok(Self {
            rows: selector(ROW_SELECTOR)?,
            cell: selector(CELL_SELECTOR)?,
            token: selector(TOKEN_SELECTOR)?,
        })
    }

    /// Extracts leads in document order.
    ///
    /// Rows without an identifier, rows showing the empty-table sentinel and
    /// rows without an allocation token are skipped. A page without the lead
    /// table yields no leads.
    pub fn parse(&self, html: &str) -> Vec<Lead> {
        let document = Html::parse_document(html);

        document
            .select(&self.rows)
            .enumerate()
            .filter_map(|(index, row)| {
                let lead = self.parse_row(row);
                if lead.is_none() {
                    tracing::trace!("Skipping lead table row {}", index);
                }
                lead
            })
            .collect()
    }

    fn parse_row(&self, row: ElementRef<'_>) -> Option<Lead> {
        let id = row
            .select(&self.cell)
            .next()
            .map(|cell| cell.text().collect::<String>())?
            .trim()
            .to_string();

        if id.is_empty() || is_empty_table_sentinel(&id) {
            return None;
        }

        let token = row
            .select(&self.token)
            .next()
            .and_then(|input| input.value().attr("value"))
            .map(str::trim)
            .filter(|value| !value.is_empty())?;

        Some(Lead::new(id, token, row.inner_html()))
    }
}

fn selector(css: &str) -> Result<Selector, AppError> {
    Selector::parse(css)
        .map_err(|e| AppError::Markup(format!("Invalid selector '{}': {:?}", css, e)))
}
