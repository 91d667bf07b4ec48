//! Runs the lead parser over a saved lead list page.
//!
//! Usage: `inspect_lead_page <page.html>`

use anyhow::Context;
use crm_lead_allocator::lead_parser::LeadParser;

/// Main entry point for the inspection script.
///
/// Prints every lead the parser extracts so a changed page layout can be
/// checked without touching the live CRM.
fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let path = std::env::args()
        .nth(1)
        .context("usage: inspect_lead_page <page.html>")?;

    let html = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path))?;
    tracing::info!("Loaded {} ({} bytes)", path, html.len());

    let leads = LeadParser::new()?.parse(&html);

    println!("{:<20} ALLOCATION TOKEN", "LEAD ID");
    println!("{}", "-".repeat(60));
    for lead in &leads {
        println!("{:<20} {}", lead.id, lead.allocation_token);
    }
    println!("{}", "-".repeat(60));
    println!("{} lead(s) found", leads.len());

    Ok(())
}
