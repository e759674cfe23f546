use std::io::Write;

use anyhow::{Context, Result};

use crate::marketplace::ListingRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Csv,
}

pub fn render_listings<W: Write>(out: &mut W, listings: &[ListingRecord], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => render_table(out, listings),
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, listings)?;
            writeln!(out)?;
            Ok(())
        }
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(out);
            for listing in listings {
                writer.serialize(listing)?;
            }
            writer.flush().context("Failed to flush CSV output")?;
            Ok(())
        }
    }
}

fn render_table<W: Write>(out: &mut W, listings: &[ListingRecord]) -> Result<()> {
    writeln!(out, "Number of results: {}", listings.len())?;
    for (idx, listing) in listings.iter().enumerate() {
        writeln!(out, "\n--- {}. {} ---", idx + 1, listing.title.trim())?;
        writeln!(out, "Price:     {}", listing.price)?;
        writeln!(out, "Location:  {}", listing.location)?;
        writeln!(out, "Image:     {}", listing.image)?;
        writeln!(out, "Link:      {}", listing.link)?;
    }
    writeln!(out, "{}", "-".repeat(60))?;
    Ok(())
}
