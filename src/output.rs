//! Report writers
use crate::cli::OutputFormat;
use crate::error::Result;
use crate::search::ReferenceHunksRep;
use std::io::Write;

pub const CSV_HEADER: &str = "flagKey,projKey,path,startingLineNumber,lines,aliases";

pub fn write_report<W: Write>(
    format: OutputFormat,
    references: &[ReferenceHunksRep],
    writer: &mut W,
) -> Result<()> {
    match format {
        OutputFormat::Json => write_json(references, writer),
        OutputFormat::Csv => write_csv(references, writer),
    }
}

/// Pretty JSON array of per-file references.
pub fn write_json<W: Write>(references: &[ReferenceHunksRep], writer: &mut W) -> Result<()> {
    serde_json::to_writer_pretty(&mut *writer, references)?;
    writeln!(writer)?;
    Ok(())
}

/// One row per hunk; aliases are joined with spaces.
pub fn write_csv<W: Write>(references: &[ReferenceHunksRep], writer: &mut W) -> Result<()> {
    writeln!(writer, "{CSV_HEADER}")?;
    for reference in references {
        for hunk in &reference.hunks {
            writeln!(
                writer,
                "{},{},{},{},{},{}",
                quote(&hunk.flag_key),
                quote(&hunk.proj_key),
                quote(&reference.path),
                hunk.starting_line_number,
                quote(&hunk.lines),
                quote(&hunk.aliases.join(" "))
            )?;
        }
    }
    Ok(())
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}
