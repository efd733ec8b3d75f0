use std::io::Write;

use colored::Colorize;
use serde::Serialize;

use crate::cli::{wprintln, write_json};
use crate::ods::database::Database;
use crate::ods::header::HeaderFlags;
use crate::ods::version::{OdsFamily, SUPPORTED_ODS};
use crate::util::format::{format_hex16, format_size};
use crate::PluckError;

/// Options for the `pluck info` subcommand.
pub struct InfoOptions {
    /// Path to the database file (not needed with `supported`).
    pub file: Option<String>,
    /// List the supported ODS versions instead of reading a file.
    pub supported: bool,
    /// Emit output as JSON.
    pub json: bool,
}

#[derive(Serialize)]
struct HeaderInfoJson {
    file: String,
    file_size: u64,
    page_size: u32,
    page_count: u64,
    ods_version: String,
    product: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    family: Option<OdsFamily>,
    next_transaction: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    flags: Option<HeaderFlags>,
    raw_flags: u16,
    locked: bool,
}

#[derive(Serialize)]
struct SupportedJson {
    ods_version: String,
    product: &'static str,
    family: OdsFamily,
}

/// Show what the header page says about a database.
///
/// Prints page size, ODS tag and product, page count, and the flags word
/// decoded with the family's bit layout. `locked` tells whether a
/// destructive trim would be allowed. An unsupported ODS tag is reported,
/// not treated as an error, since its flags cannot be decoded anyway.
///
/// With `--supported` no file is read; the table of supported ODS tags is
/// printed instead.
pub fn execute(opts: &InfoOptions, writer: &mut dyn Write) -> Result<(), PluckError> {
    if opts.supported {
        return execute_supported(opts, writer);
    }
    let file = opts
        .file
        .as_deref()
        .ok_or_else(|| PluckError::Argument("--file is required".to_string()))?;

    let db = Database::open(file)?;
    let header = db.header();
    let family = header.family().ok();
    let flags = header.flags().ok();
    let info = HeaderInfoJson {
        file: file.to_string(),
        file_size: db.file_size(),
        page_size: header.page_size,
        page_count: db.page_count(),
        ods_version: header.ods_version.to_string(),
        product: header.ods_version.product().to_string(),
        family,
        next_transaction: header.next_transaction,
        flags,
        raw_flags: header.raw_flags,
        locked: flags.is_some_and(|f| f.is_locked()),
    };

    if opts.json {
        return write_json(&info, writer);
    }

    wprintln!(writer, "Database: {}", info.file)?;
    wprintln!(writer, "  File size: {}", format_size(info.file_size))?;
    wprintln!(writer, "  Page size: {}", info.page_size)?;
    wprintln!(writer, "  Pages: {}", info.page_count)?;
    match info.family {
        Some(family) => wprintln!(
            writer,
            "  ODS: {} ({}, {} layout)",
            info.ods_version,
            info.product,
            family
        )?,
        None => wprintln!(
            writer,
            "  ODS: {} ({})",
            info.ods_version,
            "unsupported".red()
        )?,
    }
    wprintln!(writer, "  Next transaction: {}", info.next_transaction)?;
    wprintln!(writer, "  Flags: {}", format_hex16(info.raw_flags))?;
    if let Some(f) = &info.flags {
        wprintln!(writer, "    Shutdown: {:?}", f.shutdown)?;
        wprintln!(writer, "    Backup: {:?}", f.backup)?;
        wprintln!(writer, "    Encrypted: {}", f.encrypted)?;
        if f.crypt_in_progress {
            wprintln!(writer, "    Encryption change in progress")?;
        }
        if family == Some(OdsFamily::Current) {
            wprintln!(writer, "    Replica: {:?}", f.replica)?;
        }
    }
    let locked = if info.locked {
        "yes".green()
    } else {
        "no (dry run only)".yellow()
    };
    wprintln!(writer, "  Locked for trim: {}", locked)?;
    Ok(())
}

fn execute_supported(opts: &InfoOptions, writer: &mut dyn Write) -> Result<(), PluckError> {
    let list: Vec<SupportedJson> = SUPPORTED_ODS
        .iter()
        .map(|s| SupportedJson {
            ods_version: format_hex16(s.tag),
            product: s.product,
            family: s.family,
        })
        .collect();

    if opts.json {
        return write_json(&list, writer);
    }

    wprintln!(writer, "pluck {}", env!("CARGO_PKG_VERSION"))?;
    wprintln!(writer, "Supported ODS:")?;
    for s in &list {
        wprintln!(
            writer,
            "  {}  {:<16} {}",
            s.ods_version,
            s.product,
            s.family
        )?;
    }
    Ok(())
}
