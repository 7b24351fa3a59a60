//! Batch driver: run one operation per row of a `;`-separated driver file.
//!
//! Rows are numbered from 0 in file order, header included; blank and
//! whitespace-only lines are skipped and not numbered. Only rows with
//! `start <= line < start + count` are processed, so an interrupted batch can
//! be resumed by passing the reported next line as the new start.

use async_trait::async_trait;
use csv::{Reader, ReaderBuilder, StringRecord, Trim};
use handle_core::{HandleError, HandleId, Result};
use std::io::{Read, Write};
use tracing::{debug, info};

use crate::session::Session;
use crate::throttle::Throttle;

/// Rows to process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowWindow {
    /// Zero-based first row
    pub start: u64,
    /// Maximum number of rows
    pub count: u64,
}

impl RowWindow {
    /// First row index past the window
    pub fn stop(&self) -> u64 {
        self.start.saturating_add(self.count)
    }
}

/// How a batch ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub start: u64,
    /// Rows handed to the operation
    pub processed: u64,
    /// Index of the last processed row
    pub last_line: Option<u64>,
    /// Row to resume from when stopped by count; `None` at end of file
    pub next: Option<u64>,
}

impl BatchOutcome {
    pub fn stopped_by_count(&self) -> bool {
        self.next.is_some()
    }
}

/// Work done for a single driver row
#[async_trait]
pub trait RowOperation: Send {
    async fn apply(&mut self, line: u64, row: &StringRecord) -> Result<()>;
}

/// CSV reader for driver files: `;` delimiter, `"` quotes, no header row.
pub fn driver_reader<R: Read>(input: R) -> Reader<R> {
    ReaderBuilder::new()
        .delimiter(b';')
        .quote(b'"')
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(input)
}

fn csv_error(err: csv::Error) -> HandleError {
    HandleError::Csv(err.to_string())
}

/// Whitespace-only lines trim down to a single empty field
fn is_blank(row: &StringRecord) -> bool {
    row.iter().all(str::is_empty)
}

/// Required, non-empty column of a driver row
fn column<'r>(row: &'r StringRecord, index: usize, line: u64, name: &str) -> Result<&'r str> {
    match row.get(index) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(HandleError::Parse(format!(
            "line {}: missing {} in column {}",
            line,
            name,
            index + 1
        ))),
    }
}

/// Feed the rows of `window` to `operation`, pausing between rows.
///
/// Stops after `count` processed rows or at end of file, whichever comes
/// first. Any error from the operation aborts the batch.
pub async fn run_batch<R, O, T>(
    reader: &mut Reader<R>,
    window: RowWindow,
    operation: &mut O,
    throttle: &mut T,
) -> Result<BatchOutcome>
where
    R: Read,
    O: RowOperation + ?Sized,
    T: Throttle + ?Sized,
{
    let stop = window.stop();
    let mut outcome = BatchOutcome {
        start: window.start,
        processed: 0,
        last_line: None,
        next: Some(stop),
    };

    if window.count > 0 {
        let mut row = StringRecord::new();
        let mut line = 0u64;

        loop {
            if !reader.read_record(&mut row).map_err(csv_error)? {
                outcome.next = None;
                break;
            }
            if is_blank(&row) {
                continue;
            }

            if line >= window.start {
                if outcome.processed > 0 {
                    throttle.pause().await;
                }
                operation.apply(line, &row).await?;
                outcome.processed += 1;
                outcome.last_line = Some(line);
            }

            line += 1;
            if line >= stop {
                break;
            }
        }
    }

    info!(
        "Done; start={}; last={}; next={}",
        outcome.start,
        outcome
            .last_line
            .map_or_else(|| "n/a".to_string(), |l| l.to_string()),
        outcome
            .next
            .map_or_else(|| "n/a".to_string(), |n| n.to_string())
    );
    Ok(outcome)
}

/// Fetch the handle named in the first column and append
/// `line;<record json>` to the output.
pub struct FetchRows<'a, W> {
    session: &'a Session,
    prefix: &'a str,
    output: W,
}

impl<'a, W: Write + Send> FetchRows<'a, W> {
    pub fn new(session: &'a Session, prefix: &'a str, output: W) -> Self {
        Self {
            session,
            prefix,
            output,
        }
    }

    pub fn into_output(self) -> W {
        self.output
    }
}

#[async_trait]
impl<W: Write + Send> RowOperation for FetchRows<'_, W> {
    async fn apply(&mut self, line: u64, row: &StringRecord) -> Result<()> {
        let postfix = column(row, 0, line, "postfix")?;
        debug!("line={}; postfix={}", line, postfix);

        let record = self
            .session
            .get_handle(&HandleId::new(self.prefix, postfix))
            .await?;

        writeln!(self.output, "{};{}", line, serde_json::to_string(&record)?)?;
        self.output.flush()?;
        Ok(())
    }
}

/// Rewrite the handle in the first column into an alias of the handle in
/// the second column.
pub struct AliasRows<'a> {
    session: &'a Session,
    prefix: &'a str,
}

impl<'a> AliasRows<'a> {
    pub fn new(session: &'a Session, prefix: &'a str) -> Self {
        Self { session, prefix }
    }
}

#[async_trait]
impl RowOperation for AliasRows<'_> {
    async fn apply(&mut self, line: u64, row: &StringRecord) -> Result<()> {
        let alias = column(row, 0, line, "alias postfix")?;
        let target = column(row, 1, line, "target postfix")?;
        info!("line={}; alias={}; handle={}", line, alias, target);

        self.session
            .rewrite_to_alias(
                &HandleId::new(self.prefix, alias),
                &HandleId::new(self.prefix, target),
            )
            .await?;
        Ok(())
    }
}
