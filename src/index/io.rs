//! Inverted index persistence.
//!
//! Same shape as the tree file: a gzip stream of line-oriented text, one
//! grammar for both directions.
//!
//! ```text
//! normKind: L1             -- L1 | L2
//! images: 2
//! -
//! imageId: 0
//! pairs: 3
//! data: [ 0 2, 5 1, 9 4 ]  -- word tf pairs
//! norm: 0.75
//! ...
//! dfValues: [ 1, 0, 2 ]    -- one entry per word
//! dbSize: 2
//! ```
//!
//! The writer serializes the database as if committed: norms and the
//! trailing document-frequency section always agree with the image records.
//! Loading rebuilds the posting lists from the records, recomputes idf and
//! returns an index committed at `dbSize` images.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::debug;

use super::inverted::{ImageRecord, InvertedIndex, NormKind, Posting};
use crate::error::{Result, VocabError};

const PAIRS_PER_LINE: usize = 8;
const DF_PER_LINE: usize = 16;

impl InvertedIndex {
    /// Persist the database to a gzip-compressed file at `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let mut out = BufWriter::new(GzEncoder::new(file, Compression::default()));

        writeln!(out, "normKind: {}", self.norm_kind.tag())?;
        writeln!(out, "images: {}", self.images.len())?;

        let idf = self.fresh_idf();
        for (image_id, record) in self.images.iter().enumerate() {
            writeln!(out, "-")?;
            writeln!(out, "imageId: {image_id}")?;
            writeln!(out, "pairs: {}", record.pairs.len())?;
            write_bracketed(
                &mut out,
                "data:",
                PAIRS_PER_LINE,
                record.pairs.iter().map(|&(w, tf)| format!("{w} {tf}")),
            )?;
            writeln!(out, "norm: {}", self.weighted_norm(record, &idf))?;
        }

        write_bracketed(
            &mut out,
            "dfValues:",
            DF_PER_LINE,
            self.df.iter().map(u32::to_string),
        )?;
        writeln!(out, "dbSize: {}", self.images.len())?;

        let encoder = out
            .into_inner()
            .map_err(|e| VocabError::Io(e.into_error()))?;
        encoder.finish()?;
        debug!("saved inverted index ({} images) to {}", self.images.len(), path.display());
        Ok(())
    }

    /// Restore an index previously written by [`InvertedIndex::save`].
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mut lines = BufReader::new(GzDecoder::new(file)).lines();

        let norm_kind = NormKind::from_tag(&next_field(&mut lines, "normKind:")?)?;
        let image_count: usize = parse_num(&next_field(&mut lines, "images:")?, "images")?;

        let mut images: Vec<ImageRecord> = Vec::with_capacity(image_count);
        for expected_id in 0..image_count {
            images.push(read_image(&mut lines, expected_id)?);
        }

        let df_line = next_line(&mut lines)?;
        let df_values: Vec<u32> = if df_line.starts_with("dfValues:") {
            read_bracketed(&df_line, &mut lines, "dfValues")?
        } else {
            return Err(VocabError::Parse("missing `dfValues:` section".to_string()));
        };
        let db_size: usize = parse_num(&next_field(&mut lines, "dbSize:")?, "dbSize")?;
        if db_size != image_count {
            return Err(VocabError::Parse(format!(
                "dbSize {db_size} disagrees with {image_count} image records"
            )));
        }

        let num_words = df_values.len();
        let mut postings: Vec<Vec<Posting>> = vec![Vec::new(); num_words];
        let mut df = vec![0u32; num_words];
        for (image_id, record) in images.iter().enumerate() {
            for &(word, tf) in &record.pairs {
                if word as usize >= num_words {
                    return Err(VocabError::Parse(format!(
                        "word {word} outside a vocabulary of {num_words}"
                    )));
                }
                postings[word as usize].push(Posting {
                    image_id: image_id as u32,
                    tf,
                });
                df[word as usize] += 1;
            }
        }
        if df != df_values {
            return Err(VocabError::Parse(
                "document frequencies disagree with the image records".to_string(),
            ));
        }

        debug!("loaded inverted index ({image_count} images, {num_words} words) from {}", path.display());

        let mut index = Self {
            norm_kind,
            num_words,
            postings,
            df,
            images,
            idf: Vec::new(),
            committed_images: 0,
        };
        index.idf = index.fresh_idf();
        index.committed_images = db_size;
        Ok(index)
    }
}

/// Read one image record; the `(word, tf)` pairs live between `pairs:` and
/// `norm:`, and `norm:` terminates the record.
fn read_image<B: BufRead>(lines: &mut Lines<B>, expected_id: usize) -> Result<ImageRecord> {
    let mut pairs_declared: Option<usize> = None;
    let mut flat: Option<Vec<u32>> = None;

    loop {
        let line = next_line(lines)?;
        let mut toks = line.split_whitespace();
        let Some(field) = toks.next() else { continue };
        match field {
            "-" => {}
            "imageId:" => {
                let id: usize = parse_num(toks.next().unwrap_or(""), "imageId")?;
                if id != expected_id {
                    return Err(VocabError::Parse(format!(
                        "image records out of order: expected {expected_id}, got {id}"
                    )));
                }
            }
            "pairs:" => {
                pairs_declared = Some(parse_num(toks.next().unwrap_or(""), "pairs")?);
            }
            "data:" => {
                flat = Some(read_bracketed(&line, lines, "data")?);
            }
            "norm:" => {
                let norm: f32 = parse_num(toks.next().unwrap_or(""), "norm")?;
                let declared = pairs_declared
                    .ok_or_else(|| VocabError::Parse("missing `pairs:` field".to_string()))?;
                let flat = flat
                    .ok_or_else(|| VocabError::Parse("missing `data:` field".to_string()))?;
                if flat.len() != declared * 2 {
                    return Err(VocabError::Parse(format!(
                        "{declared} pairs declared, {} values present",
                        flat.len()
                    )));
                }
                let pairs: Vec<(u32, u32)> =
                    flat.chunks_exact(2).map(|p| (p[0], p[1])).collect();
                return Ok(ImageRecord { pairs, norm });
            }
            _ => {
                return Err(VocabError::Parse(format!(
                    "unexpected field `{field}` in image record"
                )))
            }
        }
    }
}

/// Write `items` as a bracketed list spanning lines of `per_line` entries.
fn write_bracketed(
    out: &mut impl Write,
    field: &str,
    per_line: usize,
    items: impl Iterator<Item = String>,
) -> Result<()> {
    let items: Vec<String> = items.collect();
    if items.is_empty() {
        writeln!(out, "{field} [ ]")?;
        return Ok(());
    }
    let chunks: Vec<&[String]> = items.chunks(per_line).collect();
    for (i, chunk) in chunks.iter().enumerate() {
        let body = chunk.join(", ");
        let prefix = if i == 0 {
            format!("{field} [ ")
        } else {
            "    ".to_string()
        };
        let suffix = if i + 1 == chunks.len() { " ]" } else { "," };
        writeln!(out, "{prefix}{body}{suffix}")?;
    }
    Ok(())
}

/// Collect the integers of a bracketed list that starts on `first` and runs
/// until the closing bracket.
fn read_bracketed<B: BufRead>(
    first: &str,
    lines: &mut Lines<B>,
    field: &str,
) -> Result<Vec<u32>> {
    let mut values = Vec::new();
    let mut line = first.to_string();
    loop {
        let closed = line.contains(']');
        let cleaned: String = line
            .chars()
            .map(|c| {
                if c == '[' || c == ']' || c == ',' {
                    ' '
                } else {
                    c
                }
            })
            .collect();
        for tok in cleaned.split_whitespace() {
            if tok.ends_with(':') {
                continue; // the leading field name
            }
            let v = tok
                .parse()
                .map_err(|_| VocabError::Parse(format!("unparseable `{field}` entry `{tok}`")))?;
            values.push(v);
        }
        if closed {
            return Ok(values);
        }
        line = next_line(lines)?;
    }
}

fn next_line<B: BufRead>(lines: &mut Lines<B>) -> Result<String> {
    match lines.next() {
        Some(line) => Ok(line?),
        None => Err(VocabError::Parse("unexpected end of stream".to_string())),
    }
}

/// Expect a `field value` line, skipping blanks; returns the value token.
fn next_field<B: BufRead>(lines: &mut Lines<B>, field: &str) -> Result<String> {
    loop {
        let line = next_line(lines)?;
        let mut toks = line.split_whitespace();
        match toks.next() {
            None => continue,
            Some(name) if name == field => {
                return Ok(toks.next().unwrap_or("").to_string());
            }
            Some(name) => {
                return Err(VocabError::Parse(format!(
                    "expected `{field}`, found `{name}`"
                )))
            }
        }
    }
}

fn parse_num<T: std::str::FromStr>(tok: &str, field: &str) -> Result<T> {
    tok.parse()
        .map_err(|_| VocabError::Parse(format!("malformed `{field}` field")))
}
