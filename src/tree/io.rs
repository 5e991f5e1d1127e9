//! Tree persistence.
//!
//! The tree is stored as a gzip-compressed, line-oriented text document.
//! One grammar serves both directions; the writer emits exactly what the
//! reader tokenizes:
//!
//! ```text
//! type: HKM            -- HKM (float centers) | HKMAJ (byte centers)
//! iterations: 10
//! branching: 2
//! depth: 2
//! vectorLength: 2
//! size: 7              -- total node count
//! nodes:
//! -
//! center:
//! rows: 1
//! cols: 2
//! dt: f                -- f | u, agrees with `type:`
//! data: [ 0.5, 1.25 ]
//! nodeId: 0
//! wordId: -1           -- -1 interior (B child records follow), >= 0 leaf
//! ...
//! ```
//!
//! Node records appear in pre-order; `wordId:` terminates each record and
//! decides whether child records follow. Center data may span lines; every
//! reader simply strips brackets and commas and parses the remaining
//! tokens.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::path::Path;
use std::str::FromStr;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::debug;

use super::{NodeKind, TreeNode, VocabTree, VocabTreeParams};
use crate::descriptor::DescriptorKind;
use crate::error::{Result, VocabError};

const ELEMS_PER_LINE: usize = 16;

impl<K: DescriptorKind> VocabTree<K> {
    /// Persist the tree to a gzip-compressed file at `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        if self.is_empty() {
            return Err(VocabError::TreeEmpty);
        }

        let file = File::create(path)?;
        let mut out = BufWriter::new(GzEncoder::new(file, Compression::default()));

        writeln!(out, "type: {}", K::VOCAB_TYPE)?;
        writeln!(out, "iterations: {}", self.params.max_iterations)?;
        writeln!(out, "branching: {}", self.params.branching)?;
        writeln!(out, "depth: {}", self.params.depth)?;
        writeln!(out, "vectorLength: {}", self.veclen)?;
        writeln!(out, "size: {}", self.nodes.len())?;
        writeln!(out, "nodes:")?;
        self.save_node(&mut out, 0)?;

        let encoder = out
            .into_inner()
            .map_err(|e| VocabError::Io(e.into_error()))?;
        encoder.finish()?;
        debug!("saved vocabulary ({} nodes) to {}", self.nodes.len(), path.display());
        Ok(())
    }

    fn save_node(&self, out: &mut impl Write, node: u32) -> Result<()> {
        let n = &self.nodes[node as usize];

        writeln!(out, "-")?;
        writeln!(out, "center:")?;
        writeln!(out, "rows: 1")?;
        writeln!(out, "cols: {}", self.veclen)?;
        writeln!(out, "dt: {}", K::ELEMENT_TAG)?;
        let chunks: Vec<&[K::Elem]> = n.center.chunks(ELEMS_PER_LINE).collect();
        for (i, chunk) in chunks.iter().enumerate() {
            let body = chunk
                .iter()
                .map(|&v| K::format_elem(v))
                .collect::<Vec<_>>()
                .join(", ");
            let prefix = if i == 0 { "data: [ " } else { "    " };
            let suffix = if i + 1 == chunks.len() { " ]" } else { "," };
            writeln!(out, "{prefix}{body}{suffix}")?;
        }
        writeln!(out, "nodeId: {node}")?;

        match &n.kind {
            NodeKind::Leaf(word) => {
                writeln!(out, "wordId: {word}")?;
            }
            NodeKind::Interior(children) => {
                writeln!(out, "wordId: -1")?;
                for &child in children {
                    self.save_node(out, child)?;
                }
            }
        }
        Ok(())
    }

    /// Restore a tree previously written by [`VocabTree::save`].
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mut lines = BufReader::new(GzDecoder::new(file)).lines();

        let mut vocab_type: Option<String> = None;
        let mut iterations: i32 = 0;
        let mut branching: Option<usize> = None;
        let mut depth: Option<usize> = None;
        let mut veclen: Option<usize> = None;
        let mut size: Option<usize> = None;

        loop {
            let line = next_line(&mut lines)?;
            let mut toks = line.split_whitespace();
            let Some(field) = toks.next() else { continue };
            match field {
                "type:" => vocab_type = Some(toks.next().unwrap_or("").to_string()),
                "iterations:" => iterations = parse_field(toks.next(), "iterations")?,
                "branching:" => branching = Some(parse_field(toks.next(), "branching")?),
                "depth:" => depth = Some(parse_field(toks.next(), "depth")?),
                "vectorLength:" => veclen = Some(parse_field(toks.next(), "vectorLength")?),
                "size:" => size = Some(parse_field(toks.next(), "size")?),
                "nodes:" => break,
                _ => {}
            }
        }

        match vocab_type.as_deref() {
            Some(tag) if tag == K::VOCAB_TYPE => {}
            Some("HKM" | "HKMAJ") => {
                return Err(VocabError::Parse(format!(
                    "vocabulary type is not {}",
                    K::VOCAB_TYPE
                )))
            }
            Some(tag) => {
                return Err(VocabError::NotSupported(format!(
                    "unknown vocabulary type `{tag}`"
                )))
            }
            None => return Err(VocabError::Parse("missing `type:` header".to_string())),
        }

        let branching = require_header(branching, "branching", |v| v >= 2)?;
        let depth = require_header(depth, "depth", |v| v >= 1)?;
        let veclen = require_header(veclen, "vectorLength", |v| v >= 1)?;
        let size = require_header(size, "size", |v| v >= 1)?;

        let mut reader = TreeReader::<K, _> {
            lines,
            branching,
            depth,
            veclen,
            nodes: Vec::with_capacity(size),
            words: Vec::new(),
        };
        reader.read_node(0)?;

        if reader.nodes.len() != size {
            return Err(VocabError::Parse(format!(
                "header declares {} nodes, stream holds {}",
                size,
                reader.nodes.len()
            )));
        }

        debug!(
            "loaded vocabulary ({} nodes, {} words) from {}",
            reader.nodes.len(),
            reader.words.len(),
            path.display()
        );

        let params = VocabTreeParams {
            branching,
            depth,
            max_iterations: iterations,
            ..Default::default()
        };
        Ok(VocabTree::from_parts(
            params,
            veclen,
            reader.nodes,
            reader.words,
        ))
    }
}

struct TreeReader<K: DescriptorKind, B: BufRead> {
    lines: Lines<B>,
    branching: usize,
    depth: usize,
    veclen: usize,
    nodes: Vec<TreeNode<K>>,
    words: Vec<u32>,
}

impl<K: DescriptorKind, B: BufRead> TreeReader<K, B> {
    /// Read one node record at `level`, then its subtree when interior.
    fn read_node(&mut self, level: usize) -> Result<u32> {
        let id = self.nodes.len() as u32;
        self.nodes.push(TreeNode {
            center: Vec::new(),
            kind: NodeKind::Interior(Vec::new()),
        });

        let mut center: Vec<K::Elem> = Vec::with_capacity(self.veclen);
        let mut node_id: Option<u32> = None;
        let word_id: i64 = loop {
            let line = next_line(&mut self.lines)?;
            let mut toks = line.split_whitespace();
            let Some(field) = toks.next() else { continue };
            match field {
                "-" | "center:" => {}
                "rows:" => {
                    let rows: usize = parse_field(toks.next(), "rows")?;
                    if rows != 1 {
                        return Err(VocabError::Parse(format!(
                            "center must be a single row, got {rows}"
                        )));
                    }
                }
                "cols:" => {
                    let cols: usize = parse_field(toks.next(), "cols")?;
                    if cols != self.veclen {
                        return Err(VocabError::Parse(format!(
                            "center of {cols} elements in a vocabulary of length {}",
                            self.veclen
                        )));
                    }
                }
                "dt:" => match toks.next() {
                    Some(tag) if tag.len() == 1 && tag.starts_with(K::ELEMENT_TAG) => {}
                    Some("f" | "u") => {
                        return Err(VocabError::Parse(format!(
                            "element type is not `{}`",
                            K::ELEMENT_TAG
                        )))
                    }
                    tag => {
                        return Err(VocabError::NotSupported(format!(
                            "unknown element type `{}`",
                            tag.unwrap_or("")
                        )))
                    }
                },
                "nodeId:" => node_id = Some(parse_field(toks.next(), "nodeId")?),
                "wordId:" => break parse_field(toks.next(), "wordId")?,
                _ => parse_center_line::<K>(&line, &mut center)?,
            }
        };

        if node_id != Some(id) {
            return Err(VocabError::Parse(format!(
                "node record out of pre-order: expected id {id}"
            )));
        }
        if center.len() != self.veclen {
            return Err(VocabError::Parse(format!(
                "center holds {} elements, expected {}",
                center.len(),
                self.veclen
            )));
        }
        self.nodes[id as usize].center = center;

        match word_id {
            -1 => {
                if level >= self.depth {
                    return Err(VocabError::Parse(format!(
                        "interior node at depth {level} in a tree of depth {}",
                        self.depth
                    )));
                }
                let mut children = Vec::with_capacity(self.branching);
                for _ in 0..self.branching {
                    children.push(self.read_node(level + 1)?);
                }
                self.nodes[id as usize].kind = NodeKind::Interior(children);
            }
            w if w >= 0 => {
                if w as usize != self.words.len() {
                    return Err(VocabError::Parse(format!(
                        "word ids out of order: expected {}, got {w}",
                        self.words.len()
                    )));
                }
                self.nodes[id as usize].kind = NodeKind::Leaf(w as u32);
                self.words.push(id);
            }
            w => {
                return Err(VocabError::Parse(format!("invalid word id {w}")));
            }
        }
        Ok(id)
    }
}

/// Fold one `data:` line (or continuation line) into `center`.
fn parse_center_line<K: DescriptorKind>(line: &str, center: &mut Vec<K::Elem>) -> Result<()> {
    let cleaned: String = line
        .replace("data:", " ")
        .chars()
        .map(|c| if c == '[' || c == ']' || c == ',' { ' ' } else { c })
        .collect();
    for tok in cleaned.split_whitespace() {
        let elem = K::parse_elem(tok)
            .ok_or_else(|| VocabError::Parse(format!("unparseable center element `{tok}`")))?;
        center.push(elem);
    }
    Ok(())
}

fn next_line<B: BufRead>(lines: &mut Lines<B>) -> Result<String> {
    match lines.next() {
        Some(line) => Ok(line?),
        None => Err(VocabError::Parse("unexpected end of stream".to_string())),
    }
}

fn parse_field<T: FromStr>(value: Option<&str>, field: &str) -> Result<T> {
    value
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| VocabError::Parse(format!("malformed `{field}` field")))
}

fn require_header(
    value: Option<usize>,
    field: &str,
    valid: impl Fn(usize) -> bool,
) -> Result<usize> {
    match value {
        Some(v) if valid(v) => Ok(v),
        Some(v) => Err(VocabError::Parse(format!(
            "header field `{field}` out of range: {v}"
        ))),
        None => Err(VocabError::Parse(format!("missing `{field}` header"))),
    }
}
