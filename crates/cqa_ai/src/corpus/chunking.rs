use std::collections::HashSet;

use cqa_core::config::{ChunkMode, ChunkingConfig};
use cqa_core::digest::sha256_hex;
use cqa_core::domain::{Chunk, ChunkMeta};
use cqa_core::error::AppError;
use cqa_core::ingest::DocumentMap;
use cqa_core::normalize::{clean_text, clean_text_keep_paragraphs, normalize_newlines};

/// Boundary preference for [`ChunkMode::Recursive`], coarsest first. Raw
/// character cuts are the last resort.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// A window over one prepared document, in character offsets (end exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start: usize,
    end: usize,
}

/// Chunk with only the size parameters set: character windows, no cleaning.
pub fn chunk(
    documents: &DocumentMap,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<Chunk>, AppError> {
    let cfg = ChunkingConfig {
        chunk_size,
        overlap,
        clean_text: false,
        ..ChunkingConfig::default()
    };
    chunk_documents(documents, &cfg)
}

/// Split every document into overlapping chunks.
///
/// Documents are visited in ascending `source_id` order, so identical input
/// yields an identical chunk sequence (and therefore identical vector ids).
pub fn chunk_documents(
    documents: &DocumentMap,
    cfg: &ChunkingConfig,
) -> Result<Vec<Chunk>, AppError> {
    cfg.validate()?;

    let mut out = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut skipped_short = 0usize;
    let mut dropped_dupes = 0usize;

    for (source_id, raw) in documents.iter() {
        let text = prepare(raw, cfg);
        if text.trim().chars().count() < cfg.min_document_chars {
            skipped_short += 1;
            tracing::debug!(source_id = %source_id, "document below minimum length; skipped");
            continue;
        }

        let pieces = match cfg.mode {
            ChunkMode::Chars => {
                slice_spans(&text, char_windows(&text, cfg.chunk_size, cfg.overlap))
            }
            ChunkMode::Words => word_windows(&text, cfg.chunk_size, cfg.overlap),
            ChunkMode::Recursive => {
                slice_spans(&text, recursive_spans(&text, cfg.chunk_size, cfg.overlap))
            }
        };

        let mut chunk_index: u32 = 0;
        for (span, piece) in pieces {
            if piece.trim().is_empty() {
                continue;
            }
            let text_sha256 = sha256_hex(piece.as_bytes());
            let index_here = chunk_index;
            chunk_index += 1;
            if cfg.dedup && !seen.insert(text_sha256.clone()) {
                dropped_dupes += 1;
                continue;
            }
            out.push(Chunk {
                text: piece,
                metadata: ChunkMeta {
                    source_id: source_id.clone(),
                    chunk_index: index_here,
                    char_start: to_u32(span.start),
                    char_end: to_u32(span.end),
                    text_sha256,
                },
            });
        }
    }

    tracing::info!(
        documents = documents.len(),
        chunks = out.len(),
        skipped_short,
        dropped_dupes,
        mode = ?cfg.mode,
        "chunking finished"
    );
    Ok(out)
}

fn to_u32(n: usize) -> u32 {
    n.min(u32::MAX as usize) as u32
}

fn slice_spans(text: &str, spans: Vec<Span>) -> Vec<(Span, String)> {
    let chars: Vec<char> = text.chars().collect();
    spans
        .into_iter()
        .map(|s| (s, chars[s.start..s.end].iter().collect()))
        .collect()
}

fn prepare(raw: &str, cfg: &ChunkingConfig) -> String {
    match (cfg.clean_text, cfg.mode) {
        (true, ChunkMode::Recursive) => clean_text_keep_paragraphs(raw),
        (true, _) => clean_text(raw),
        (false, _) => normalize_newlines(raw),
    }
}

/// Fixed windows start at `0, step, 2*step, ...`; the window that reaches
/// the end of the stream is the last one.
fn fixed_windows(len: usize, size: usize, overlap: usize) -> Vec<Span> {
    let step = size - overlap;
    let mut out = Vec::new();
    let mut start = 0usize;
    while start < len {
        let end = (start + size).min(len);
        out.push(Span { start, end });
        if end == len {
            break;
        }
        start += step;
    }
    out
}

fn char_windows(text: &str, size: usize, overlap: usize) -> Vec<Span> {
    fixed_windows(text.chars().count(), size, overlap)
}

/// Word windows are re-joined with single spaces; offsets point at the first
/// and last word in the prepared text.
fn word_windows(text: &str, size: usize, overlap: usize) -> Vec<(Span, String)> {
    let mut words: Vec<(usize, usize, &str)> = Vec::new();
    let mut char_pos = 0usize;
    let mut current: Option<(usize, usize)> = None; // (char start, byte start)
    for (byte, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if let Some((cs, bs)) = current.take() {
                words.push((cs, char_pos, &text[bs..byte]));
            }
        } else if current.is_none() {
            current = Some((char_pos, byte));
        }
        char_pos += 1;
    }
    if let Some((cs, bs)) = current {
        words.push((cs, char_pos, &text[bs..]));
    }

    fixed_windows(words.len(), size, overlap)
        .into_iter()
        .map(|w| {
            let slice = &words[w.start..w.end];
            let joined = slice.iter().map(|(_, _, s)| *s).collect::<Vec<_>>().join(" ");
            let span = Span {
                start: slice[0].0,
                end: slice[slice.len() - 1].1,
            };
            (span, joined)
        })
        .collect()
}

/// Boundary-aware chunking: split into atoms no longer than `size`, then pack
/// them greedily, carrying a tail of at most `overlap` characters forward.
fn recursive_spans(text: &str, size: usize, overlap: usize) -> Vec<Span> {
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(b, _)| b)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_of = |byte: usize| boundaries.binary_search(&byte).unwrap_or_else(|i| i);

    let mut atoms_bytes = Vec::new();
    split_atoms(text, 0, text.len(), size, 0, &mut atoms_bytes);
    let atoms: Vec<Span> = atoms_bytes
        .into_iter()
        .map(|(s, e)| Span {
            start: char_of(s),
            end: char_of(e),
        })
        .filter(|s| s.end > s.start)
        .collect();
    let len_of = |from: usize, to: usize| -> usize {
        if from >= to {
            0
        } else {
            atoms[to - 1].end - atoms[from].start
        }
    };

    let chars: Vec<char> = text.chars().collect();
    let mut out = Vec::new();
    let mut i = 0usize;
    while i < atoms.len() {
        let mut j = i + 1;
        while j < atoms.len() && len_of(i, j + 1) <= size {
            j += 1;
        }
        out.push(trim_span(&chars, atoms[i].start, atoms[j - 1].end));
        if j == atoms.len() {
            break;
        }
        // Earliest carry-over start whose tail fits the overlap and still
        // leaves room for the next atom. `k == j` means no carry-over.
        let next = j;
        let mut k = i + 1;
        while k < next && (len_of(k, next) > overlap || len_of(k, next + 1) > size) {
            k += 1;
        }
        i = k;
    }
    out
}

fn trim_span(chars: &[char], mut start: usize, mut end: usize) -> Span {
    while start < end && chars[start].is_whitespace() {
        start += 1;
    }
    while end > start && chars[end - 1].is_whitespace() {
        end -= 1;
    }
    Span { start, end }
}

/// Byte ranges covering `text[start..end]` in order, each at most `max_chars`
/// characters. Separators stay attached to the piece they terminate.
fn split_atoms(
    text: &str,
    start: usize,
    end: usize,
    max_chars: usize,
    level: usize,
    out: &mut Vec<(usize, usize)>,
) {
    let piece = &text[start..end];
    if piece.chars().count() <= max_chars {
        out.push((start, end));
        return;
    }
    match SEPARATORS.get(level) {
        Some(sep) => {
            let mut cursor = start;
            for (pos, m) in piece.match_indices(sep) {
                let cut = start + pos + m.len();
                if cut > cursor && cut < end {
                    split_atoms(text, cursor, cut, max_chars, level + 1, out);
                    cursor = cut;
                }
            }
            if cursor < end {
                split_atoms(text, cursor, end, max_chars, level + 1, out);
            }
        }
        None => {
            let mut count = 0usize;
            let mut seg_start = start;
            for (off, _) in piece.char_indices() {
                if count == max_chars {
                    out.push((seg_start, start + off));
                    seg_start = start + off;
                    count = 0;
                }
                count += 1;
            }
            out.push((seg_start, end));
        }
    }
}
