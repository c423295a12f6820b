use std::fs;
use std::path::{Path, PathBuf};

use cqa_core::digest::{sha256_hex, sha256_hex_parts};
use cqa_core::domain::{Chunk, ChunkMeta, IndexWarning, SimilarityMetric};
use cqa_core::error::{codes, AppError};
use serde::{Deserialize, Serialize};

use super::VectorIndex;

pub const INDEX_FILE: &str = "index.json";
pub const TEXTS_FILE: &str = "texts.json";
pub const META_FILE: &str = "meta.json";

const FORMAT_VERSION: u32 = 1;

/// On-disk form of the index artifact. Vectors are stored in `vector_id` order.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexArtifact {
    format_version: u32,
    metric: SimilarityMetric,
    normalized: bool,
    dims: usize,
    count: usize,
    embed_model: String,
    build_id: String,
    built_at: String,
    texts_sha256: String,
    meta_sha256: String,
    vectors: Vec<Vec<f32>>,
}

/// Header fields of a persisted index, without the vectors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexInfo {
    pub metric: SimilarityMetric,
    pub dims: usize,
    pub count: usize,
    pub embed_model: String,
    pub build_id: String,
    pub built_at: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactPresence {
    pub index: bool,
    pub texts: bool,
    pub meta: bool,
}

impl ArtifactPresence {
    pub fn complete(&self) -> bool {
        self.index && self.texts && self.meta
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStatus {
    pub ready: bool,
    pub degraded: bool,
    pub index_dir: String,
    pub presence: ArtifactPresence,
    pub info: Option<IndexInfo>,
    pub text_count: usize,
    pub meta_count: usize,
    pub warnings: Vec<IndexWarning>,
}

/// A loaded, query-ready index with its parallel chunk texts and metadata.
///
/// Shared read-only by every query once loaded.
#[derive(Debug, Clone)]
pub struct LoadedIndex {
    pub index: VectorIndex,
    pub texts: Vec<String>,
    pub metas: Vec<ChunkMeta>,
    pub info: IndexInfo,
    pub warnings: Vec<IndexWarning>,
}

impl LoadedIndex {
    /// Assemble from in-memory parts, running the same consistency checks as a disk load.
    pub fn from_parts(
        index: VectorIndex,
        texts: Vec<String>,
        metas: Vec<ChunkMeta>,
        embed_model: &str,
    ) -> Self {
        let info = IndexInfo {
            metric: index.metric(),
            dims: index.dims(),
            count: index.size(),
            embed_model: embed_model.to_string(),
            build_id: String::new(),
            built_at: String::new(),
        };
        let warnings = size_warnings(index.size(), texts.len(), metas.len());
        Self {
            index,
            texts,
            metas,
            info,
            warnings,
        }
    }

    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn text(&self, vector_id: usize) -> Option<&str> {
        self.texts.get(vector_id).map(|s| s.as_str())
    }

    pub fn meta(&self, vector_id: usize) -> Option<&ChunkMeta> {
        self.metas.get(vector_id)
    }
}

fn size_warnings(index_count: usize, text_count: usize, meta_count: usize) -> Vec<IndexWarning> {
    let mut out = Vec::new();
    if text_count != index_count {
        out.push(
            IndexWarning::new(
                codes::INDEX_ARTIFACT_SIZE_MISMATCH,
                "Chunk text count differs from index size; results past the shorter bound are dropped",
            )
            .with_details(format!("index={index_count}; texts={text_count}")),
        );
    }
    if meta_count != text_count {
        out.push(
            IndexWarning::new(
                codes::INDEX_ARTIFACT_SIZE_MISMATCH,
                "Chunk metadata count differs from chunk text count",
            )
            .with_details(format!("texts={text_count}; meta={meta_count}")),
        );
    }
    out
}

/// File-based store for the three coupled artifacts of one index.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn open(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        self.dir.as_path()
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    fn texts_path(&self) -> PathBuf {
        self.dir.join(TEXTS_FILE)
    }

    fn meta_path(&self) -> PathBuf {
        self.dir.join(META_FILE)
    }

    pub fn presence(&self) -> ArtifactPresence {
        ArtifactPresence {
            index: self.index_path().is_file(),
            texts: self.texts_path().is_file(),
            meta: self.meta_path().is_file(),
        }
    }

    fn ensure_dir(&self) -> Result<(), AppError> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            AppError::io(codes::INDEX_WRITE_FAILED, "Failed to create index directory", &self.dir, e)
        })
    }

    /// Persist index, texts and metadata as one set.
    ///
    /// All three files are staged as `*.tmp` first and only then renamed into
    /// place, the index last, so a reader never pairs a new index with stale texts.
    pub fn save(
        &self,
        index: &VectorIndex,
        chunks: &[Chunk],
        embed_model: &str,
        built_at: &str,
    ) -> Result<IndexInfo, AppError> {
        if chunks.len() != index.size() {
            return Err(AppError::new(
                codes::INDEX_WRITE_FAILED,
                "Refusing to persist an index whose size differs from the chunk count",
            )
            .with_details(format!("index={}; chunks={}", index.size(), chunks.len())));
        }
        self.ensure_dir()?;

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let metas: Vec<&ChunkMeta> = chunks.iter().map(|c| &c.metadata).collect();
        let texts_json = encode_json(&texts, "texts")?;
        let meta_json = encode_json(&metas, "metadata")?;
        let texts_sha256 = sha256_hex(texts_json.as_bytes());
        let meta_sha256 = sha256_hex(meta_json.as_bytes());

        let metric_tag = serde_json::to_string(&index.metric()).unwrap_or_default();
        let dims = index.dims().to_string();
        let count = index.size().to_string();
        let build_id = sha256_hex_parts([
            texts_sha256.as_bytes(),
            meta_sha256.as_bytes(),
            metric_tag.as_bytes(),
            dims.as_bytes(),
            count.as_bytes(),
            embed_model.as_bytes(),
        ]);

        let artifact = IndexArtifact {
            format_version: FORMAT_VERSION,
            metric: index.metric(),
            normalized: true,
            dims: index.dims(),
            count: index.size(),
            embed_model: embed_model.to_string(),
            build_id,
            built_at: built_at.to_string(),
            texts_sha256,
            meta_sha256,
            vectors: index.vectors().to_vec(),
        };
        let index_json = encode_json(&artifact, "index")?;

        let staged = [
            (self.texts_path(), texts_json),
            (self.meta_path(), meta_json),
            (self.index_path(), index_json),
        ];
        let mut tmps: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(staged.len());
        for (path, body) in staged.iter() {
            let tmp = path.with_extension("json.tmp");
            if let Err(e) = fs::write(&tmp, body.as_bytes()) {
                // A failed write may still have created a partial file.
                remove_staged(tmps.iter().map(|(t, _)| t.as_path()).chain([tmp.as_path()]));
                return Err(AppError::io(
                    codes::INDEX_WRITE_FAILED,
                    "Failed to stage index artifact",
                    &tmp,
                    e,
                ));
            }
            tmps.push((tmp, path.clone()));
        }
        for (tmp, dest) in tmps {
            fs::rename(&tmp, &dest).map_err(|e| {
                AppError::new(codes::INDEX_WRITE_FAILED, "Failed to finalize index artifact write")
                    .with_details(format!(
                        "tmp={}; dest={}; err={}",
                        tmp.display(),
                        dest.display(),
                        e
                    ))
            })?;
        }

        tracing::info!(
            dir = %self.dir.display(),
            count = artifact.count,
            dims = artifact.dims,
            build_id = %artifact.build_id,
            "index artifacts written"
        );
        Ok(info_of(&artifact))
    }

    /// Load the artifact set. A missing file is fatal (`INDEX_MISSING_ARTIFACT`);
    /// size or checksum divergence loads in degraded mode with warnings.
    pub fn try_load(&self) -> Result<LoadedIndex, AppError> {
        let presence = self.presence();
        if !presence.complete() {
            return Err(AppError::new(
                codes::INDEX_MISSING_ARTIFACT,
                "Index artifacts missing; build the index first",
            )
            .with_details(format!(
                "dir={}; index={}; texts={}; meta={}",
                self.dir.display(),
                presence.index,
                presence.texts,
                presence.meta
            )));
        }

        let index_bytes = read_artifact(&self.index_path())?;
        let texts_bytes = read_artifact(&self.texts_path())?;
        let meta_bytes = read_artifact(&self.meta_path())?;

        let artifact: IndexArtifact = decode_json(&index_bytes, &self.index_path())?;
        let texts: Vec<String> = decode_json(&texts_bytes, &self.texts_path())?;
        let metas: Vec<ChunkMeta> = decode_json(&meta_bytes, &self.meta_path())?;

        if artifact.format_version != FORMAT_VERSION {
            return Err(AppError::new(
                codes::INDEX_DECODE_FAILED,
                "Unsupported index format version; rebuild the index",
            )
            .with_details(format!("version={}", artifact.format_version)));
        }
        if !artifact.normalized {
            return Err(AppError::new(
                codes::INDEX_NOT_NORMALIZED,
                "Index was not built from unit-normalized vectors; rebuild the index",
            ));
        }
        if artifact.count != artifact.vectors.len() {
            return Err(AppError::new(
                codes::INDEX_DECODE_FAILED,
                "Index header count differs from stored vectors",
            )
            .with_details(format!(
                "count={}; vectors={}",
                artifact.count,
                artifact.vectors.len()
            )));
        }

        let info = info_of(&artifact);
        let mut warnings = size_warnings(artifact.count, texts.len(), metas.len());
        if sha256_hex(&texts_bytes) != artifact.texts_sha256
            || sha256_hex(&meta_bytes) != artifact.meta_sha256
        {
            warnings.push(
                IndexWarning::new(
                    codes::INDEX_CHECKSUM_MISMATCH,
                    "Chunk texts or metadata were modified after the index was built",
                )
                .with_details(format!("build_id={}", artifact.build_id)),
            );
        }

        let index = VectorIndex::build(artifact.vectors, artifact.metric).map_err(|e| {
            AppError::new(e.code.clone(), "Stored index vectors are invalid; rebuild the index")
                .with_details(e.details.unwrap_or(e.message))
        })?;

        for w in warnings.iter() {
            tracing::warn!(
                code = %w.code,
                details = w.details.as_deref().unwrap_or(""),
                "{}",
                w.message
            );
        }
        tracing::info!(
            dir = %self.dir.display(),
            count = info.count,
            texts = texts.len(),
            degraded = !warnings.is_empty(),
            "index loaded"
        );

        Ok(LoadedIndex {
            index,
            texts,
            metas,
            info,
            warnings,
        })
    }

    /// Summary for status displays; never fails on a missing or degraded index.
    pub fn status(&self) -> IndexStatus {
        let presence = self.presence();
        let base = IndexStatus {
            ready: false,
            degraded: false,
            index_dir: self.dir.display().to_string(),
            presence,
            info: None,
            text_count: 0,
            meta_count: 0,
            warnings: Vec::new(),
        };
        if !presence.complete() {
            return base;
        }
        match self.try_load() {
            Ok(loaded) => IndexStatus {
                ready: true,
                degraded: loaded.is_degraded(),
                text_count: loaded.texts.len(),
                meta_count: loaded.metas.len(),
                info: Some(loaded.info),
                warnings: loaded.warnings,
                ..base
            },
            Err(e) => IndexStatus {
                warnings: vec![IndexWarning {
                    code: e.code,
                    message: e.message,
                    details: e.details,
                }],
                ..base
            },
        }
    }
}

fn info_of(a: &IndexArtifact) -> IndexInfo {
    IndexInfo {
        metric: a.metric,
        dims: a.dims,
        count: a.count,
        embed_model: a.embed_model.clone(),
        build_id: a.build_id.clone(),
        built_at: a.built_at.clone(),
    }
}

/// Best-effort cleanup of staged `*.json.tmp` files. Only regular files are removed.
fn remove_staged<'a>(paths: impl IntoIterator<Item = &'a Path>) {
    for p in paths {
        if p.is_file() {
            if let Err(e) = fs::remove_file(p) {
                tracing::warn!(path = %p.display(), err = %e, "failed to remove staged artifact");
            }
        }
    }
}

fn encode_json<T: Serialize + ?Sized>(value: &T, what: &str) -> Result<String, AppError> {
    serde_json::to_string(value).map_err(|e| {
        AppError::new(codes::INDEX_WRITE_FAILED, format!("Failed to encode {what}"))
            .with_details(e.to_string())
    })
}

fn read_artifact(path: &Path) -> Result<Vec<u8>, AppError> {
    fs::read(path).map_err(|e| {
        let code = if e.kind() == std::io::ErrorKind::NotFound {
            codes::INDEX_MISSING_ARTIFACT
        } else {
            codes::INDEX_DECODE_FAILED
        };
        AppError::io(code, "Failed to read index artifact", path, e)
    })
}

fn decode_json<T: for<'de> Deserialize<'de>>(bytes: &[u8], path: &Path) -> Result<T, AppError> {
    serde_json::from_slice(bytes).map_err(|e| {
        AppError::io(codes::INDEX_DECODE_FAILED, "Failed to decode index artifact", path, e)
    })
}
