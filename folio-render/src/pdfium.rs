use std::convert::TryFrom;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use folio_core::{
    Destination, Document, DocumentInfo, DocumentMetadata, DocumentProvider, Link, LinkTarget,
    RectF, RenderedPage, SearchFlags, SizeF,
};
use parking_lot::Mutex;
use pdfium_render::prelude::*;
use tracing::{debug, instrument, warn};

use crate::{normalized_rect, pdf_edges, top_left_rect};

const LIBRARY_PATH_VAR: &str = "FOLIO_PDFIUM_LIBRARY_PATH";

pub struct PdfiumProvider {
    pdfium: Arc<Pdfium>,
}

impl PdfiumProvider {
    /// Binds Pdfium from `FOLIO_PDFIUM_LIBRARY_PATH`, the working directory or
    /// the system library path, in that order.
    pub fn new() -> Result<Self> {
        let pdfium = match bind_pdfium_from_env() {
            Some(pdfium) => pdfium,
            None => bind_pdfium_default()?,
        };
        Ok(Self {
            pdfium: Arc::new(pdfium),
        })
    }
}

#[async_trait]
impl DocumentProvider for PdfiumProvider {
    #[instrument(skip(self))]
    async fn open(&self, path: &Path) -> Result<Arc<dyn Document>> {
        let absolute = path
            .canonicalize()
            .with_context(|| format!("failed to resolve path for {:?}", path))?;
        let (info, page_sizes) = read_document_info(&self.pdfium, &absolute)?;
        debug!(pages = info.page_count, path = %absolute.display(), "opened document");
        Ok(Arc::new(PdfiumDocument {
            document: Mutex::new(None),
            info,
            page_sizes,
            path: absolute,
            pdfium: Arc::clone(&self.pdfium),
        }))
    }
}

struct PdfiumDocument {
    // Declared before `pdfium` so it is dropped first.
    document: Mutex<Option<PdfDocument<'static>>>,
    info: DocumentInfo,
    page_sizes: Vec<SizeF>,
    path: PathBuf,
    pdfium: Arc<Pdfium>,
}

impl PdfiumDocument {
    fn open_document(&self) -> Result<PdfDocument<'static>> {
        let document = self
            .pdfium
            .load_pdf_from_file(&self.path, None)
            .with_context(|| format!("failed to open {:?}", self.path))?;
        // SAFETY: the document borrows the bindings owned by `self.pdfium`. It
        // lives in `self.document`, which is declared before `self.pdfium` and
        // therefore dropped before it, so the borrow never outlives the
        // bindings.
        let document = unsafe { mem::transmute::<PdfDocument<'_>, PdfDocument<'static>>(document) };
        Ok(document)
    }

    /// Runs `f` on a page, loading the document on first use. Pdfium is not
    /// reentrant, so every call is serialized on the document lock.
    fn with_page<R, F>(&self, index: usize, f: F) -> Result<R>
    where
        F: FnOnce(&PdfPage<'_>) -> Result<R>,
    {
        let mut guard = self.document.lock();
        if guard.is_none() {
            *guard = Some(self.open_document()?);
        }
        let document = guard
            .as_ref()
            .ok_or_else(|| anyhow!("document {:?} is not loaded", self.path))?;
        let page_index = PdfPageIndex::try_from(index)
            .map_err(|_| anyhow!("page {} is out of supported range", index))?;
        let page = document
            .pages()
            .get(page_index)
            .with_context(|| format!("page {} out of range", index))?;
        f(&page)
    }

    fn link_target_from_pdfium(&self, link: &PdfLink<'_>) -> LinkTarget {
        if let Some(action) = link.action() {
            match action.action_type() {
                PdfActionType::GoToDestinationInSameDocument => {
                    if let Some(local) = action.as_local_destination_action() {
                        if let Ok(destination) = local.destination() {
                            if let Ok(page_index) = destination.page_index() {
                                return LinkTarget::Goto(Destination {
                                    page: page_index as usize,
                                    offset: None,
                                });
                            }
                        }
                    }
                }
                PdfActionType::Uri => {
                    if let Some(uri_action) = action.as_uri_action() {
                        if let Ok(url) = uri_action.uri() {
                            if !url.is_empty() {
                                return LinkTarget::Browse { url };
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        if let Some(destination) = link.destination() {
            if let Ok(page_index) = destination.page_index() {
                return LinkTarget::Goto(Destination {
                    page: page_index as usize,
                    offset: None,
                });
            }
        }

        LinkTarget::Unsupported
    }
}

impl Document for PdfiumDocument {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    fn page_size(&self, index: usize) -> Option<SizeF> {
        self.page_sizes.get(index).copied()
    }

    fn links(&self, index: usize) -> Result<Vec<Link>> {
        self.with_page(index, |page| {
            let page_width = page.width().value;
            let page_height = page.height().value;
            if page_width <= 0.0 || page_height <= 0.0 {
                return Ok(Vec::new());
            }

            let mut links = Vec::new();
            for link in page.links().iter() {
                let rect = match link.rect() {
                    Ok(rect) => rect,
                    Err(err) => {
                        warn!(
                            ?err,
                            page = index,
                            path = %self.path.display(),
                            "failed to resolve link rectangle"
                        );
                        continue;
                    }
                };
                let boundary = normalized_rect(
                    rect.left().value,
                    rect.top().value,
                    rect.right().value,
                    rect.bottom().value,
                    page_width,
                    page_height,
                );
                if !boundary.is_valid() {
                    continue;
                }
                links.push(Link {
                    boundary,
                    target: self.link_target_from_pdfium(&link),
                });
            }
            Ok(links)
        })
    }

    #[instrument(skip(self))]
    fn render_page(&self, index: usize, dpi_x: f64, dpi_y: f64) -> Result<RenderedPage> {
        self.with_page(index, |page| {
            let width = (f64::from(page.width().value) * dpi_x / 72.0).round() as i32;
            let height = (f64::from(page.height().value) * dpi_y / 72.0).round() as i32;
            let config = PdfRenderConfig::new().set_target_size(width.max(1), height.max(1));
            let bitmap = page
                .render_with_config(&config)
                .with_context(|| format!("failed to render page {}", index))?;
            Ok(RenderedPage {
                page_index: index,
                width: u32::try_from(bitmap.width()).unwrap_or_default(),
                height: u32::try_from(bitmap.height()).unwrap_or_default(),
                dpi_x,
                dpi_y,
                pixels: bitmap.as_rgba_bytes(),
            })
        })
    }

    fn search_page_text(
        &self,
        index: usize,
        query: &str,
        flags: SearchFlags,
    ) -> Result<Vec<RectF>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        self.with_page(index, |page| {
            let text = page
                .text()
                .with_context(|| format!("failed to extract text for page {}", index))?;
            let options = PdfSearchOptions::new()
                .match_case(flags.case_sensitive)
                .match_whole_word(flags.whole_word);
            let search = text
                .search(query, &options)
                .with_context(|| format!("failed to perform search on page {}", index))?;

            let page_height = page.height().value;
            let mut rects = Vec::new();
            while let Some(segments) = search.find_next() {
                for segment in segments.iter() {
                    let bounds = segment.bounds();
                    let rect = top_left_rect(
                        bounds.left().value,
                        bounds.top().value,
                        bounds.right().value,
                        bounds.bottom().value,
                        page_height,
                    );
                    if !rect.is_empty() {
                        rects.push(rect);
                    }
                }
            }
            Ok(rects)
        })
    }

    fn page_text(&self, index: usize, rect: RectF) -> Result<String> {
        self.with_page(index, |page| {
            let text = page
                .text()
                .with_context(|| format!("failed to extract text for page {}", index))?;
            let (bottom, left, top, right) = pdf_edges(rect, page.height().value);
            Ok(text.inside_rect(PdfRect::new_from_values(bottom, left, top, right)))
        })
    }

    fn link_destination(&self, name: &str) -> Result<Option<Destination>> {
        // Pdfium's named-destination lookup is not exposed by the bindings.
        debug!(name, "named destinations are not resolved by the pdfium backend");
        Ok(None)
    }
}

fn read_document_info(pdfium: &Pdfium, path: &Path) -> Result<(DocumentInfo, Vec<SizeF>)> {
    let document = pdfium
        .load_pdf_from_file(path, None)
        .with_context(|| format!("failed to open {:?}", path))?;
    let page_sizes: Vec<SizeF> = document
        .pages()
        .iter()
        .map(|page| SizeF::new(f64::from(page.width().value), f64::from(page.height().value)))
        .collect();
    let metadata = document.metadata();

    let title = metadata
        .get(PdfDocumentMetadataTagType::Title)
        .map(|t| t.value().to_owned());
    let author = metadata
        .get(PdfDocumentMetadataTagType::Author)
        .map(|t| t.value().to_owned());
    let keywords = metadata
        .get(PdfDocumentMetadataTagType::Keywords)
        .map(|t| t.value().split(',').map(|s| s.trim().to_owned()).collect())
        .unwrap_or_default();

    let info = DocumentInfo {
        path: path.to_path_buf(),
        page_count: page_sizes.len(),
        metadata: DocumentMetadata {
            title,
            author,
            keywords,
        },
    };
    Ok((info, page_sizes))
}

fn bind_pdfium_from_env() -> Option<Pdfium> {
    let path = std::env::var(LIBRARY_PATH_VAR).ok()?;
    if path.is_empty() {
        return None;
    }
    match Pdfium::bind_to_library(&path) {
        Ok(bindings) => Some(Pdfium::new(bindings)),
        Err(err) => {
            warn!(%path, %err, "failed to load Pdfium from {}", LIBRARY_PATH_VAR);
            None
        }
    }
}

fn bind_pdfium_default() -> Result<Pdfium> {
    let mut errors = Vec::new();

    let cwd_path = Pdfium::pdfium_platform_library_name_at_path("./");
    match Pdfium::bind_to_library(&cwd_path) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(err) => errors.push(format!("{}: {}", cwd_path.display(), err)),
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("system: {err}"));
            Err(anyhow!(
                "failed to bind to a pdfium library; set {} or install it ({})",
                LIBRARY_PATH_VAR,
                errors.join(", ")
            ))
        }
    }
}
