use std::path::Path;

use pdfium_render::prelude::*;
use tracing::debug;

use crate::config::RenderConfig;
use crate::error::{DocToolError, Result};
use crate::model::PageSize;

/// Access to a built PDF. Pages are 1-based throughout.
pub trait DocumentRenderer: Send + Sync {
    fn page_count(&self, pdf: &Path) -> Result<usize>;

    fn page_size(&self, pdf: &Path, page: u32) -> Result<PageSize>;

    fn page_text(&self, pdf: &Path, page: u32) -> Result<String>;

    /// Rasterize `page` at `scale` times its natural size and write a PNG.
    /// Returns the pixel dimensions.
    fn render_page(&self, pdf: &Path, page: u32, scale: f32, out: &Path) -> Result<(u32, u32)>;
}

pub fn check_page(page: u32, count: usize) -> Result<()> {
    if page == 0 || page as usize > count {
        return Err(DocToolError::PageOutOfRange { page, count });
    }
    Ok(())
}

/// Renderer backed by the pdfium library, bound at call time.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRenderer {
    library_dir: Option<String>,
}

impl PdfiumRenderer {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            library_dir: config.pdfium_library_path.clone(),
        }
    }

    fn pdfium(&self) -> Result<Pdfium> {
        let bindings = match &self.library_dir {
            Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir.as_str())),
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| DocToolError::Render(format!("failed to load pdfium: {e:?}")))?;
        Ok(Pdfium::new(bindings))
    }

    fn with_page<T>(&self, pdf: &Path, page: u32, f: impl FnOnce(&PdfPage<'_>) -> Result<T>) -> Result<T> {
        let pdfium = self.pdfium()?;
        let document = pdfium
            .load_pdf_from_file(pdf, None)
            .map_err(|e| DocToolError::Render(format!("cannot open {}: {e:?}", pdf.display())))?;
        let pages = document.pages();
        check_page(page, pages.len() as usize)?;
        let pdf_page = pages
            .get((page - 1) as PdfPageIndex)
            .map_err(|e| DocToolError::Render(format!("cannot load page {page}: {e:?}")))?;
        f(&pdf_page)
    }
}

impl DocumentRenderer for PdfiumRenderer {
    fn page_count(&self, pdf: &Path) -> Result<usize> {
        let pdfium = self.pdfium()?;
        let document = pdfium
            .load_pdf_from_file(pdf, None)
            .map_err(|e| DocToolError::Render(format!("cannot open {}: {e:?}", pdf.display())))?;
        let count = document.pages().len() as usize;
        debug!(pdf = %pdf.display(), count, "counted pages");
        Ok(count)
    }

    fn page_size(&self, pdf: &Path, page: u32) -> Result<PageSize> {
        self.with_page(pdf, page, |p| {
            Ok(PageSize {
                width: p.width().value,
                height: p.height().value,
            })
        })
    }

    fn page_text(&self, pdf: &Path, page: u32) -> Result<String> {
        self.with_page(pdf, page, |p| {
            let text = p
                .text()
                .map_err(|e| DocToolError::Render(format!("text extraction failed: {e:?}")))?;
            Ok(text.all())
        })
    }

    fn render_page(&self, pdf: &Path, page: u32, scale: f32, out: &Path) -> Result<(u32, u32)> {
        self.with_page(pdf, page, |p| {
            let config = PdfRenderConfig::new().scale_page_by_factor(scale);
            let bitmap = p
                .render_with_config(&config)
                .map_err(|e| DocToolError::Render(format!("rasterization failed: {e:?}")))?;
            let raster = bitmap.as_image();
            if let Some(parent) = out.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            raster
                .save_with_format(out, image::ImageFormat::Png)
                .map_err(|e| DocToolError::Render(format!("cannot write {}: {e}", out.display())))?;
            debug!(out = %out.display(), width = raster.width(), height = raster.height(), "page rendered");
            Ok((raster.width(), raster.height()))
        })
    }
}
