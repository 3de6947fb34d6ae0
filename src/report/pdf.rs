//! Themed A4 page builder shared by all reports
//!
//! Pages use a dark background with a title/subtitle header and a
//! "Generated / Page n" footer. Content flows top to bottom; a new page is
//! started automatically when a block does not fit.

use chrono::Local;
use image::DynamicImage;
use printpdf::path::PaintMode;
use printpdf::{
    BuiltinFont, Color, Image, ImageTransform, IndirectFontRef, Mm, PdfDocument,
    PdfDocumentReference, PdfLayerReference, Rect, Rgb,
};

use crate::utils::error::{CarXplainError, Result};

pub const PAGE_WIDTH: f32 = 210.0;
pub const PAGE_HEIGHT: f32 = 297.0;
pub const MARGIN_X: f32 = 15.0;
const CONTENT_TOP: f32 = PAGE_HEIGHT - 42.0;
const CONTENT_BOTTOM: f32 = 22.0;
const IMAGE_DPI: f32 = 300.0;

pub const COLOR_BACKGROUND: [u8; 3] = [0x02, 0x0c, 0x1a];
pub const COLOR_PANEL: [u8; 3] = [0x0b, 0x1d, 0x36];
pub const COLOR_PANEL_ALT: [u8; 3] = [0x05, 0x14, 0x26];
pub const COLOR_NEON: [u8; 3] = [0x00, 0xcc, 0xff];
pub const COLOR_DIM: [u8; 3] = [0x88, 0x99, 0xa6];
pub const COLOR_TEXT: [u8; 3] = [0xff, 0xff, 0xff];
pub const COLOR_GOLD: [u8; 3] = [0xff, 0xd7, 0x00];

fn color(rgb: [u8; 3]) -> Color {
    Color::Rgb(Rgb::new(
        rgb[0] as f32 / 255.0,
        rgb[1] as f32 / 255.0,
        rgb[2] as f32 / 255.0,
        None,
    ))
}

fn report_error(e: impl std::fmt::Debug) -> CarXplainError {
    CarXplainError::Report(format!("{:?}", e))
}

/// Rough Helvetica advance width in millimetres
pub fn text_width_mm(text: &str, font_size: f32) -> f32 {
    text.chars().count() as f32 * font_size * 0.5 * 0.3528
}

/// Greedy word wrap to at most `max_chars` per line
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    for word in text.split_whitespace() {
        if !line.is_empty() && line.len() + 1 + word.len() > max_chars {
            lines.push(std::mem::take(&mut line));
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(word);
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

/// Size in mm of an image scaled to fit inside `max_w` x `max_h`, keeping aspect
pub fn fit_within(width_px: u32, height_px: u32, max_w: f32, max_h: f32) -> (f32, f32) {
    if width_px == 0 || height_px == 0 {
        return (0.0, 0.0);
    }
    let aspect = height_px as f32 / width_px as f32;
    let w = max_w.min(max_h / aspect);
    (w, w * aspect)
}

pub struct ReportBuilder {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    title: String,
    subtitle: String,
    generated: String,
    page_number: usize,
    cursor: f32,
}

impl ReportBuilder {
    pub fn new(title: &str, subtitle: &str) -> Result<Self> {
        let (doc, page, layer) = PdfDocument::new(
            format!("{} {}", title, subtitle),
            Mm(PAGE_WIDTH),
            Mm(PAGE_HEIGHT),
            "Layer 1",
        );
        let layer = doc.get_page(page).get_layer(layer);
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(report_error)?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(report_error)?;

        let mut builder = Self {
            doc,
            layer,
            regular,
            bold,
            title: title.to_string(),
            subtitle: subtitle.to_string(),
            generated: Local::now().format("%Y-%m-%d %H:%M").to_string(),
            page_number: 1,
            cursor: CONTENT_TOP,
        };
        builder.decorate_page();
        Ok(builder)
    }

    fn fill_rect(&self, x: f32, y: f32, w: f32, h: f32, rgb: [u8; 3]) {
        self.layer.set_fill_color(color(rgb));
        self.layer.add_rect(
            Rect::new(Mm(x), Mm(y), Mm(x + w), Mm(y + h)).with_mode(PaintMode::Fill),
        );
    }

    fn text(&self, text: &str, size: f32, x: f32, y: f32, bold: bool, rgb: [u8; 3]) {
        self.layer.set_fill_color(color(rgb));
        let font = if bold { &self.bold } else { &self.regular };
        self.layer.use_text(text, size, Mm(x), Mm(y), font);
    }

    fn decorate_page(&mut self) {
        self.fill_rect(0.0, 0.0, PAGE_WIDTH, PAGE_HEIGHT, COLOR_BACKGROUND);

        let title_y = PAGE_HEIGHT - 20.0;
        self.text(&self.title, 24.0, MARGIN_X, title_y, true, COLOR_TEXT);
        let sub_x = MARGIN_X + text_width_mm(&self.title, 24.0) + 2.0;
        self.text(&self.subtitle, 18.0, sub_x, title_y, true, COLOR_NEON);
        self.fill_rect(MARGIN_X, PAGE_HEIGHT - 25.0, PAGE_WIDTH - 2.0 * MARGIN_X, 0.3, COLOR_NEON);

        let generated = format!("Generated: {}", self.generated);
        self.text(&generated, 8.0, MARGIN_X, 12.0, false, COLOR_DIM);
        let page = format!("Page {}", self.page_number);
        let page_x = PAGE_WIDTH - MARGIN_X - text_width_mm(&page, 8.0);
        self.text(&page, 8.0, page_x, 12.0, false, COLOR_DIM);
    }

    /// Start a new page
    pub fn page_break(&mut self) {
        let (page, layer) = self.doc.add_page(
            Mm(PAGE_WIDTH),
            Mm(PAGE_HEIGHT),
            format!("Page {}", self.page_number + 1),
        );
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.page_number += 1;
        self.cursor = CONTENT_TOP;
        self.decorate_page();
    }

    fn ensure_space(&mut self, height: f32) {
        if self.cursor - height < CONTENT_BOTTOM {
            self.page_break();
        }
    }

    pub fn page_count(&self) -> usize {
        self.page_number
    }

    pub fn spacer(&mut self, height: f32) {
        self.cursor -= height;
    }

    /// Neon section heading, e.g. `01 // SUMMARY RESULTS`
    pub fn heading(&mut self, text: &str) {
        self.ensure_space(14.0);
        self.cursor -= 8.0;
        self.text(text, 15.0, MARGIN_X, self.cursor, true, COLOR_NEON);
        self.cursor -= 6.0;
    }

    pub fn paragraph(&mut self, text: &str) {
        for line in wrap_text(text, 95) {
            self.ensure_space(5.0);
            self.cursor -= 5.0;
            self.text(&line, 10.0, MARGIN_X, self.cursor, false, COLOR_TEXT);
        }
        self.cursor -= 2.0;
    }

    /// Two-column label/value table
    pub fn key_value_table(&mut self, rows: &[(&str, String)]) {
        let width = PAGE_WIDTH - 2.0 * MARGIN_X;
        let label_w = width * 0.3;
        let row_h = 9.0;

        for (label, value) in rows {
            self.ensure_space(row_h);
            let y = self.cursor - row_h;
            self.fill_rect(MARGIN_X, y, label_w, row_h - 0.4, COLOR_PANEL);
            self.fill_rect(MARGIN_X + label_w, y, width - label_w, row_h - 0.4, COLOR_PANEL_ALT);
            self.text(label, 10.0, MARGIN_X + 3.0, y + 3.0, true, COLOR_TEXT);
            self.text(value, 10.0, MARGIN_X + label_w + 3.0, y + 3.0, false, COLOR_TEXT);
            self.cursor = y;
        }
        self.fill_rect(MARGIN_X, self.cursor - 0.5, width, 0.5, COLOR_NEON);
        self.cursor -= 4.0;
    }

    /// Equal-width table with a highlighted header row
    pub fn table(&mut self, headers: &[&str], rows: &[Vec<String>]) {
        if headers.is_empty() {
            return;
        }
        let width = PAGE_WIDTH - 2.0 * MARGIN_X;
        let col_w = width / headers.len() as f32;
        let row_h = 9.0;

        self.ensure_space(row_h * 2.0);
        let y = self.cursor - row_h;
        self.fill_rect(MARGIN_X, y, width, row_h, COLOR_PANEL);
        for (i, header) in headers.iter().enumerate() {
            self.text(header, 9.0, MARGIN_X + col_w * i as f32 + 3.0, y + 3.0, true, COLOR_NEON);
        }
        self.cursor = y;

        for (r, row) in rows.iter().enumerate() {
            self.ensure_space(row_h);
            let y = self.cursor - row_h;
            let fill = if r % 2 == 0 { COLOR_PANEL_ALT } else { COLOR_BACKGROUND };
            self.fill_rect(MARGIN_X, y, width, row_h, fill);
            for (i, cell) in row.iter().take(headers.len()).enumerate() {
                let shown: String = cell.chars().take(34).collect();
                self.text(&shown, 9.0, MARGIN_X + col_w * i as f32 + 3.0, y + 3.0, i == 0, COLOR_TEXT);
            }
            self.cursor = y;
        }
        self.fill_rect(MARGIN_X, self.cursor - 0.5, width, 0.5, COLOR_NEON);
        self.cursor -= 4.0;
    }

    /// Equal-width columns: dim header row, large neon values
    pub fn kpi_row(&mut self, items: &[(&str, String)]) {
        if items.is_empty() {
            return;
        }
        let width = PAGE_WIDTH - 2.0 * MARGIN_X;
        let col_w = width / items.len() as f32;
        let height = 20.0;
        self.ensure_space(height);
        let y = self.cursor - height;
        self.fill_rect(MARGIN_X, y, width, height, COLOR_PANEL);

        for (i, (label, value)) in items.iter().enumerate() {
            let center = MARGIN_X + col_w * (i as f32 + 0.5);
            self.text(label, 8.0, center - text_width_mm(label, 8.0) / 2.0, y + 14.0, false, COLOR_DIM);
            self.text(value, 16.0, center - text_width_mm(value, 16.0) / 2.0, y + 4.0, true, COLOR_NEON);
        }
        self.cursor = y - 6.0;
    }

    /// Single-row table of bold cells on a panel with a gold top rule
    pub fn info_row(&mut self, cells: &[String]) {
        if cells.is_empty() {
            return;
        }
        let width = PAGE_WIDTH - 2.0 * MARGIN_X;
        let col_w = width / cells.len() as f32;
        let height = 9.0;
        self.ensure_space(height + 1.0);
        let y = self.cursor - height;
        self.fill_rect(MARGIN_X, y, width, height, COLOR_PANEL);
        self.fill_rect(MARGIN_X, y + height, width, 0.6, COLOR_GOLD);
        for (i, cell) in cells.iter().enumerate() {
            self.text(cell, 9.0, MARGIN_X + col_w * i as f32 + 3.0, y + 3.0, true, COLOR_TEXT);
        }
        self.cursor = y - 5.0;
    }

    /// Images side by side, each fitted into `max_w` x `max_h` mm, with captions
    pub fn image_row(&mut self, images: &[(&DynamicImage, &str)], max_w: f32, max_h: f32) {
        if images.is_empty() {
            return;
        }
        self.ensure_space(max_h + 8.0);
        let top = self.cursor;
        let slot_w = (PAGE_WIDTH - 2.0 * MARGIN_X) / images.len() as f32;

        for (i, (image, caption)) in images.iter().enumerate() {
            let (w, h) = fit_within(image.width(), image.height(), max_w.min(slot_w - 4.0), max_h);
            let x = MARGIN_X + slot_w * i as f32 + (slot_w - w) / 2.0;
            self.place_image(image, x, top - h, w);
            let cx = MARGIN_X + slot_w * (i as f32 + 0.5) - text_width_mm(caption, 10.0) / 2.0;
            self.text(caption, 10.0, cx, top - max_h - 6.0, false, COLOR_TEXT);
        }
        self.cursor = top - max_h - 10.0;
    }

    /// One image fitted into `max_w` x `max_h` mm at the left margin
    pub fn image(&mut self, image: &DynamicImage, max_w: f32, max_h: f32) {
        let (w, h) = fit_within(image.width(), image.height(), max_w, max_h);
        if w <= 0.0 {
            return;
        }
        self.ensure_space(h + 4.0);
        self.place_image(image, MARGIN_X, self.cursor - h, w);
        self.cursor -= h + 4.0;
    }

    fn place_image(&self, image: &DynamicImage, x: f32, y: f32, width_mm: f32) {
        let native_w = image.width() as f32 / IMAGE_DPI * 25.4;
        if native_w <= 0.0 {
            return;
        }
        let scale = width_mm / native_w;
        // printpdf embeds RGB without alpha
        let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
        Image::from_dynamic_image(&rgb).add_to_layer(
            self.layer.clone(),
            ImageTransform {
                translate_x: Some(Mm(x)),
                translate_y: Some(Mm(y)),
                scale_x: Some(scale),
                scale_y: Some(scale),
                dpi: Some(IMAGE_DPI),
                ..Default::default()
            },
        );
    }

    /// Horizontal bars scaled to the largest value
    pub fn bar_chart(&mut self, bars: &[(String, f32)], value_label: impl Fn(f32) -> String) {
        let max = bars.iter().map(|(_, v)| *v).fold(0.0f32, f32::max);
        let width = PAGE_WIDTH - 2.0 * MARGIN_X;
        let label_w = width * 0.38;
        let bar_area = width - label_w - 22.0;
        let row_h = 8.0;

        for (label, value) in bars {
            self.ensure_space(row_h);
            let y = self.cursor - row_h;
            let shown: String = label.chars().take(40).collect();
            self.text(&shown, 9.0, MARGIN_X, y + 2.5, false, COLOR_TEXT);

            let fraction = if max > 0.0 { (value / max).clamp(0.0, 1.0) } else { 0.0 };
            self.fill_rect(MARGIN_X + label_w, y + 1.0, bar_area, row_h - 3.0, COLOR_PANEL);
            if fraction > 0.0 {
                self.fill_rect(MARGIN_X + label_w, y + 1.0, bar_area * fraction, row_h - 3.0, COLOR_NEON);
            }
            let text = value_label(*value);
            self.text(&text, 9.0, MARGIN_X + label_w + bar_area + 2.0, y + 2.5, true, COLOR_NEON);
            self.cursor = y;
        }
        self.cursor -= 4.0;
    }

    pub fn finish(self) -> Result<Vec<u8>> {
        self.doc.save_to_bytes().map_err(report_error)
    }
}
