//! Whole-document transforms: option types, page selectors and the invocation wrapper.
//!
//! The transforms themselves live behind [`DocumentTransform`]; this module only checks
//! options against the document and records what ran.

use std::collections::BTreeSet;
use std::ops::RangeInclusive;
use std::time::Instant;

use bytes::Bytes;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

/// Errors from transform validation or execution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    #[error("Invalid page range '{range}': {reason}")]
    InvalidRange { range: String, reason: String },

    #[error("Invalid transform options: {0}")]
    InvalidOptions(String),

    #[error("Expected {expected} input document(s), got {actual}")]
    InputCount { expected: &'static str, actual: usize },

    #[error("Transform '{name}' failed: {reason}")]
    Failed { name: String, reason: String },
}

/// Inclusive 1-based page range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    start: u32,
    end: u32,
}

impl PageRange {
    /// Parse `"N"` or `"start-end"` against a document of `max_pages` pages.
    pub fn parse(text: &str, max_pages: u32) -> Result<Self, TransformError> {
        let range = text.trim();
        let invalid = |reason: String| TransformError::InvalidRange {
            range: range.to_string(),
            reason,
        };

        let Some((start, end)) = range.split_once('-') else {
            let page: i64 = range
                .parse()
                .map_err(|_| invalid("not a page number".to_string()))?;
            if page < 1 || page > i64::from(max_pages) {
                return Err(invalid(format!("page is out of range (1-{max_pages})")));
            }
            let page = page as u32;
            return Ok(Self {
                start: page,
                end: page,
            });
        };
        if end.contains('-') {
            return Err(invalid("use 'start-end' or a single page number".to_string()));
        }

        let (start, end): (i64, i64) = match (start.trim().parse(), end.trim().parse()) {
            (Ok(start), Ok(end)) => (start, end),
            _ => return Err(invalid("bounds must be page numbers".to_string())),
        };
        if start < 1 {
            return Err(invalid("start page cannot be less than 1".to_string()));
        }
        if end > i64::from(max_pages) {
            return Err(invalid(format!("end page cannot exceed {max_pages}")));
        }
        if start > end {
            return Err(invalid("start page cannot be greater than end page".to_string()));
        }
        Ok(Self {
            start: start as u32,
            end: end as u32,
        })
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn end(&self) -> u32 {
        self.end
    }

    pub fn pages(&self) -> RangeInclusive<u32> {
        self.start..=self.end
    }
}

/// How a split divides the document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitMethod {
    /// One output per range, e.g. `["1-3", "7"]`.
    Ranges(Vec<String>),
    /// Split after each listed page.
    AtPages(Vec<u32>),
    /// One output every N pages.
    Interval(u32),
}

/// Pages to drop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RemoveOptions {
    pub pages: Vec<u32>,
    pub ranges: Vec<String>,
    pub even_pages: bool,
    pub odd_pages: bool,
    pub every_nth: Option<u32>,
    /// First page of the `every_nth` sequence (defaults to N).
    pub start_from: Option<u32>,
}

impl RemoveOptions {
    /// Resolve every selector into the set of pages removed.
    pub fn selected(&self, page_count: u32) -> Result<BTreeSet<u32>, TransformError> {
        let mut removed = BTreeSet::new();
        for &page in &self.pages {
            if page < 1 || page > page_count {
                return Err(TransformError::InvalidOptions(format!(
                    "page {page} is out of range (1-{page_count})"
                )));
            }
            removed.insert(page);
        }
        for text in &self.ranges {
            removed.extend(PageRange::parse(text, page_count)?.pages());
        }
        if self.even_pages {
            removed.extend((2..=page_count).step_by(2));
        }
        if self.odd_pages {
            removed.extend((1..=page_count).step_by(2));
        }
        if let Some(n) = self.every_nth {
            if n == 0 {
                return Err(TransformError::InvalidOptions(
                    "every_nth must be at least 1".to_string(),
                ));
            }
            let from = self.start_from.unwrap_or(n).max(1);
            removed.extend((from..=page_count).step_by(n as usize));
        }
        Ok(removed)
    }
}

/// One entry of a reorder: source page plus rotation. Pages may repeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PageInstruction {
    pub page: u32,
    #[serde(default)]
    pub rotation: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WatermarkOptions {
    pub text: String,
    pub rotation: i32,
    /// Percent, 0-100.
    pub opacity: u8,
    pub font_size: u32,
    pub color: String,
    /// Page ranges to stamp; empty means every page.
    pub ranges: Vec<String>,
}

impl Default for WatermarkOptions {
    fn default() -> Self {
        Self {
            text: "CONFIDENTIAL".to_string(),
            rotation: 45,
            opacity: 60,
            font_size: 36,
            color: "#3498db".to_string(),
            ranges: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LockOptions {
    pub open_password: String,
    #[serde(default)]
    pub permissions_password: Option<String>,
    #[serde(default = "default_encryption_level")]
    pub encryption_level: u32,
}

fn default_encryption_level() -> u32 {
    128
}

/// Document info fields to write. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub keywords: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
}

/// Corner or edge a page number is stamped at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageNumberPosition {
    TopLeft,
    TopCenter,
    TopRight,
    BottomLeft,
    #[default]
    BottomCenter,
    BottomRight,
}

/// How a page number is written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageNumberFormat {
    /// `1`
    #[default]
    Number,
    /// `Page 1 of 10`
    PageOfTotal,
    /// `-1-`
    NumberWithDash,
    /// `i`
    RomanLower,
    /// `I`
    RomanUpper,
}

fn roman(mut n: u32) -> String {
    const NUMERALS: [(u32, &str); 13] = [
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];
    let mut out = String::new();
    for &(value, numeral) in &NUMERALS {
        while n >= value {
            out.push_str(numeral);
            n -= value;
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PageNumberOptions {
    pub position: PageNumberPosition,
    pub format: PageNumberFormat,
    pub font_size: u32,
    /// First page (1-based) that gets a number.
    pub start_page: u32,
    /// Number printed on `start_page`.
    pub start_number: u32,
}

impl Default for PageNumberOptions {
    fn default() -> Self {
        Self {
            position: PageNumberPosition::BottomCenter,
            format: PageNumberFormat::Number,
            font_size: 12,
            start_page: 1,
            start_number: 1,
        }
    }
}

impl PageNumberOptions {
    /// Text stamped on `page` of a `page_count`-page document, or `None` before `start_page`.
    pub fn label(&self, page: u32, page_count: u32) -> Option<String> {
        if page < self.start_page {
            return None;
        }
        let number = self.start_number.saturating_add(page - self.start_page);
        Some(match self.format {
            PageNumberFormat::Number => number.to_string(),
            PageNumberFormat::PageOfTotal => format!("Page {number} of {page_count}"),
            PageNumberFormat::NumberWithDash => format!("-{number}-"),
            PageNumberFormat::RomanLower => roman(number).to_lowercase(),
            PageNumberFormat::RomanUpper => roman(number),
        })
    }
}

/// Office format a document is converted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfficeTarget {
    Word,
    PowerPoint,
    Excel,
}

impl OfficeTarget {
    pub fn extension(&self) -> &'static str {
        match self {
            OfficeTarget::Word => "docx",
            OfficeTarget::PowerPoint => "pptx",
            OfficeTarget::Excel => "xlsx",
        }
    }
}

/// Options for one transform invocation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformOptions {
    Merge,
    Split {
        method: SplitMethod,
    },
    RemovePages(RemoveOptions),
    Organize {
        order: Vec<PageInstruction>,
    },
    Crop {
        left: f64,
        top: f64,
        right: f64,
        bottom: f64,
        #[serde(default)]
        ranges: Vec<String>,
    },
    Watermark(WatermarkOptions),
    Compress {
        /// 1-100, lower is smaller.
        quality: u8,
    },
    Lock(LockOptions),
    Unlock {
        password: String,
    },
    Metadata(DocumentMetadata),
    ExtractImages {
        #[serde(default)]
        ranges: Vec<String>,
    },
    RasterizeToFiles {
        scale: f64,
        #[serde(default)]
        ranges: Vec<String>,
    },
    AddPageNumbers(PageNumberOptions),
    ConvertToOffice {
        target: OfficeTarget,
    },
}

fn parse_ranges(ranges: &[String], page_count: u32) -> Result<(), TransformError> {
    for text in ranges {
        PageRange::parse(text, page_count)?;
    }
    Ok(())
}

impl TransformOptions {
    /// Short name used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            TransformOptions::Merge => "merge",
            TransformOptions::Split { .. } => "split",
            TransformOptions::RemovePages(_) => "remove_pages",
            TransformOptions::Organize { .. } => "organize",
            TransformOptions::Crop { .. } => "crop",
            TransformOptions::Watermark(_) => "watermark",
            TransformOptions::Compress { .. } => "compress",
            TransformOptions::Lock(_) => "lock",
            TransformOptions::Unlock { .. } => "unlock",
            TransformOptions::Metadata(_) => "metadata",
            TransformOptions::ExtractImages { .. } => "extract_images",
            TransformOptions::RasterizeToFiles { .. } => "rasterize_to_files",
            TransformOptions::AddPageNumbers(_) => "add_page_numbers",
            TransformOptions::ConvertToOffice { .. } => "convert_to_office",
        }
    }

    /// Check every page selector and numeric bound against a document of `page_count` pages.
    pub fn validate(&self, page_count: u32) -> Result<(), TransformError> {
        let bad = |msg: String| Err(TransformError::InvalidOptions(msg));
        match self {
            TransformOptions::Merge
            | TransformOptions::Metadata(_)
            | TransformOptions::ConvertToOffice { .. } => Ok(()),
            TransformOptions::AddPageNumbers(options) => {
                if options.font_size < 1 {
                    return bad("font size must be at least 1".to_string());
                }
                if options.start_page < 1 || options.start_page > page_count {
                    return bad(format!(
                        "start page {} is out of range (1-{page_count})",
                        options.start_page
                    ));
                }
                Ok(())
            }
            TransformOptions::Split { method } => match method {
                SplitMethod::Ranges(ranges) if ranges.is_empty() => {
                    bad("split needs at least one range".to_string())
                }
                SplitMethod::Ranges(ranges) => parse_ranges(ranges, page_count),
                SplitMethod::AtPages(pages) if pages.is_empty() => {
                    bad("split needs at least one split page".to_string())
                }
                SplitMethod::AtPages(pages) => match pages.iter().find(|&&p| p < 1 || p >= page_count) {
                    Some(page) => bad(format!(
                        "split page {page} must be between 1 and {}",
                        page_count.saturating_sub(1)
                    )),
                    None => Ok(()),
                },
                SplitMethod::Interval(0) => bad("split interval must be at least 1".to_string()),
                SplitMethod::Interval(_) => Ok(()),
            },
            TransformOptions::RemovePages(options) => {
                let removed = options.selected(page_count)?;
                if removed.is_empty() {
                    bad("no pages selected for removal".to_string())
                } else if removed.len() as u32 >= page_count {
                    bad("cannot remove every page".to_string())
                } else {
                    Ok(())
                }
            }
            TransformOptions::Organize { order } => {
                if order.is_empty() {
                    return bad("page order is empty".to_string());
                }
                for instruction in order {
                    if instruction.page < 1 || instruction.page > page_count {
                        return bad(format!(
                            "page {} is out of range (1-{page_count})",
                            instruction.page
                        ));
                    }
                    if !matches!(instruction.rotation, 0 | 90 | 180 | 270) {
                        return bad(format!("unsupported rotation {}", instruction.rotation));
                    }
                }
                Ok(())
            }
            TransformOptions::Crop {
                left,
                top,
                right,
                bottom,
                ranges,
            } => {
                if [left, top, right, bottom]
                    .iter()
                    .any(|m| !m.is_finite() || **m < 0.0)
                {
                    return bad("crop margins must be non-negative".to_string());
                }
                parse_ranges(ranges, page_count)
            }
            TransformOptions::Watermark(options) => {
                if options.text.trim().is_empty() {
                    return bad("watermark text is empty".to_string());
                }
                if options.opacity > 100 {
                    return bad(format!("opacity {} exceeds 100", options.opacity));
                }
                parse_ranges(&options.ranges, page_count)
            }
            TransformOptions::Compress { quality } => {
                if (1..=100).contains(quality) {
                    Ok(())
                } else {
                    bad(format!("quality {quality} must be between 1 and 100"))
                }
            }
            TransformOptions::Lock(options) => {
                if options.open_password.is_empty() {
                    return bad("open password is required".to_string());
                }
                if !matches!(options.encryption_level, 128 | 256) {
                    return bad(format!(
                        "encryption level {} must be 128 or 256",
                        options.encryption_level
                    ));
                }
                Ok(())
            }
            TransformOptions::Unlock { password } if password.is_empty() => {
                bad("password is required".to_string())
            }
            TransformOptions::Unlock { .. } => Ok(()),
            TransformOptions::ExtractImages { ranges } => parse_ranges(ranges, page_count),
            TransformOptions::RasterizeToFiles { scale, ranges } => {
                if !scale.is_finite() || *scale <= 0.0 {
                    return bad(format!("scale must be a positive number, got {scale}"));
                }
                parse_ranges(ranges, page_count)
            }
        }
    }
}

/// Documents handed to a transform.
#[derive(Debug, Clone)]
pub struct TransformInput {
    /// Base name used to derive output names.
    pub name: String,
    pub documents: Vec<Bytes>,
}

/// One produced file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOutput {
    pub name: String,
    pub data: Bytes,
}

/// Whole-document operation: bytes in, bytes out.
pub trait DocumentTransform {
    fn name(&self) -> &str;

    fn apply(
        &self,
        input: &TransformInput,
        options: &TransformOptions,
    ) -> Result<Vec<TransformOutput>, TransformError>;
}

/// Validate `options`, then invoke `transform` exactly once.
///
/// `page_count` is the page count of the first input document.
pub fn run_transform(
    transform: &dyn DocumentTransform,
    input: &TransformInput,
    options: &TransformOptions,
    page_count: u32,
) -> Result<Vec<TransformOutput>, TransformError> {
    let actual = input.documents.len();
    match options {
        TransformOptions::Merge if actual < 2 => {
            return Err(TransformError::InputCount {
                expected: "at least 2",
                actual,
            })
        }
        TransformOptions::Merge => {}
        _ if actual != 1 => {
            return Err(TransformError::InputCount {
                expected: "exactly 1",
                actual,
            })
        }
        _ => {}
    }
    options.validate(page_count)?;

    let t0 = Instant::now();
    match transform.apply(input, options) {
        Ok(outputs) => {
            let bytes: usize = outputs.iter().map(|o| o.data.len()).sum();
            info!(
                transform = transform.name(),
                kind = options.kind(),
                input = %input.name,
                outputs = outputs.len(),
                bytes,
                elapsed_ms = t0.elapsed().as_millis() as u64,
                "transform finished"
            );
            Ok(outputs)
        }
        Err(e) => {
            warn!(
                transform = transform.name(),
                kind = options.kind(),
                error = %e,
                "transform failed"
            );
            Err(e)
        }
    }
}
