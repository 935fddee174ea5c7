//! On-screen region bound to each page slot.

/// What a region currently shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionContent {
    /// Page-sized placeholder with the page label.
    Placeholder,
    /// The slot's rendered artifact.
    Page,
    /// Failure indicator with a message.
    Error(String),
}

/// Display region for one page. Lives as long as its slot.
#[derive(Debug, Clone)]
pub struct DisplayRegion {
    index: u32,
    content: RegionContent,
}

impl DisplayRegion {
    pub(crate) fn new(index: u32) -> Self {
        Self {
            index,
            content: RegionContent::Placeholder,
        }
    }

    /// Page index (1-based) this region belongs to.
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn content(&self) -> &RegionContent {
        &self.content
    }

    /// Label drawn on the placeholder.
    pub fn label(&self) -> String {
        format!("Page {}", self.index)
    }

    pub(crate) fn show_placeholder(&mut self) {
        self.content = RegionContent::Placeholder;
    }

    pub(crate) fn show_page(&mut self) {
        self.content = RegionContent::Page;
    }

    pub(crate) fn show_error(&mut self) {
        self.content = RegionContent::Error(format!("Failed to render page {}", self.index));
    }
}
