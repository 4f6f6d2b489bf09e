//! Page-number pagination shared by every listing.
//!
//! All feeds slice a stable, descending-`pub_date` ordering into fixed-size
//! pages. Out-of-range page numbers yield an empty page rather than an error,
//! so clients can blindly walk `?page=N`.

use serde::Serialize;

/// Fallback page size when configuration does not override it.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// A 1-based page request. Page number and size are clamped to at least one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    number: u32,
    size: u32,
}

impl PageRequest {
    pub fn new(number: u32, size: u32) -> Self {
        Self {
            number: number.max(1),
            size: size.max(1),
        }
    }

    pub fn first(size: u32) -> Self {
        Self::new(1, size)
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Row offset of the first item on this page.
    pub fn offset(&self) -> u64 {
        u64::from(self.number - 1) * u64::from(self.size)
    }

    pub fn limit(&self) -> u32 {
        self.size
    }
}

/// One page of an ordered result set plus the metadata needed to render
/// pagination controls.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: u32,
    pub size: u32,
    pub total_items: u64,
    pub total_pages: u32,
}

impl<T> Page<T> {
    /// Assemble a page from items already sliced by the store.
    pub fn assemble(items: Vec<T>, request: PageRequest, total_items: u64) -> Self {
        Self {
            items,
            number: request.number(),
            size: request.size(),
            total_items,
            total_pages: total_pages(total_items, request.size()),
        }
    }

    pub fn has_next(&self) -> bool {
        self.number < self.total_pages
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1 && self.total_pages > 0
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Number of pages needed to hold `total_items` items.
pub fn total_pages(total_items: u64, size: u32) -> u32 {
    let size = u64::from(size.max(1));
    let pages = total_items.div_ceil(size);
    u32::try_from(pages).unwrap_or(u32::MAX)
}

/// Slice an in-memory sequence into one page.
///
/// Returns a contiguous run of `page_size` items starting at
/// `(page_number - 1) * page_size`, fewer on the last page, and an empty page
/// for out-of-range numbers. Deterministic for a stable input ordering.
pub fn paginate<T: Clone>(sequence: &[T], page_size: u32, page_number: u32) -> Page<T> {
    let request = PageRequest::new(page_number, page_size);
    let total_items = sequence.len() as u64;

    let start = usize::try_from(request.offset()).unwrap_or(usize::MAX);
    let items = if start >= sequence.len() {
        Vec::new()
    } else {
        let end = start.saturating_add(request.size() as usize).min(sequence.len());
        sequence[start..end].to_vec()
    };

    Page::assemble(items, request, total_items)
}
