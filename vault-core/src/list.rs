pub const DEFAULT_PER_PAGE: u32 = 10;

/// One page request over a user's files. Build through [`ListQuery::new`] so
/// out-of-range values are clamped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListQuery {
    pub page: u32,
    pub per_page: u32,
    pub filter: Option<String>,
}

impl ListQuery {
    /// `page < 1` becomes 1, `per_page < 1` becomes the default, a blank filter is none.
    pub fn new(page: i32, per_page: i32, filter: &str) -> Self {
        let filter = filter.trim();
        Self {
            page: if page < 1 { 1 } else { page as u32 },
            per_page: if per_page < 1 { DEFAULT_PER_PAGE } else { per_page as u32 },
            filter: (!filter.is_empty()).then(|| filter.to_string()),
        }
    }

    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.per_page as u64
    }

    pub fn total_pages(&self, total_count: u64) -> u64 {
        total_count.div_ceil(self.per_page as u64)
    }

    /// Case-insensitive substring match used by in-memory listings.
    pub fn matches<'a>(&self, mut fields: impl Iterator<Item = &'a str>) -> bool {
        match &self.filter {
            None => true,
            Some(f) => {
                let needle = f.to_lowercase();
                fields.any(|s| s.to_lowercase().contains(&needle))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_page_and_size() {
        let q = ListQuery::new(0, -3, "  ");
        assert_eq!(q.page, 1);
        assert_eq!(q.per_page, DEFAULT_PER_PAGE);
        assert_eq!(q.filter, None);
        assert_eq!(q.offset(), 0);
    }

    #[test]
    fn pages_round_up() {
        let q = ListQuery::new(3, 4, "");
        assert_eq!(q.offset(), 8);
        assert_eq!(q.total_pages(0), 0);
        assert_eq!(q.total_pages(8), 2);
        assert_eq!(q.total_pages(9), 3);
    }

    #[test]
    fn filter_is_case_insensitive() {
        let q = ListQuery::new(1, 10, "PDF");
        assert!(q.matches(["report", "application/pdf"].into_iter()));
        assert!(!q.matches(["notes.txt", "text/plain"].into_iter()));
    }
}
