use serde::{Deserialize, Serialize};

pub const DEFAULT_PER_PAGE: i64 = 15;
pub const MAX_PER_PAGE: i64 = 100;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageParams {
    pub page: i64,
    pub per_page: i64,
}

impl PageQuery {
    pub fn params(&self) -> PageParams {
        PageParams {
            page: self.page.unwrap_or(1).max(1),
            per_page: self
                .per_page
                .unwrap_or(DEFAULT_PER_PAGE)
                .clamp(1, MAX_PER_PAGE),
        }
    }
}

impl PageParams {
    pub fn limit(&self) -> i64 {
        self.per_page
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.per_page)
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub last_page: i64,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, params: PageParams, total: i64) -> Self {
        let total = total.max(0);
        let last_page = ((total + params.per_page - 1) / params.per_page).max(1);
        Self {
            data,
            page: params.page,
            per_page: params.per_page,
            total,
            last_page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_query_is_empty() {
        let params = PageQuery::default().params();
        assert_eq!(params, PageParams { page: 1, per_page: 15 });
        assert_eq!(params.offset(), 0);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let params = PageQuery {
            page: Some(-3),
            per_page: Some(1000),
        }
        .params();
        assert_eq!(params.page, 1);
        assert_eq!(params.per_page, MAX_PER_PAGE);

        let params = PageQuery {
            page: Some(3),
            per_page: Some(0),
        }
        .params();
        assert_eq!(params.per_page, 1);
        assert_eq!(params.offset(), 2);
    }

    #[test]
    fn last_page_rounds_up_and_never_drops_below_one() {
        let params = PageParams { page: 1, per_page: 10 };
        assert_eq!(Page::<u8>::new(vec![], params, 0).last_page, 1);
        assert_eq!(Page::<u8>::new(vec![], params, 10).last_page, 1);
        assert_eq!(Page::<u8>::new(vec![], params, 11).last_page, 2);
        assert_eq!(Page::<u8>::new(vec![], params, 95).last_page, 10);
    }
}
