//! Paginated data sources.

use std::sync::Arc;

use super::error::BoxError;
use super::models::OffsetPageParams;

/// Anything that can hand out pages of entities with limit/offset semantics.
///
/// A page holds at most `params.limit` entities; an empty page means
/// `params.page_number` lies past the end of the source.
pub trait Streamable {
    /// Entity type produced by the source.
    type Item;

    /// Returns the page described by `params`.
    ///
    /// # Errors
    /// Returns the source's own error when the page cannot be produced.
    fn select_with_page_params(
        &self,
        params: OffsetPageParams,
    ) -> Result<Vec<Self::Item>, BoxError>;
}

impl<T: Clone> Streamable for Vec<T> {
    type Item = T;

    fn select_with_page_params(&self, params: OffsetPageParams) -> Result<Vec<T>, BoxError> {
        let start = usize::try_from(params.offset())
            .unwrap_or(usize::MAX)
            .min(self.len());
        let limit = usize::try_from(params.limit).unwrap_or(usize::MAX);
        let end = start.saturating_add(limit).min(self.len());

        Ok(self[start..end].to_vec())
    }
}

impl<S: Streamable + ?Sized> Streamable for &S {
    type Item = S::Item;

    fn select_with_page_params(
        &self,
        params: OffsetPageParams,
    ) -> Result<Vec<Self::Item>, BoxError> {
        (**self).select_with_page_params(params)
    }
}

impl<S: Streamable + ?Sized> Streamable for Arc<S> {
    type Item = S::Item;

    fn select_with_page_params(
        &self,
        params: OffsetPageParams,
    ) -> Result<Vec<Self::Item>, BoxError> {
        (**self).select_with_page_params(params)
    }
}
