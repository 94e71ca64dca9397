mod countries;
mod fetcher;
pub(crate) mod types;

pub use countries::country_code;
pub use fetcher::{NewsApiClient, NewsFetcher};
pub use types::{FetchedArticle, Query, MAX_PAGE_SIZE};
